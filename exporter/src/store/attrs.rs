//! Attribute mapping store
//!
//! Maps dynamically discovered attribute keys onto a fixed set of physical
//! columns (`attribute1..attribute20`), one mapping row per metric name. Slot
//! assignments are permanent: once a key occupies a slot it is never moved or
//! vacated, so every row ever written for a metric name agrees on which
//! column holds which attribute value.
//!
//! Concurrency is coordinated entirely in the backend. Row creation uses
//! `ON CONFLICT DO NOTHING`; updates overwrite the full slot vector, so
//! concurrent writers converge on the last writer's view instead of
//! interleaving single-slot updates.

use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};

use super::quote_ident;
use crate::error::Error;
use crate::model::AttrMap;

/// Maximum number of distinct attribute keys per metric name. Exceeding it is
/// a hard per-point error, not a silent drop.
pub const MAX_ATTRIBUTES: usize = 20;

/// Table holding one mapping row per metric name.
pub const MAPPINGS_TABLE: &str = "_attributes_mappings";

/// Fixed-width vector of attribute column values, positioned by slot.
pub type SlotValues = [Option<String>; MAX_ATTRIBUTES];

/// The persistent contract between attribute keys and physical columns for
/// one metric name. Slot positions are 1-based, matching the column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributesMapping {
    name: String,
    slots: [Option<String>; MAX_ATTRIBUTES],
}

impl AttributesMapping {
    /// An empty mapping for a newly seen metric name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based slot assigned to `key`, if any.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_deref() == Some(key))
            .map(|i| i + 1)
    }

    /// Key occupying the 1-based slot `pos`.
    pub fn slot(&self, pos: usize) -> Option<&str> {
        self.slots.get(pos.checked_sub(1)?)?.as_deref()
    }

    /// Assign the next free slot to `key`, left to right. Fails when all
    /// slots are taken; existing assignments are never disturbed.
    pub fn assign(&mut self, key: &str) -> Result<usize, Error> {
        match self.slots.iter().position(Option::is_none) {
            Some(i) => {
                self.slots[i] = Some(key.to_string());
                Ok(i + 1)
            }
            None => Err(Error::AttributeCapacity {
                metric: self.name.clone(),
            }),
        }
    }

    /// Translate a data point's attributes into slot-ordered column values,
    /// assigning fresh slots to previously unseen keys in first-seen order.
    /// Returns the fixed-width value vector and whether any new slot was
    /// assigned (meaning the mapping row must be persisted before the row
    /// that relies on it).
    ///
    /// New assignments are staged and take effect only when the whole point
    /// resolves: a capacity failure mid-point leaves the mapping exactly as
    /// it was, so no slot is ever consumed without being flagged for
    /// persistence.
    pub fn resolve(&mut self, attributes: &AttrMap) -> Result<(SlotValues, bool), Error> {
        if attributes.len() > MAX_ATTRIBUTES {
            return Err(Error::AttributeCapacity {
                metric: self.name.clone(),
            });
        }

        let mut staged = self.clone();
        let mut values: SlotValues = Default::default();
        let mut changed = false;

        for (key, value) in attributes {
            let pos = match staged.position(key) {
                Some(pos) => pos,
                None => {
                    changed = true;
                    staged.assign(key)?
                }
            };
            values[pos - 1] = Some(value_as_string(value));
        }

        self.slots = staged.slots;
        Ok((values, changed))
    }
}

/// Attribute values are stored as text: strings verbatim, everything else in
/// its JSON encoding.
fn value_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attribute_column(pos: usize) -> String {
    format!("attribute{pos}")
}

fn mappings_table_ddl(schema: &str) -> String {
    let mut columns = vec!["name VARCHAR PRIMARY KEY".to_string()];
    columns.extend((1..=MAX_ATTRIBUTES).map(|i| format!("{} VARCHAR", attribute_column(i))));
    format!(
        "CREATE TABLE IF NOT EXISTS {}.{} ({})",
        quote_ident(schema),
        quote_ident(MAPPINGS_TABLE),
        columns.join(", ")
    )
}

fn insert_mapping_sql(schema: &str) -> String {
    format!(
        "INSERT INTO {}.{} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        quote_ident(schema),
        quote_ident(MAPPINGS_TABLE)
    )
}

fn update_mapping_sql(schema: &str) -> String {
    let assignments: Vec<String> = (1..=MAX_ATTRIBUTES)
        .map(|i| format!("{} = ${}", attribute_column(i), i + 1))
        .collect();
    format!(
        "UPDATE {}.{} SET {} WHERE name = $1",
        quote_ident(schema),
        quote_ident(MAPPINGS_TABLE),
        assignments.join(", ")
    )
}

fn select_mappings_sql(schema: &str) -> String {
    let columns: Vec<String> = (1..=MAX_ATTRIBUTES).map(attribute_column).collect();
    format!(
        "SELECT name, {} FROM {}.{} WHERE name = ANY($1)",
        columns.join(", "),
        quote_ident(schema),
        quote_ident(MAPPINGS_TABLE)
    )
}

/// Create the mapping table in the target schema. Idempotent.
pub async fn create_mappings_table<'a, E>(executor: E, schema: &str) -> Result<(), Error>
where
    E: PgExecutor<'a>,
{
    sqlx::query(&mappings_table_ddl(schema))
        .execute(executor)
        .await?;
    Ok(())
}

/// Lazily create an empty mapping row for a newly seen metric name. A
/// concurrent creator wins silently.
pub async fn insert_mapping<'a, E>(executor: E, schema: &str, name: &str) -> Result<(), Error>
where
    E: PgExecutor<'a>,
{
    sqlx::query(&insert_mapping_sql(schema))
        .bind(name)
        .execute(executor)
        .await?;
    Ok(())
}

/// Overwrite all slot-name columns of the mapping row. The full-vector
/// replace keeps concurrent updates idempotent: the last writer's view wins
/// deterministically instead of interleaving per-slot writes.
pub async fn update_mapping<'a, E>(
    executor: E,
    schema: &str,
    mapping: &AttributesMapping,
) -> Result<(), Error>
where
    E: PgExecutor<'a>,
{
    let sql = update_mapping_sql(schema);
    let mut query = sqlx::query(&sql).bind(mapping.name());
    for slot in &mapping.slots {
        query = query.bind(slot.as_deref());
    }
    query.execute(executor).await?;
    Ok(())
}

/// Fetch the mapping rows for a set of metric names.
pub async fn fetch_mappings<'a, E>(
    executor: E,
    schema: &str,
    names: &[String],
) -> Result<Vec<AttributesMapping>, Error>
where
    E: PgExecutor<'a>,
{
    let sql = select_mappings_sql(schema);
    let rows = sqlx::query(&sql).bind(names).fetch_all(executor).await?;

    rows.into_iter().map(mapping_from_row).collect()
}

fn mapping_from_row(row: PgRow) -> Result<AttributesMapping, Error> {
    let mut mapping = AttributesMapping::new(row.try_get::<String, _>(0)?);
    for i in 0..MAX_ATTRIBUTES {
        mapping.slots[i] = row.try_get::<Option<String>, _>(i + 1)?;
    }
    Ok(mapping)
}

/// Index fetched mappings by metric name.
pub fn group_by_name(mappings: Vec<AttributesMapping>) -> HashMap<String, AttributesMapping> {
    mappings
        .into_iter()
        .map(|m| (m.name().to_string(), m))
        .collect()
}
