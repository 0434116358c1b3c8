//! VAULT: Criteria-Filtered Row Store
//!
//! The engine's persistence seam. The engine treats the backing store as
//! an opaque criteria-filtered row store; this crate defines that
//! contract and ships an in-memory reference implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::trace;

/// One stored row
pub type Row = Map<String, Value>;

/// Criteria: every key/value pair must match a row field exactly
pub type Criteria = HashMap<String, Value>;

/// Build criteria from (key, value) pairs
pub fn criteria(pairs: &[(&str, Value)]) -> Criteria {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// The persistence collaborator contract
#[async_trait]
pub trait Store: Send + Sync {
    /// Rows in `table` matching all criteria pairs
    async fn get(&self, table: &str, criteria: &Criteria) -> Vec<Row>;

    /// Append a row
    async fn create(&self, table: &str, row: Row);

    /// Merge `row` into every row where `key` equals `value`
    async fn update(&self, table: &str, key: &str, value: &Value, row: Row);

    /// Remove rows matching all criteria pairs
    async fn delete(&self, table: &str, criteria: &Criteria);

    /// Rows where `field` is any of `values`
    async fn get_in(&self, table: &str, field: &str, values: &[Value]) -> Vec<Row>;
}

fn matches(row: &Row, criteria: &Criteria) -> bool {
    criteria
        .iter()
        .all(|(key, value)| row.get(key) == Some(value))
}

/// In-memory store
#[derive(Default)]
pub struct MemStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get(&self, table: &str, criteria: &Criteria) -> Vec<Row> {
        let tables = self.tables.lock().await;
        tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches(row, criteria))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn create(&self, table: &str, row: Row) {
        trace!("◆ VAULT: create {}", table);
        let mut tables = self.tables.lock().await;
        tables.entry(table.to_string()).or_default().push(row);
    }

    async fn update(&self, table: &str, key: &str, value: &Value, row: Row) {
        let mut tables = self.tables.lock().await;
        if let Some(rows) = tables.get_mut(table) {
            for existing in rows.iter_mut().filter(|r| r.get(key) == Some(value)) {
                for (k, v) in &row {
                    existing.insert(k.clone(), v.clone());
                }
            }
        }
    }

    async fn delete(&self, table: &str, criteria: &Criteria) {
        let mut tables = self.tables.lock().await;
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| !matches(row, criteria));
        }
    }

    async fn get_in(&self, table: &str, field: &str, values: &[Value]) -> Vec<Row> {
        let tables = self.tables.lock().await;
        tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get(field).map(|v| values.contains(v)).unwrap_or(false))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
