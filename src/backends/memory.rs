//! In-memory durable store.
//!
//! This module provides a [`DurableStore`] that keeps tables in process
//! memory and evaluates the full [`Query`] model against them. Faults can be
//! injected to simulate an unhealthy backend in tests without a real
//! database.

use crate::core::{DurableStore, FilterOp, Query, QueryAction, Rows, StoreError, StoreResult};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// An in-memory durable store with fault injection.
///
/// # Examples
///
/// ```rust
/// use tierguard::backends::MemoryStore;
/// use serde_json::json;
/// use std::time::Duration;
///
/// // A healthy store with one seeded table
/// let store = MemoryStore::new()
///     .with_table("posts", vec![json!({"id": 1, "status": "queued"})]);
///
/// // A store that is slow and fails its next two operations
/// let flaky = MemoryStore::new().with_latency(Duration::from_millis(50));
/// flaky.fail_next(2);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    /// Name of this store instance.
    name: String,
    /// Table name -> rows.
    tables: RwLock<HashMap<String, Vec<Value>>>,
    /// Simulated latency for every operation.
    latency: Option<Duration>,
    /// Number of upcoming operations that will fail.
    fail_next: AtomicU32,
    /// Fail every operation while set.
    failing: AtomicBool,
    /// Report the backend as unreachable while set.
    unavailable: AtomicBool,
    /// Counter for execute calls.
    execute_count: AtomicU64,
    /// Counter for probe calls.
    probe_count: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty, healthy store.
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            tables: RwLock::new(HashMap::new()),
            latency: None,
            fail_next: AtomicU32::new(0),
            failing: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            execute_count: AtomicU64::new(0),
            probe_count: AtomicU64::new(0),
        }
    }

    /// Sets the name of this store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seeds a table with rows.
    pub fn with_table(self, table: impl Into<String>, rows: Vec<Value>) -> Self {
        self.tables.write().insert(table.into(), rows);
        self
    }

    /// Sets the simulated latency for every operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next `n` operations fail with `OperationFailed`.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes every operation fail with `OperationFailed` while `failing`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes every operation and probe fail with `BackendUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of `execute` calls made.
    pub fn execute_count(&self) -> u64 {
        self.execute_count.load(Ordering::Relaxed)
    }

    /// Returns the number of `probe` calls made.
    pub fn probe_count(&self) -> u64 {
        self.probe_count.load(Ordering::Relaxed)
    }

    /// Returns a copy of a table's rows.
    pub fn rows(&self, table: &str) -> Rows {
        self.tables.read().get(table).cloned().unwrap_or_default()
    }

    fn injected_fault(&self) -> Option<StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Some(StoreError::unavailable(&self.name, "simulated outage"));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Some(StoreError::failed(&self.name, "simulated failure"));
        }
        let consumed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        consumed.then(|| StoreError::failed(&self.name, "simulated failure"))
    }

    fn apply(&self, query: &Query) -> StoreResult<Rows> {
        let mut tables = self.tables.write();
        let rows = tables.entry(query.table.clone()).or_default();

        match &query.action {
            QueryAction::Select => {
                let mut selected: Rows = rows
                    .iter()
                    .filter(|row| matches_all(row, query))
                    .cloned()
                    .collect();
                if let Some((column, ascending)) = &query.order_by {
                    selected.sort_by(|a, b| {
                        let ord = compare(&a[column.as_str()], &b[column.as_str()])
                            .unwrap_or(CmpOrdering::Equal);
                        if *ascending {
                            ord
                        } else {
                            ord.reverse()
                        }
                    });
                }
                if let Some(limit) = query.limit {
                    selected.truncate(limit);
                }
                Ok(selected)
            }

            QueryAction::Insert => {
                let new_rows = self.payload_rows(query)?;
                rows.extend(new_rows.iter().cloned());
                Ok(new_rows)
            }

            QueryAction::Upsert { on_conflict } => {
                let new_rows = self.payload_rows(query)?;
                for new_row in &new_rows {
                    let key = new_row.get(on_conflict.as_str()).ok_or_else(|| {
                        StoreError::rejected(
                            &self.name,
                            format!("upsert row is missing conflict column '{on_conflict}'"),
                        )
                    })?;
                    match rows
                        .iter_mut()
                        .find(|row| row.get(on_conflict.as_str()) == Some(key))
                    {
                        Some(existing) => *existing = new_row.clone(),
                        None => rows.push(new_row.clone()),
                    }
                }
                Ok(new_rows)
            }

            QueryAction::Update => {
                let patch = match &query.payload {
                    Some(Value::Object(patch)) => patch.clone(),
                    _ => {
                        return Err(StoreError::rejected(
                            &self.name,
                            "update requires an object payload",
                        ))
                    }
                };
                let mut updated = Vec::new();
                for row in rows.iter_mut().filter(|row| matches_all(row, query)) {
                    if let Value::Object(fields) = &mut *row {
                        merge(fields, &patch);
                    }
                    updated.push(row.clone());
                }
                Ok(updated)
            }

            QueryAction::Delete => {
                let (removed, kept): (Rows, Rows) =
                    rows.drain(..).partition(|row| matches_all(row, query));
                *rows = kept;
                Ok(removed)
            }
        }
    }

    fn payload_rows(&self, query: &Query) -> StoreResult<Rows> {
        match &query.payload {
            Some(row @ Value::Object(_)) => Ok(vec![row.clone()]),
            Some(Value::Array(items)) if items.iter().all(Value::is_object) => Ok(items.clone()),
            _ => Err(StoreError::rejected(
                &self.name,
                format!("{} requires an object or array-of-objects payload", query.action),
            )),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

fn matches_all(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|filter| {
        let actual = &row[filter.column.as_str()];
        match filter.op {
            FilterOp::Eq => compare(actual, &filter.value) == Some(CmpOrdering::Equal),
            FilterOp::Neq => compare(actual, &filter.value) != Some(CmpOrdering::Equal),
            FilterOp::Gt => compare(actual, &filter.value) == Some(CmpOrdering::Greater),
            FilterOp::Gte => matches!(
                compare(actual, &filter.value),
                Some(CmpOrdering::Greater | CmpOrdering::Equal)
            ),
            FilterOp::Lt => compare(actual, &filter.value) == Some(CmpOrdering::Less),
            FilterOp::Lte => matches!(
                compare(actual, &filter.value),
                Some(CmpOrdering::Less | CmpOrdering::Equal)
            ),
        }
    })
}

/// Orders two JSON scalars of the same type; `None` when incomparable.
fn compare(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(CmpOrdering::Equal),
        _ if a == b => Some(CmpOrdering::Equal),
        _ => None,
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, query: &Query) -> StoreResult<Rows> {
        self.execute_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(fault) = self.injected_fault() {
            return Err(fault);
        }

        self.apply(query)
    }

    async fn probe(&self) -> StoreResult<()> {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::SeqCst) || self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable(&self.name, "simulated outage"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded() -> MemoryStore {
        MemoryStore::new().with_table(
            "posts",
            vec![
                json!({"id": 1, "topic": "sleep", "likes": 10}),
                json!({"id": 2, "topic": "diet", "likes": 40}),
                json!({"id": 3, "topic": "sleep", "likes": 25}),
            ],
        )
    }

    #[tokio::test]
    async fn test_select_filter_order_limit() {
        let store = seeded();
        let query = Query::select("posts")
            .eq("topic", json!("sleep"))
            .order_by("likes", false)
            .limit(1);

        let rows = store.execute(&query).await.unwrap();
        assert_eq!(rows, vec![json!({"id": 3, "topic": "sleep", "likes": 25})]);
    }

    #[tokio::test]
    async fn test_numeric_comparisons() {
        let store = seeded();
        let rows = store
            .execute(&Query::select("posts").gte("likes", json!(25.0)))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_update_delete() {
        let store = seeded();
        store
            .execute(&Query::insert("posts", json!({"id": 4, "topic": "focus", "likes": 0})))
            .await
            .unwrap();
        assert_eq!(store.rows("posts").len(), 4);

        let updated = store
            .execute(&Query::update("posts", json!({"likes": 99})).eq("topic", json!("sleep")))
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|row| row["likes"] == json!(99)));

        let removed = store
            .execute(&Query::delete("posts").lt("likes", json!(50)))
            .await
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.rows("posts").len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_on_conflict() {
        let store = seeded();
        store
            .execute(&Query::upsert("posts", "id", json!({"id": 2, "topic": "diet", "likes": 41})))
            .await
            .unwrap();
        store
            .execute(&Query::upsert("posts", "id", json!({"id": 9, "topic": "new", "likes": 1})))
            .await
            .unwrap();

        let rows = store.rows("posts");
        assert_eq!(rows.len(), 4);
        assert!(rows.contains(&json!({"id": 2, "topic": "diet", "likes": 41})));
    }

    #[tokio::test]
    async fn test_bad_payload_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .execute(&Query::insert("posts", json!("not an object")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = seeded();
        store.fail_next(2);
        assert!(store.execute(&Query::select("posts")).await.is_err());
        assert!(store.execute(&Query::select("posts")).await.is_err());
        assert!(store.execute(&Query::select("posts")).await.is_ok());
        assert_eq!(store.execute_count(), 3);

        store.set_unavailable(true);
        assert!(store.probe().await.is_err());
        let err = store.execute(&Query::select("posts")).await.unwrap_err();
        assert!(matches!(err, StoreError::BackendUnavailable { .. }));

        store.set_unavailable(false);
        assert!(store.probe().await.is_ok());
    }
}
