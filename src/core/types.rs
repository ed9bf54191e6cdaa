//! Core types used throughout the tierguard library.
//!
//! This module defines the backend-neutral query description handed to a
//! [`DurableStore`](crate::core::DurableStore), and the counter snapshot
//! returned by cache backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Rows returned by a durable store. Each row is a JSON object.
pub type Rows = Vec<Value>;

/// The kind of operation a [`Query`] performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryAction {
    /// Read matching rows.
    Select,
    /// Insert the payload as one or more new rows.
    Insert,
    /// Insert, or replace the row that conflicts on the given column.
    Upsert {
        /// Column that identifies an existing row.
        on_conflict: String,
    },
    /// Merge the payload into every matching row.
    Update,
    /// Remove every matching row.
    Delete,
}

impl fmt::Display for QueryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "select"),
            Self::Insert => write!(f, "insert"),
            Self::Upsert { .. } => write!(f, "upsert"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Comparison operator of a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl FilterOp {
    /// Returns the operator's short name (`eq`, `gte`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
        }
    }
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column name.
    pub column: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Value to compare against.
    pub value: Value,
}

/// A backend-neutral description of a durable store operation.
///
/// # Examples
///
/// ```rust
/// use tierguard::core::Query;
/// use serde_json::json;
///
/// let recent = Query::select("post_attribution")
///     .gte("engagement_rate", json!(0.02))
///     .order_by("posted_at", false)
///     .limit(20);
/// assert!(!recent.is_write());
///
/// let insert = Query::insert("content_queue", json!({"id": "p1", "status": "queued"}));
/// assert!(insert.is_write());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Target table or collection.
    pub table: String,
    /// Operation to perform.
    pub action: QueryAction,
    /// Predicates, combined with AND.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Row data for insert, upsert and update.
    pub payload: Option<Value>,
    /// Maximum number of rows to return.
    pub limit: Option<usize>,
    /// Ordering column and whether it is ascending.
    pub order_by: Option<(String, bool)>,
}

impl Query {
    fn new(table: impl Into<String>, action: QueryAction) -> Self {
        Self {
            table: table.into(),
            action,
            filters: Vec::new(),
            payload: None,
            limit: None,
            order_by: None,
        }
    }

    /// Creates a select query.
    pub fn select(table: impl Into<String>) -> Self {
        Self::new(table, QueryAction::Select)
    }

    /// Creates an insert query.
    pub fn insert(table: impl Into<String>, payload: Value) -> Self {
        Self::new(table, QueryAction::Insert).with_payload(payload)
    }

    /// Creates an upsert query keyed on `on_conflict`.
    pub fn upsert(table: impl Into<String>, on_conflict: impl Into<String>, payload: Value) -> Self {
        Self::new(
            table,
            QueryAction::Upsert {
                on_conflict: on_conflict.into(),
            },
        )
        .with_payload(payload)
    }

    /// Creates an update query. Add filters to restrict the affected rows.
    pub fn update(table: impl Into<String>, payload: Value) -> Self {
        Self::new(table, QueryAction::Update).with_payload(payload)
    }

    /// Creates a delete query. Add filters to restrict the affected rows.
    pub fn delete(table: impl Into<String>) -> Self {
        Self::new(table, QueryAction::Delete)
    }

    /// Sets the payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a filter.
    pub fn filter(mut self, column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value,
        });
        self
    }

    /// Adds an equality filter.
    pub fn eq(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    /// Adds an inequality filter.
    pub fn neq(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, FilterOp::Neq, value)
    }

    /// Adds a greater-than filter.
    pub fn gt(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, FilterOp::Gt, value)
    }

    /// Adds a greater-than-or-equal filter.
    pub fn gte(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    /// Adds a less-than filter.
    pub fn lt(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, FilterOp::Lt, value)
    }

    /// Adds a less-than-or-equal filter.
    pub fn lte(self, column: impl Into<String>, value: Value) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    /// Limits the number of returned rows.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Orders the result by `column`.
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some((column.into(), ascending));
        self
    }

    /// Returns `true` if this query modifies data.
    pub fn is_write(&self) -> bool {
        !matches!(self.action, QueryAction::Select)
    }

    /// Returns `true` if applying this query twice has the same effect as once.
    ///
    /// A timed-out attempt may have been applied, so only idempotent writes
    /// are safe to retry blindly.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.action,
            QueryAction::Select | QueryAction::Upsert { .. } | QueryAction::Delete
        )
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.table)?;
        for filter in &self.filters {
            write!(f, " {}.{}.{}", filter.column, filter.op.as_str(), filter.value)?;
        }
        Ok(())
    }
}

/// State of a windowed counter held by a cache backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Current count.
    pub count: u64,
    /// Time until the counter expires.
    pub expires_in: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_builder() {
        let query = Query::select("posts")
            .eq("status", json!("queued"))
            .lt("attempts", json!(3))
            .order_by("created_at", true)
            .limit(5);

        assert_eq!(query.table, "posts");
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[1].op, FilterOp::Lt);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.order_by, Some(("created_at".to_string(), true)));
    }

    #[test]
    fn test_write_classification() {
        assert!(!Query::select("t").is_write());
        assert!(Query::insert("t", json!({})).is_write());
        assert!(!Query::insert("t", json!({})).is_idempotent());
        assert!(Query::upsert("t", "id", json!({})).is_idempotent());
        assert!(Query::delete("t").is_idempotent());
        assert!(!Query::update("t", json!({})).is_idempotent());
    }

    #[test]
    fn test_query_serde() {
        let query = Query::upsert("metrics", "post_id", json!({"post_id": "a", "likes": 3}));
        let encoded = serde_json::to_string(&query).unwrap();
        let decoded: Query = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, query);
    }

    #[test]
    fn test_display() {
        let query = Query::delete("sessions").eq("user", json!("u1"));
        assert_eq!(query.to_string(), "delete sessions user.eq.\"u1\"");
    }
}
