// SPDX-License-Identifier: MIT

//! Document store contract.
//!
//! The remote store is a consumed collaborator: keyed documents addressed by
//! stable ids, field-level updates (including union/remove on array-as-set
//! fields), filtered/ordered/limited queries, and push subscriptions per
//! document or per query. There are no transactions across documents;
//! concurrent writers rely on last-write-wins per field.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// Sentinel value replaced by the store's clock when the write commits.
pub(crate) const SERVER_TIMESTAMP: &str = "__server_timestamp__";

/// Marker for a field the store should stamp with its own clock on commit.
pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_string())
}

/// A document snapshot: id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Deserialize the document into a typed model.
    ///
    /// The document id is injected under `"id"`, overriding any stored value,
    /// so models can carry their id without the store persisting it.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("decode document {}: {}", self.id, e)))
    }
}

/// Serialize a model into a document field map.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(AppError::Internal(anyhow::anyhow!(
            "expected a JSON object, got {}",
            other
        ))),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!("encode document: {}", e))),
    }
}

/// Serialize a single value for use in a field operation.
pub fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("encode value: {}", e)))
}

/// Field-level update operation.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Overwrite the field.
    Set(Value),
    /// Append the value to an array field unless an equal element exists.
    ArrayUnion(Value),
    /// Remove all elements equal to the value from an array field.
    ArrayRemove(Value),
    /// Remove the field entirely.
    Delete,
}

/// Sort direction for ordered queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Comparison operator for query filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
}

/// Single field filter.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// Query over one collection: conjunctive filters, one order-by, a limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(name: &str) -> Self {
        Self {
            collection: name.to_string(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter_eq(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Eq,
            value,
        });
        self
    }

    pub fn filter_gte(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Gte,
            value,
        });
        self
    }

    pub fn filter_lte(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Lte,
            value,
        });
        self
    }

    pub fn order_by_desc(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), Direction::Descending));
        self
    }

    pub fn order_by_asc(mut self, field: &str) -> Self {
        self.order_by = Some((field.to_string(), Direction::Ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Push stream of snapshots for a single document.
///
/// The first message is the current snapshot; later messages follow the
/// store's commit order for that subscription.
pub type DocumentWatch = mpsc::UnboundedReceiver<Option<Document>>;

/// Push stream of snapshots for a query result set.
pub type QueryWatch = mpsc::UnboundedReceiver<Vec<Document>>;

/// Keyed document store with field-level updates and push subscriptions.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Read a single document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or fully overwrite a document at a known id.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Create a document with a store-assigned id; returns the id.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String>;

    /// Apply field operations to an existing document.
    ///
    /// Fails with `NotFound` when the document does not exist.
    async fn update(&self, collection: &str, id: &str, ops: Vec<(String, FieldOp)>) -> Result<()>;

    /// Delete a document. Deleting a missing document is a no-op.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Execute a query.
    async fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Subscribe to pushes for a single document.
    async fn watch_document(&self, collection: &str, id: &str) -> Result<DocumentWatch>;

    /// Subscribe to pushes for a query result set.
    async fn watch_query(&self, query: &Query) -> Result<QueryWatch>;
}

/// Read and decode a document in one step.
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(collection, id).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}
