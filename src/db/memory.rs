// SPDX-License-Identifier: MIT

//! In-memory, push-capable document store.
//!
//! Backs tests and local development with the same contract the remote
//! store provides: field-level updates with union/remove semantics, ordered
//! queries, and push subscriptions fed from a change channel. Write failures
//! can be injected to exercise partial-failure paths.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::db::store::{
    Direction, Document, DocumentStore, DocumentWatch, FieldOp, Fields, Filter, FilterOp, Query,
    QueryWatch, SERVER_TIMESTAMP,
};
use crate::error::{AppError, Result};
use crate::time_utils::now_rfc3339;

/// In-memory document store. Cloning shares the underlying data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    collections: DashMap<String, BTreeMap<String, Fields>>,
    changes: broadcast::Sender<String>,
    fail_writes: AtomicBool,
    /// Number of writes to allow before failing the rest, when set.
    fail_after: Mutex<Option<u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                collections: DashMap::new(),
                changes,
                fail_writes: AtomicBool::new(false),
                fail_after: Mutex::new(None),
            }),
        }
    }

    /// Make every subsequent write fail with `RemoteWrite`.
    ///
    /// Passing `false` also clears any `fail_writes_after` countdown.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, AtomicOrdering::SeqCst);
        if !fail {
            if let Ok(mut fail_after) = self.inner.fail_after.lock() {
                *fail_after = None;
            }
        }
    }

    /// Allow `count` more writes, then fail the rest with `RemoteWrite`.
    pub fn fail_writes_after(&self, count: u32) {
        if let Ok(mut fail_after) = self.inner.fail_after.lock() {
            *fail_after = Some(count);
        }
    }

    fn check_write(&self) -> Result<()> {
        if self.inner.fail_writes.load(AtomicOrdering::SeqCst) {
            return Err(AppError::RemoteWrite("injected write failure".to_string()));
        }
        let mut fail_after = match self.inner.fail_after.lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(()),
        };
        if let Some(remaining) = fail_after.as_mut() {
            if *remaining == 0 {
                return Err(AppError::RemoteWrite("injected write failure".to_string()));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn notify(&self, collection: &str) {
        // No receivers is fine; watchers resubscribe on creation.
        let _ = self.inner.changes.send(collection.to_string());
    }

    fn read_document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .collections
            .get(collection)
            .and_then(|col| col.get(id).cloned())
            .map(|fields| Document {
                id: id.to_string(),
                fields,
            })
    }

    fn eval_query(&self, query: &Query) -> Vec<Document> {
        let Some(col) = self.inner.collections.get(&query.collection) else {
            return Vec::new();
        };

        let mut docs: Vec<Document> = col
            .iter()
            .filter_map(|(id, fields)| {
                query
                    .filters
                    .iter()
                    .all(|f| filter_matches(fields, f))
                    .then(|| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
            })
            .collect();
        drop(col);

        if let Some((field, direction)) = &query.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(
                    a.fields.get(field).unwrap_or(&Value::Null),
                    b.fields.get(field).unwrap_or(&Value::Null),
                );
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        docs
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self.read_document(collection, id))
    }

    async fn set(&self, collection: &str, id: &str, mut fields: Fields) -> Result<()> {
        self.check_write()?;
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.notify(collection);
        Ok(())
    }

    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String> {
        self.check_write()?;
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        let id = uuid::Uuid::new_v4().to_string();
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.notify(collection);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, ops: Vec<(String, FieldOp)>) -> Result<()> {
        self.check_write()?;
        {
            let mut col = self
                .inner
                .collections
                .entry(collection.to_string())
                .or_default();
            let doc = col
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("{collection}/{id}")))?;
            let now = now_rfc3339();
            for (field, op) in ops {
                apply_op(doc, &field, op, &now);
            }
        }
        self.notify(collection);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.check_write()?;
        if let Some(mut col) = self.inner.collections.get_mut(collection) {
            col.remove(id);
        }
        self.notify(collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.eval_query(query))
    }

    async fn watch_document(&self, collection: &str, id: &str) -> Result<DocumentWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Subscribe before reading so commits between the two are not missed.
        let mut changes = self.inner.changes.subscribe();
        let store = self.clone();
        let collection = collection.to_string();
        let id = id.to_string();

        let mut last = store.read_document(&collection, &id);
        if tx.send(last.clone()).is_err() {
            return Ok(rx);
        }

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == collection => {}
                    Ok(_) => continue,
                    // Missed events: fall through and re-read.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let snapshot = store.read_document(&collection, &id);
                if snapshot == last {
                    continue;
                }
                last = snapshot.clone();
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn watch_query(&self, query: &Query) -> Result<QueryWatch> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut changes = self.inner.changes.subscribe();
        let store = self.clone();
        let query = query.clone();

        let mut last = store.eval_query(&query);
        if tx.send(last.clone()).is_err() {
            return Ok(rx);
        }

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(changed) if changed == query.collection => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let snapshot = store.eval_query(&query);
                if snapshot == last {
                    continue;
                }
                last = snapshot.clone();
                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// Replace top-level server-timestamp sentinels with the commit time.
fn resolve_server_timestamps(fields: &mut Fields, now: &str) {
    for value in fields.values_mut() {
        if matches!(value, Value::String(s) if s == SERVER_TIMESTAMP) {
            *value = Value::String(now.to_string());
        }
    }
}

fn apply_op(doc: &mut Fields, field: &str, op: FieldOp, now: &str) {
    match op {
        FieldOp::Set(value) => {
            let mut value = value;
            if matches!(&value, Value::String(s) if s == SERVER_TIMESTAMP) {
                value = Value::String(now.to_string());
            }
            doc.insert(field.to_string(), value);
        }
        FieldOp::ArrayUnion(value) => {
            let entry = doc
                .entry(field.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
        }
        FieldOp::ArrayRemove(value) => {
            if let Some(Value::Array(items)) = doc.get_mut(field) {
                items.retain(|item| item != &value);
            }
        }
        FieldOp::Delete => {
            doc.remove(field);
        }
    }
}

fn filter_matches(fields: &Fields, filter: &Filter) -> bool {
    // Documents without the field never match, mirroring remote semantics.
    let Some(value) = fields.get(&filter.field) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => value == &filter.value,
        FilterOp::Gte => compare_values(value, &filter.value) != Ordering::Less,
        FilterOp::Lte => compare_values(value, &filter.value) != Ordering::Greater,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
