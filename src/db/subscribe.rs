// SPDX-License-Identifier: MIT

//! Real-time subscription bridge.
//!
//! Wraps the store's push primitive into revocable handles. A handle owns a
//! cancellation token; dropping it on any exit path stops the forwarding
//! task, so a consumer cannot leak a live subscription. Callbacks are awaited
//! one at a time per subscription, preserving the store's commit order, and
//! never block the code that acquired the handle.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::db::store::{Document, DocumentStore, Query};
use crate::session::{Identity, Session};

/// Bridge between components and the store's push primitive.
#[derive(Clone)]
pub struct SubscriptionBridge {
    store: Arc<dyn DocumentStore>,
}

/// Revocable subscription. Dropping the handle stops the forwarding task.
pub struct SubscriptionHandle {
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    /// Stop the subscription explicitly (dropping does the same).
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SubscriptionBridge {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Subscribe to pushes for a single document.
    ///
    /// A failure to start the subscription is logged and degrades to a
    /// never-firing handle rather than failing the consumer.
    pub fn subscribe_document<F, Fut>(
        &self,
        collection: &str,
        id: &str,
        mut on_change: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(Option<Document>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = self.store.clone();
        let collection = collection.to_string();
        let id = id.to_string();

        tokio::spawn(async move {
            let mut watch = match store.watch_document(&collection, &id).await {
                Ok(watch) => watch,
                Err(e) => {
                    tracing::warn!(error = %e, collection = %collection, id = %id, "Document subscription failed to start");
                    return;
                }
            };
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    snapshot = watch.recv() => match snapshot {
                        Some(snapshot) => on_change(snapshot).await,
                        None => break,
                    },
                }
            }
        });

        SubscriptionHandle { cancel }
    }

    /// Subscribe to pushes for a query result set.
    pub fn subscribe_query<F, Fut>(&self, query: Query, mut on_change: F) -> SubscriptionHandle
    where
        F: FnMut(Vec<Document>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let mut watch = match store.watch_query(&query).await {
                Ok(watch) => watch,
                Err(e) => {
                    tracing::warn!(error = %e, collection = %query.collection, "Query subscription failed to start");
                    return;
                }
            };
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    snapshot = watch.recv() => match snapshot {
                        Some(snapshot) => on_change(snapshot).await,
                        None => break,
                    },
                }
            }
        });

        SubscriptionHandle { cancel }
    }

    /// Maintain one inner subscription per signed-in identity.
    ///
    /// `on_identity` is invoked for the current identity and again whenever a
    /// different identity signs in; the previous inner handle is dropped
    /// first, so re-subscription is automatic. `on_clear` runs on sign-out so
    /// the consumer can reset its derived state.
    pub fn subscribe_per_identity<S, C>(
        &self,
        session: &Session,
        mut on_identity: S,
        mut on_clear: C,
    ) -> SubscriptionHandle
    where
        S: FnMut(&SubscriptionBridge, &Identity) -> SubscriptionHandle + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let bridge = self.clone();
        let mut auth = session.watch();

        tokio::spawn(async move {
            let mut inner: Option<SubscriptionHandle> = None;
            let mut current: Option<String> = None;
            loop {
                let state = auth.borrow_and_update().clone();
                let next = state.identity.as_ref().map(|ident| ident.id.clone());
                if next != current {
                    // Drop (and thereby cancel) the previous subscription
                    // before starting the next one.
                    inner = None;
                    match &state.identity {
                        Some(identity) => inner = Some(on_identity(&bridge, identity)),
                        None => on_clear(),
                    }
                    current = next;
                }
                tokio::select! {
                    () = token.cancelled() => break,
                    changed = auth.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            drop(inner);
        });

        SubscriptionHandle { cancel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collections::USERS;
    use crate::db::memory::MemoryStore;
    use crate::db::store::{encode, DocumentStore, FieldOp};
    use crate::models::UserRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn seed_user(store: &MemoryStore, id: &str) {
        let record = UserRecord::new(id, &format!("{id}@example.com"), "2024-01-01T00:00:00Z");
        store
            .set(USERS, id, encode(&record).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handle_releases_subscription() {
        let store = MemoryStore::new();
        seed_user(&store, "a").await;

        let bridge = SubscriptionBridge::new(Arc::new(store.clone()));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();

        let handle = bridge.subscribe_document(USERS, "a", move |_snapshot| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Initial snapshot plus one change.
        store
            .update(
                USERS,
                "a",
                vec![("bio".to_string(), FieldOp::Set(serde_json::json!("hi")))],
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let before = seen.load(Ordering::SeqCst);
        assert!(before >= 2);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        store
            .update(
                USERS,
                "a",
                vec![("bio".to_string(), FieldOp::Set(serde_json::json!("bye")))],
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), before);
    }
}
