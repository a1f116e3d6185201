// SPDX-License-Identifier: MIT

//! Notification stream: derived read/unread events for the signed-in user.
//!
//! Notifications are produced by the social flows (friend request sent,
//! like, comment, follow) and consumed here through a per-identity query
//! subscription ordered by creation time descending. Accepting or rejecting
//! a friend request produces nothing, mirroring the source behavior.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde_json::json;
use tokio::sync::watch;

use crate::db::collections::NOTIFICATIONS;
use crate::db::store::{encode, DocumentStore, FieldOp, Query};
use crate::db::{SubscriptionBridge, SubscriptionHandle, MAX_CONCURRENT_STORE_OPS};
use crate::error::Result;
use crate::models::Notification;
use crate::session::Session;

/// Observable notification state for the signed-in user.
#[derive(Debug, Clone)]
pub struct NotificationState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub loading: bool,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            loading: true,
        }
    }
}

/// Live notification stream bound to the session identity.
pub struct Notifications {
    store: Arc<dyn DocumentStore>,
    session: Session,
    state: Arc<watch::Sender<NotificationState>>,
    _subscription: SubscriptionHandle,
}

impl Notifications {
    /// Start the stream; re-subscribes on identity change and clears on
    /// sign-out. Must run inside a Tokio runtime.
    pub fn start(
        store: Arc<dyn DocumentStore>,
        session: Session,
        bridge: &SubscriptionBridge,
    ) -> Self {
        let (tx, _) = watch::channel(NotificationState::default());
        let state = Arc::new(tx);

        let on_identity = {
            let state = state.clone();
            move |bridge: &SubscriptionBridge, identity: &crate::session::Identity| {
                let query = Query::collection(NOTIFICATIONS)
                    .filter_eq("to_user_id", json!(identity.id))
                    .order_by_desc("created_at");
                let state = state.clone();
                bridge.subscribe_query(query, move |docs| {
                    let state = state.clone();
                    async move {
                        let notifications: Vec<Notification> = docs
                            .iter()
                            .filter_map(|doc| match doc.decode() {
                                Ok(notification) => Some(notification),
                                Err(e) => {
                                    tracing::warn!(error = %e, id = %doc.id, "Skipping undecodable notification");
                                    None
                                }
                            })
                            .collect();
                        let unread_count =
                            notifications.iter().filter(|n| !n.read).count();
                        state.send_replace(NotificationState {
                            notifications,
                            unread_count,
                            loading: false,
                        });
                    }
                })
            }
        };
        let on_clear = {
            let state = state.clone();
            move || {
                state.send_replace(NotificationState {
                    loading: false,
                    ..NotificationState::default()
                });
            }
        };
        let subscription = bridge.subscribe_per_identity(&session, on_identity, on_clear);

        Self {
            store,
            session,
            state,
            _subscription: subscription,
        }
    }

    /// Observe notification state changes.
    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.state.subscribe()
    }

    /// Current notification state.
    pub fn current(&self) -> NotificationState {
        self.state.borrow().clone()
    }

    /// Mark one notification read.
    ///
    /// No optimistic apply: the subscription push reflects the change.
    pub async fn mark_as_read(&self, notification_id: &str) -> Result<()> {
        self.session.require()?;
        self.store
            .update(
                NOTIFICATIONS,
                notification_id,
                vec![("read".to_string(), FieldOp::Set(json!(true)))],
            )
            .await
    }

    /// Mark every unread notification read.
    ///
    /// One independent update per record, issued with bounded concurrency.
    /// A crash mid-fan-out leaves a partial read-state; retrying is
    /// idempotent.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        self.session.require()?;
        let unread: Vec<String> = self
            .state
            .borrow()
            .notifications
            .iter()
            .filter(|n| !n.read)
            .map(|n| n.id.clone())
            .collect();

        stream::iter(unread)
            .map(|id| {
                let store = self.store.clone();
                async move {
                    store
                        .update(
                            NOTIFICATIONS,
                            &id,
                            vec![("read".to_string(), FieldOp::Set(json!(true)))],
                        )
                        .await
                }
            })
            .buffer_unordered(MAX_CONCURRENT_STORE_OPS)
            .collect::<Vec<Result<()>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        Ok(())
    }
}

/// Record a notification produced by a social action.
///
/// Best-effort: the social action already succeeded, so a failure here is
/// logged rather than propagated.
pub(crate) async fn publish(store: &dyn DocumentStore, notification: Notification) {
    let fields = match encode(&notification) {
        Ok(fields) => fields,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode notification");
            return;
        }
    };
    if let Err(e) = store.create(NOTIFICATIONS, fields).await {
        tracing::warn!(error = %e, to = %notification.to_user_id, "Failed to record notification");
    }
}
