// SPDX-License-Identifier: MIT

//! Social graph manager: friend requests, friendships, follows, user search.
//!
//! A friendship is stored redundantly as membership in both users' `friends`
//! arrays. Accept and remove therefore issue two independent per-document
//! updates; if the second fails the graph is left asymmetric and no
//! compensation is attempted.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::db::collections::USERS;
use crate::db::store::{fetch, to_value, DocumentStore, FieldOp, Query};
use crate::db::{SubscriptionBridge, SubscriptionHandle, MAX_CONCURRENT_STORE_OPS};
use crate::error::{AppError, Result};
use crate::models::{FriendRequest, Notification, NotificationKind, RequestStatus, UserRecord, UserSummary};
use crate::services::notifications::publish;
use crate::session::Session;
use crate::time_utils::now_rfc3339;

/// Observable friend-graph state for the signed-in user.
#[derive(Debug, Clone)]
pub struct FriendState {
    pub friends: Vec<UserSummary>,
    /// Incoming pending requests, oldest first.
    pub requests: Vec<FriendRequest>,
    pub loading: bool,
}

impl Default for FriendState {
    fn default() -> Self {
        Self {
            friends: Vec::new(),
            requests: Vec::new(),
            loading: true,
        }
    }
}

/// Friend graph bound to the session identity.
///
/// Read state is kept live by a subscription on the user's own record; each
/// push recomputes membership and fans out one read per friend id for
/// display summaries.
pub struct FriendGraph {
    store: Arc<dyn DocumentStore>,
    session: Session,
    state: Arc<watch::Sender<FriendState>>,
    _subscription: SubscriptionHandle,
}

impl FriendGraph {
    /// Start the manager; must run inside a Tokio runtime.
    pub fn start(
        store: Arc<dyn DocumentStore>,
        session: Session,
        bridge: &SubscriptionBridge,
    ) -> Self {
        let (tx, _) = watch::channel(FriendState::default());
        let state = Arc::new(tx);

        let on_identity = {
            let state = state.clone();
            let store = store.clone();
            move |bridge: &SubscriptionBridge, identity: &crate::session::Identity| {
                let state = state.clone();
                let store = store.clone();
                bridge.subscribe_document(USERS, &identity.id, move |snapshot| {
                    let state = state.clone();
                    let store = store.clone();
                    async move {
                        // The record appears once sign-in bootstraps it.
                        let Some(doc) = snapshot else { return };
                        let record: UserRecord = match doc.decode() {
                            Ok(record) => record,
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping undecodable user record push");
                                return;
                            }
                        };
                        let friends = load_summaries(&store, &record.friends).await;
                        state.send_replace(FriendState {
                            friends,
                            requests: record.friend_requests,
                            loading: false,
                        });
                    }
                })
            }
        };
        let on_clear = {
            let state = state.clone();
            move || {
                state.send_replace(FriendState {
                    loading: false,
                    ..FriendState::default()
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

    /// Observe friend-graph state changes.
    pub fn subscribe(&self) -> watch::Receiver<FriendState> {
        self.state.subscribe()
    }

    /// Current friend-graph state.
    pub fn current(&self) -> FriendState {
        self.state.borrow().clone()
    }

    /// Send a friend request.
    ///
    /// Appends a fresh pending request to the recipient's record. There is
    /// no guard against duplicate pending requests to the same recipient.
    pub async fn send_friend_request(&self, to_id: &str) -> Result<FriendRequest> {
        let identity = self.session.require()?;
        let request = FriendRequest {
            id: Uuid::new_v4().to_string(),
            from: identity.id.clone(),
            to: to_id.to_string(),
            status: RequestStatus::Pending,
            timestamp: now_rfc3339(),
        };

        self.store
            .update(
                USERS,
                to_id,
                vec![(
                    "friend_requests".to_string(),
                    FieldOp::ArrayUnion(to_value(&request)?),
                )],
            )
            .await?;

        publish(
            self.store.as_ref(),
            Notification::new(
                NotificationKind::FriendRequest,
                &identity.id,
                &identity.email,
                to_id,
            ),
        )
        .await;

        tracing::info!(from = %identity.id, to = %to_id, "Friend request sent");
        Ok(request)
    }

    /// Accept an incoming friend request.
    ///
    /// Two writes: (a) add the sender to our `friends` and drop the request,
    /// in one per-document update; (b) add us to the sender's `friends` in a
    /// second, independent update. If (b) fails after (a) succeeded the
    /// relationship stays asymmetric.
    pub async fn accept_friend_request(&self, request: &FriendRequest) -> Result<()> {
        let identity = self.session.require()?;

        self.store
            .update(
                USERS,
                &identity.id,
                vec![
                    (
                        "friends".to_string(),
                        FieldOp::ArrayUnion(json!(request.from)),
                    ),
                    (
                        "friend_requests".to_string(),
                        FieldOp::ArrayRemove(to_value(request)?),
                    ),
                ],
            )
            .await?;

        self.store
            .update(
                USERS,
                &request.from,
                vec![("friends".to_string(), FieldOp::ArrayUnion(json!(identity.id)))],
            )
            .await?;

        // Synthesize the new friend's summary from a direct read so the list
        // updates ahead of the next push.
        if let Some(record) = fetch::<UserRecord>(self.store.as_ref(), USERS, &request.from).await?
        {
            let summary = UserSummary::from_record(&record);
            self.state.send_modify(|state| {
                state.requests.retain(|r| r.id != request.id);
                if !state.friends.iter().any(|f| f.id == summary.id) {
                    state.friends.push(summary);
                }
            });
        }

        tracing::info!(user = %identity.id, friend = %request.from, "Friend request accepted");
        Ok(())
    }

    /// Reject an incoming friend request. The sender is not notified.
    pub async fn reject_friend_request(&self, request: &FriendRequest) -> Result<()> {
        let identity = self.session.require()?;

        self.store
            .update(
                USERS,
                &identity.id,
                vec![(
                    "friend_requests".to_string(),
                    FieldOp::ArrayRemove(to_value(request)?),
                )],
            )
            .await?;

        self.state.send_modify(|state| {
            state.requests.retain(|r| r.id != request.id);
        });
        Ok(())
    }

    /// Remove a friendship from both sides.
    ///
    /// Two independent updates with the same partial-failure exposure as
    /// accept.
    pub async fn remove_friend(&self, friend_id: &str) -> Result<()> {
        let identity = self.session.require()?;

        self.store
            .update(
                USERS,
                &identity.id,
                vec![("friends".to_string(), FieldOp::ArrayRemove(json!(friend_id)))],
            )
            .await?;

        self.store
            .update(
                USERS,
                friend_id,
                vec![("friends".to_string(), FieldOp::ArrayRemove(json!(identity.id)))],
            )
            .await?;

        self.state.send_modify(|state| {
            state.friends.retain(|f| f.id != friend_id);
        });

        tracing::info!(user = %identity.id, friend = %friend_id, "Friend removed");
        Ok(())
    }

    /// Follow or unfollow a user; returns whether we now follow them.
    ///
    /// Flips membership in the target's `followers` and our `following` via
    /// two independent updates. Following records a notification; unfollowing
    /// does not.
    pub async fn toggle_follow(&self, target_id: &str) -> Result<bool> {
        let identity = self.session.require()?;
        let target = fetch::<UserRecord>(self.store.as_ref(), USERS, target_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {target_id}")))?;

        let following = target.followers.iter().any(|id| id == &identity.id);
        let (target_op, own_op) = if following {
            (
                FieldOp::ArrayRemove(json!(identity.id)),
                FieldOp::ArrayRemove(json!(target_id)),
            )
        } else {
            (
                FieldOp::ArrayUnion(json!(identity.id)),
                FieldOp::ArrayUnion(json!(target_id)),
            )
        };

        self.store
            .update(USERS, target_id, vec![("followers".to_string(), target_op)])
            .await?;
        self.store
            .update(USERS, &identity.id, vec![("following".to_string(), own_op)])
            .await?;

        if !following {
            publish(
                self.store.as_ref(),
                Notification::new(
                    NotificationKind::Follow,
                    &identity.id,
                    &identity.email,
                    target_id,
                ),
            )
            .await;
        }

        Ok(!following)
    }

    /// Search users by email prefix.
    pub async fn search_users(&self, term: &str) -> Result<Vec<UserSummary>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let query = Query::collection(USERS)
            .filter_gte("email", json!(term))
            .filter_lte("email", json!(format!("{term}\u{f8ff}")));

        let docs = self.store.query(&query).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<UserRecord>() {
                Ok(record) => Some(UserSummary::from_record(&record)),
                Err(e) => {
                    tracing::warn!(error = %e, id = %doc.id, "Skipping undecodable user record");
                    None
                }
            })
            .collect())
    }
}

/// Fan out one read per friend id, preserving list order.
async fn load_summaries(store: &Arc<dyn DocumentStore>, ids: &[String]) -> Vec<UserSummary> {
    stream::iter(ids.to_vec())
        .map(|id| {
            let store = store.clone();
            async move {
                match fetch::<UserRecord>(store.as_ref(), USERS, &id).await {
                    Ok(Some(record)) => Some(UserSummary::from_record(&record)),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!(error = %e, friend = %id, "Failed to load friend summary");
                        None
                    }
                }
            }
        })
        .buffered(MAX_CONCURRENT_STORE_OPS)
        .collect::<Vec<Option<UserSummary>>>()
        .await
        .into_iter()
        .flatten()
        .collect()
}
