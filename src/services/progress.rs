// SPDX-License-Identifier: MIT

//! Watch progress: watched and unavailable movies on the user's own record.
//!
//! The two maps are mutually exclusive per movie id. Both are rewritten
//! whole in a single per-document update (read-modify-write), together with
//! the `last_activity` refresh the feed sorts on.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use crate::db::collections::USERS;
use crate::db::store::{encode, fetch, to_value, DocumentStore, FieldOp};
use crate::db::{SubscriptionBridge, SubscriptionHandle};
use crate::error::{AppError, Result};
use crate::models::{UnavailableEntry, UserRecord, WatchedEntry};
use crate::session::Session;
use crate::time_utils::now_rfc3339;

/// Observable progress state for the signed-in user.
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub user_id: String,
    pub email: String,
    pub watched: std::collections::BTreeMap<String, WatchedEntry>,
    pub unavailable: std::collections::BTreeMap<String, UnavailableEntry>,
    pub loading: bool,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            email: String::new(),
            watched: std::collections::BTreeMap::new(),
            unavailable: std::collections::BTreeMap::new(),
            loading: true,
        }
    }
}

impl ProgressState {
    pub fn total_watched(&self) -> usize {
        self.watched.len()
    }
}

/// Progress tracker bound to the session identity.
pub struct Progress {
    store: Arc<dyn DocumentStore>,
    session: Session,
    state: Arc<watch::Sender<ProgressState>>,
    _subscription: SubscriptionHandle,
}

impl Progress {
    /// Start the tracker; must run inside a Tokio runtime.
    pub fn start(
        store: Arc<dyn DocumentStore>,
        session: Session,
        bridge: &SubscriptionBridge,
    ) -> Self {
        let (tx, _) = watch::channel(ProgressState::default());
        let state = Arc::new(tx);

        let on_identity = {
            let state = state.clone();
            move |bridge: &SubscriptionBridge, identity: &crate::session::Identity| {
                let state = state.clone();
                bridge.subscribe_document(USERS, &identity.id, move |snapshot| {
                    let state = state.clone();
                    async move {
                        let Some(doc) = snapshot else { return };
                        match doc.decode::<UserRecord>() {
                            Ok(record) => {
                                state.send_replace(ProgressState {
                                    user_id: record.id,
                                    email: record.email,
                                    watched: record.watched_movies,
                                    unavailable: record.unavailable_movies,
                                    loading: false,
                                });
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Skipping undecodable user record push");
                            }
                        }
                    }
                })
            }
        };
        let on_clear = {
            let state = state.clone();
            move || {
                state.send_replace(ProgressState {
                    loading: false,
                    ..ProgressState::default()
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

    /// Observe progress state changes.
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }

    /// Current progress state.
    pub fn current(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    /// Mark a movie watched, removing any unavailable marker for it.
    pub async fn mark_as_watched(
        &self,
        movie_id: u64,
        title: &str,
        rating: Option<u8>,
        review: Option<&str>,
        poster_path: Option<&str>,
    ) -> Result<()> {
        let identity = self.session.require()?;
        let now = now_rfc3339();
        let mut record = self.load_or_init_record(&identity, &now).await?;

        let key = movie_id.to_string();
        record.unavailable_movies.remove(&key);
        record.watched_movies.insert(
            key,
            WatchedEntry {
                id: movie_id,
                title: title.to_string(),
                watched_at: now.clone(),
                rating,
                review: review.map(String::from),
                poster_path: poster_path.map(String::from),
            },
        );

        self.write_maps(&identity.id, &record, &now).await
    }

    /// Mark a movie unavailable, removing any watched entry for it.
    pub async fn mark_as_unavailable(
        &self,
        movie_id: u64,
        title: &str,
        reason: Option<&str>,
        poster_path: Option<&str>,
    ) -> Result<()> {
        let identity = self.session.require()?;
        let now = now_rfc3339();
        let mut record = self.load_or_init_record(&identity, &now).await?;

        let key = movie_id.to_string();
        record.watched_movies.remove(&key);
        record.unavailable_movies.insert(
            key,
            UnavailableEntry {
                id: movie_id,
                title: title.to_string(),
                marked_at: now.clone(),
                reason: reason.map(String::from),
                poster_path: poster_path.map(String::from),
            },
        );

        self.write_maps(&identity.id, &record, &now).await
    }

    /// Clear a movie from both maps.
    ///
    /// Unlike the mark operations this requires the record to exist.
    pub async fn remove_movie_status(&self, movie_id: u64) -> Result<()> {
        let identity = self.session.require()?;
        let mut record = fetch::<UserRecord>(self.store.as_ref(), USERS, &identity.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user record {}", identity.id)))?;

        let key = movie_id.to_string();
        record.watched_movies.remove(&key);
        record.unavailable_movies.remove(&key);

        self.write_maps(&identity.id, &record, &now_rfc3339()).await
    }

    async fn load_or_init_record(
        &self,
        identity: &crate::session::Identity,
        now: &str,
    ) -> Result<UserRecord> {
        match fetch::<UserRecord>(self.store.as_ref(), USERS, &identity.id).await? {
            Some(record) => Ok(record),
            None => {
                let record = UserRecord::new(&identity.id, &identity.email, now);
                self.store
                    .set(USERS, &identity.id, encode(&record)?)
                    .await?;
                Ok(record)
            }
        }
    }

    async fn write_maps(&self, user_id: &str, record: &UserRecord, now: &str) -> Result<()> {
        self.store
            .update(
                USERS,
                user_id,
                vec![
                    (
                        "watched_movies".to_string(),
                        FieldOp::Set(to_value(&record.watched_movies)?),
                    ),
                    (
                        "unavailable_movies".to_string(),
                        FieldOp::Set(to_value(&record.unavailable_movies)?),
                    ),
                    ("last_activity".to_string(), FieldOp::Set(json!(now))),
                ],
            )
            .await
    }
}
