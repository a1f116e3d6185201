// SPDX-License-Identifier: MIT

//! Administrative operations: user listing, moderation, bulk deletion.
//!
//! Every operation requires the elevated-role flag on the session identity.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde::Serialize;
use serde_json::json;

use crate::db::collections::{NOTIFICATIONS, TIMELINE, USERS};
use crate::db::store::{to_value, DocumentStore, FieldOp, Query};
use crate::db::MAX_CONCURRENT_STORE_OPS;
use crate::error::Result;
use crate::models::{UserRecord, UserRole};
use crate::session::Session;

/// User row in the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct AdminUserView {
    pub id: String,
    pub email: String,
    pub role: UserRole,
    pub banned: bool,
    pub created_at: String,
    pub last_activity: String,
    pub total_watched: usize,
}

/// Admin service gated on the elevated-role flag.
pub struct AdminService {
    store: Arc<dyn DocumentStore>,
    session: Session,
}

impl AdminService {
    pub fn new(store: Arc<dyn DocumentStore>, session: Session) -> Self {
        Self { store, session }
    }

    /// List every user record.
    pub async fn list_users(&self) -> Result<Vec<AdminUserView>> {
        self.session.require_admin()?;
        let docs = self.store.query(&Query::collection(USERS)).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<UserRecord>() {
                Ok(record) => Some(AdminUserView {
                    id: record.id.clone(),
                    email: record.email.clone(),
                    role: record.role,
                    banned: record.banned,
                    created_at: record.created_at.clone(),
                    last_activity: record.last_activity.clone(),
                    total_watched: record.watched_count(),
                }),
                Err(e) => {
                    tracing::warn!(error = %e, id = %doc.id, "Skipping undecodable user record");
                    None
                }
            })
            .collect())
    }

    /// Set or clear a user's ban flag.
    pub async fn set_banned(&self, user_id: &str, banned: bool) -> Result<()> {
        self.session.require_admin()?;
        self.store
            .update(
                USERS,
                user_id,
                vec![("banned".to_string(), FieldOp::Set(json!(banned)))],
            )
            .await
    }

    /// Change a user's role.
    pub async fn set_role(&self, user_id: &str, role: UserRole) -> Result<()> {
        self.session.require_admin()?;
        self.store
            .update(
                USERS,
                user_id,
                vec![("role".to_string(), FieldOp::Set(to_value(&role)?))],
            )
            .await
    }

    /// Delete a user and everything derived from them.
    ///
    /// Removes the user record, every timeline post they authored, and every
    /// notification targeting them, with bounded concurrent deletes.
    /// Returns the number of documents deleted.
    pub async fn delete_user(&self, user_id: &str) -> Result<usize> {
        self.session.require_admin()?;
        let mut deleted_count = 0;

        self.store.delete(USERS, user_id).await?;
        deleted_count += 1;

        let posts = self
            .store
            .query(&Query::collection(TIMELINE).filter_eq("user_id", json!(user_id)))
            .await?;
        deleted_count += self.delete_all(TIMELINE, &posts).await?;

        let notifications = self
            .store
            .query(&Query::collection(NOTIFICATIONS).filter_eq("to_user_id", json!(user_id)))
            .await?;
        deleted_count += self.delete_all(NOTIFICATIONS, &notifications).await?;

        tracing::info!(user_id, deleted_count, "User data deletion complete");
        Ok(deleted_count)
    }

    async fn delete_all(
        &self,
        collection: &'static str,
        docs: &[crate::db::Document],
    ) -> Result<usize> {
        let ids: Vec<String> = docs.iter().map(|doc| doc.id.clone()).collect();
        let count = ids.len();

        stream::iter(ids)
            .map(|id| {
                let store = self.store.clone();
                async move { store.delete(collection, &id).await }
            })
            .buffer_unordered(MAX_CONCURRENT_STORE_OPS)
            .collect::<Vec<Result<()>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        Ok(count)
    }
}
