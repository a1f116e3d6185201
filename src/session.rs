// SPDX-License-Identifier: MIT

//! Authenticated-identity context shared by every component.
//!
//! The credential exchange itself lives outside this crate; the embedding
//! application calls `sign_in`/`sign_out` from its auth integration. The
//! session is injected into each component rather than read as ambient
//! global state, and components observe identity changes through `watch`.

use std::sync::Arc;

use tokio::sync::watch;

use crate::db::collections::USERS;
use crate::db::store::{encode, fetch, DocumentStore, FieldOp};
use crate::error::{AppError, Result};
use crate::models::{UserRecord, UserRole};
use crate::time_utils::now_rfc3339;

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub email: String,
    /// Elevated-role flag read from the user record at sign-in.
    pub admin: bool,
}

/// Observable authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub identity: Option<Identity>,
    /// True until the first sign-in or sign-out resolves.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }
}

/// Process-wide session context. Cloning shares the underlying state.
#[derive(Clone)]
pub struct Session {
    state: Arc<watch::Sender<AuthState>>,
}

impl Session {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Observe authentication state changes.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Current authentication state.
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// The signed-in identity, or `Unauthenticated`.
    ///
    /// Mutating operations call this first so that no remote call is
    /// attempted without an identity.
    pub fn require(&self) -> Result<Identity> {
        self.current().identity.ok_or(AppError::Unauthenticated)
    }

    /// The signed-in identity if it carries the elevated-role flag.
    pub fn require_admin(&self) -> Result<Identity> {
        let identity = self.require()?;
        if !identity.admin {
            return Err(AppError::Forbidden);
        }
        Ok(identity)
    }

    /// Install an identity, bootstrapping its user record.
    ///
    /// A missing record is created with defaults; an existing one gets a
    /// `last_activity` refresh and supplies the role flag.
    pub async fn sign_in(
        &self,
        store: &dyn DocumentStore,
        user_id: &str,
        email: &str,
    ) -> Result<Identity> {
        let now = now_rfc3339();
        let admin = match fetch::<UserRecord>(store, USERS, user_id).await? {
            Some(record) => {
                store
                    .update(
                        USERS,
                        user_id,
                        vec![(
                            "last_activity".to_string(),
                            FieldOp::Set(serde_json::Value::String(now)),
                        )],
                    )
                    .await?;
                record.role == UserRole::Admin
            }
            None => {
                let record = UserRecord::new(user_id, email, &now);
                store.set(USERS, user_id, encode(&record)?).await?;
                false
            }
        };

        let identity = Identity {
            id: user_id.to_string(),
            email: email.to_string(),
            admin,
        };
        tracing::info!(user_id, admin, "Signed in");
        self.state.send_replace(AuthState {
            identity: Some(identity.clone()),
            loading: false,
        });
        Ok(identity)
    }

    /// Clear the identity; subscribers tear down their per-user state.
    pub fn sign_out(&self) {
        tracing::info!("Signed out");
        self.state.send_replace(AuthState {
            identity: None,
            loading: false,
        });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
