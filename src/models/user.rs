//! User records and the friend-graph data stored on them.
//!
//! A user's document is the unit of consistency: friend accept/remove touch
//! exactly one field on another user's record per remote update, so a
//! partial failure can leave the two sides out of sync (see `FriendGraph`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role stored on a user record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

/// User profile document, keyed by the identity id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Identity id (also the document id)
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Watched movies keyed by movie id
    #[serde(default)]
    pub watched_movies: BTreeMap<String, WatchedEntry>,
    /// Movies marked unavailable, keyed by movie id
    #[serde(default)]
    pub unavailable_movies: BTreeMap<String, UnavailableEntry>,
    /// Friend ids (array with set semantics)
    #[serde(default)]
    pub friends: Vec<String>,
    /// Incoming friend requests, oldest first
    #[serde(default)]
    pub friend_requests: Vec<FriendRequest>,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    /// When the user first signed in (RFC 3339)
    pub created_at: String,
    /// Last social action timestamp (RFC 3339)
    #[serde(default)]
    pub last_activity: String,
}

impl UserRecord {
    /// Fresh record with the defaults written on first sign-in.
    pub fn new(id: &str, email: &str, now: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            role: UserRole::User,
            banned: false,
            bio: String::new(),
            avatar_url: None,
            watched_movies: BTreeMap::new(),
            unavailable_movies: BTreeMap::new(),
            friends: Vec::new(),
            friend_requests: Vec::new(),
            followers: Vec::new(),
            following: Vec::new(),
            created_at: now.to_string(),
            last_activity: now.to_string(),
        }
    }

    pub fn watched_count(&self) -> usize {
        self.watched_movies.len()
    }
}

/// A movie the user has watched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedEntry {
    pub id: u64,
    pub title: String,
    /// When it was marked watched (RFC 3339)
    pub watched_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
}

/// A movie the user could not find anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableEntry {
    pub id: u64,
    pub title: String,
    /// When it was marked unavailable (RFC 3339)
    pub marked_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
}

/// Lifecycle status of a friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Friend request stored on the recipient's record.
///
/// Removed from the recipient's `friend_requests` on accept or reject.
/// Array-remove matches the full value, so the struct must round-trip
/// byte-identically through serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: String,
    pub from: String,
    pub to: String,
    pub status: RequestStatus,
    /// When the request was sent (RFC 3339)
    pub timestamp: String,
}

/// Display summary for a user, synthesized from a record read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub watched_count: usize,
    pub avatar_url: Option<String>,
}

impl UserSummary {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            watched_count: record.watched_count(),
            avatar_url: record.avatar_url.clone(),
        }
    }
}
