// SPDX-License-Identifier: MIT

//! Timeline post and comment models.

use serde::{Deserialize, Serialize};

/// Post in the shared activity timeline.
///
/// Created with a server-assigned timestamp; likes and comments are mutated
/// by union/remove updates from any user. Never deleted outside the admin
/// bulk-delete path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePost {
    /// Document id (assigned by the store on create)
    #[serde(default, skip_serializing)]
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub content: String,
    /// Creation time (RFC 3339, server-assigned)
    pub created_at: String,
    /// Ids of users who liked the post (array with set semantics)
    #[serde(default)]
    pub likes: Vec<String>,
    /// Comments, append-only, oldest first
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movie_title: Option<String>,
}

impl TimelinePost {
    pub fn liked_by(&self, user_id: &str) -> bool {
        self.likes.iter().any(|id| id == user_id)
    }
}

/// Comment appended to a post's comment sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Client-generated unique id
    pub id: String,
    pub user_id: String,
    pub user_email: String,
    pub content: String,
    /// Creation time (RFC 3339, client clock)
    pub created_at: String,
}
