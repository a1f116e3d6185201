// SPDX-License-Identifier: MIT

//! Notification records derived from social actions.

use serde::{Deserialize, Serialize};

use crate::time_utils::now_rfc3339;

/// What a notification is about.
///
/// Closed set of kinds, each carrying only its relevant context; consumers
/// dispatch with an exhaustive match instead of inspecting optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    Like { post_id: String, post_content: String },
    Comment { post_id: String, post_content: String },
    Follow,
    FriendRequest,
}

/// Notification document targeting a single user.
///
/// Created as a side effect of a social action; only the read flag is ever
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Document id (assigned by the store on create)
    #[serde(default, skip_serializing)]
    pub id: String,
    pub from_user_id: String,
    pub from_user_email: String,
    pub to_user_id: String,
    #[serde(default)]
    pub read: bool,
    /// Creation time (RFC 3339)
    pub created_at: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
}

impl Notification {
    /// Build an unread notification from one user to another.
    pub fn new(kind: NotificationKind, from_id: &str, from_email: &str, to_id: &str) -> Self {
        Self {
            id: String::new(),
            from_user_id: from_id.to_string(),
            from_user_email: from_email.to_string(),
            to_user_id: to_id.to_string(),
            read: false,
            created_at: now_rfc3339(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_with_type_tag() {
        let n = Notification::new(
            NotificationKind::Comment {
                post_id: "p1".to_string(),
                post_content: "scary stuff".to_string(),
            },
            "a",
            "a@example.com",
            "b",
        );

        let value = serde_json::to_value(&n).expect("serialize");
        assert_eq!(value["type"], "comment");
        assert_eq!(value["post_id"], "p1");

        let back: Notification = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back.kind, n.kind);
    }

    #[test]
    fn test_unit_kinds_serialize_without_context() {
        let n = Notification::new(NotificationKind::Follow, "a", "a@example.com", "b");
        let value = serde_json::to_value(&n).expect("serialize");
        assert_eq!(value["type"], "follow");
        assert!(value.get("post_id").is_none());
    }
}
