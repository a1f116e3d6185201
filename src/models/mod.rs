// SPDX-License-Identifier: MIT

//! Data models stored in the document store.

pub mod notification;
pub mod post;
pub mod user;

pub use notification::{Notification, NotificationKind};
pub use post::{Comment, TimelinePost};
pub use user::{
    FriendRequest, RequestStatus, UnavailableEntry, UserRecord, UserRole, UserSummary, WatchedEntry,
};
