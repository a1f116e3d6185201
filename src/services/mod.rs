// SPDX-License-Identifier: MIT

//! Services module - the synchronization core's components.

pub mod admin;
pub mod catalog;
pub mod friends;
pub mod notifications;
pub mod progress;
pub mod timeline;

pub use admin::{AdminService, AdminUserView};
pub use catalog::{CatalogFetch, CatalogMovie, CatalogPageView, CatalogService, TmdbClient, TrailerVideo};
pub use friends::{FriendGraph, FriendState};
pub use notifications::{NotificationState, Notifications};
pub use progress::{Progress, ProgressState};
pub use timeline::{FeedState, Optimistic, Timeline};
