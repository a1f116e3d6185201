// SPDX-License-Identifier: MIT

//! Fright-Tracker: social core for working through a horror-movie catalog
//! with friends.
//!
//! This crate is the client-side synchronization core: friend graph,
//! activity feed, notification stream, catalog cache, and progress tracking,
//! all kept consistent against a push-capable document store. View
//! rendering, routing, and credential exchange live in the embedding
//! application.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::{DocumentStore, SubscriptionBridge};
use services::{
    AdminService, CatalogService, FriendGraph, Notifications, Progress, Timeline, TmdbClient,
};
use session::Session;

/// Shared application state: the session plus every component, wired to one
/// store.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub session: Session,
    pub bridge: SubscriptionBridge,
    pub friends: FriendGraph,
    pub timeline: Timeline,
    pub notifications: Notifications,
    pub catalog: CatalogService,
    pub progress: Progress,
    pub admin: AdminService,
}

impl AppState {
    /// Wire every component to the given store.
    ///
    /// Spawns the subscription tasks, so this must run inside a Tokio
    /// runtime.
    pub fn new(config: Config, store: Arc<dyn DocumentStore>) -> Self {
        let session = Session::new();
        let bridge = SubscriptionBridge::new(store.clone());
        let friends = FriendGraph::start(store.clone(), session.clone(), &bridge);
        let timeline = Timeline::new(
            store.clone(),
            session.clone(),
            config.feed_page_size,
            None,
        );
        let notifications = Notifications::start(store.clone(), session.clone(), &bridge);
        let catalog = CatalogService::new(&config, Arc::new(TmdbClient::new(&config)));
        let progress = Progress::start(store.clone(), session.clone(), &bridge);
        let admin = AdminService::new(store.clone(), session.clone());

        Self {
            config,
            store,
            session,
            bridge,
            friends,
            timeline,
            notifications,
            catalog,
            progress,
            admin,
        }
    }

    /// A feed restricted to one author, for profile views.
    pub fn author_timeline(&self, user_id: &str) -> Timeline {
        Timeline::new(
            self.store.clone(),
            self.session.clone(),
            self.config.feed_page_size,
            Some(user_id.to_string()),
        )
    }
}
