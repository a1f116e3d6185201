//! Document store abstraction: contract, in-memory implementation, and the
//! real-time subscription bridge.

pub mod memory;
pub mod store;
pub mod subscribe;

pub use memory::MemoryStore;
pub use store::{
    encode, fetch, server_timestamp, to_value, Direction, Document, DocumentStore, FieldOp, Fields,
    Query,
};
pub use subscribe::{SubscriptionBridge, SubscriptionHandle};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const TIMELINE: &str = "timeline";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Bound on concurrent store operations issued by a single fan-out.
pub(crate) const MAX_CONCURRENT_STORE_OPS: usize = 16;
