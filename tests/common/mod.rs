// SPDX-License-Identifier: MIT

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fright_tracker::config::Config;
use fright_tracker::db::MemoryStore;
use fright_tracker::session::Identity;
use fright_tracker::AppState;
use tokio::sync::watch;

/// Create app state over a fresh in-memory store.
///
/// The store handle is returned alongside so tests can seed documents and
/// inject write failures.
#[allow(dead_code)]
pub fn test_state() -> (AppState, MemoryStore) {
    init_tracing();
    let store = MemoryStore::new();
    let state = AppState::new(Config::default(), Arc::new(store.clone()));
    (state, store)
}

/// Sign a user in, bootstrapping their record.
#[allow(dead_code)]
pub async fn sign_in(state: &AppState, user_id: &str) -> Identity {
    state
        .session
        .sign_in(
            state.store.as_ref(),
            user_id,
            &format!("{user_id}@example.com"),
        )
        .await
        .expect("sign-in should succeed")
}

/// Wait until observed state satisfies the predicate, or panic after 5s.
#[allow(dead_code)]
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    let deadline = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&rx.borrow()) {
                return rx.borrow().clone();
            }
            rx.changed().await.expect("state channel closed");
        }
    });
    deadline.await.expect("timed out waiting for state")
}

/// Run with a timeout so a stuck subscription fails the test instead of
/// hanging it.
#[allow(dead_code)]
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
