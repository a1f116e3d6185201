// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fright_tracker::config::Config;
use fright_tracker::error::{AppError, Result};
use fright_tracker::services::{
    CatalogFetch, CatalogMovie, CatalogService, TrailerVideo,
};
use fright_tracker::services::catalog::CatalogPage;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Catalog stub that counts fetches and can hold responses until released.
struct StubCatalog {
    fetches: AtomicUsize,
    movies_per_page: usize,
    total_pages: u32,
    /// When set, `discover` blocks until `release` is notified.
    gate: Option<Notify>,
}

impl StubCatalog {
    fn new(movies_per_page: usize, total_pages: u32) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            movies_per_page,
            total_pages,
            gate: None,
        }
    }

    fn gated(movies_per_page: usize, total_pages: u32) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::new(movies_per_page, total_pages)
        }
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn make_page(&self, page: u32, year: Option<u16>) -> CatalogPage {
        let year = year.unwrap_or(1985);
        let results = (0..self.movies_per_page)
            .map(|i| CatalogMovie {
                id: u64::from(page) * 100 + i as u64,
                title: format!("Movie {page}-{i}"),
                poster_path: Some(format!("/poster-{page}-{i}.jpg")),
                release_date: Some(format!("{year}-06-01")),
                overview: String::new(),
                vote_average: 6.66,
            })
            .collect();
        CatalogPage {
            page,
            total_pages: self.total_pages,
            results,
        }
    }
}

#[async_trait]
impl CatalogFetch for StubCatalog {
    async fn discover(
        &self,
        page: u32,
        year: Option<u16>,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            tokio::select! {
                () = cancel.cancelled() => return Err(AppError::Cancelled),
                () = gate.notified() => {}
            }
        }
        Ok(self.make_page(page, year))
    }

    async fn videos(&self, movie_id: u64, _cancel: &CancellationToken) -> Result<Vec<TrailerVideo>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            TrailerVideo {
                key: format!("teaser-{movie_id}"),
                name: "Teaser".to_string(),
                site: "YouTube".to_string(),
                video_type: "Teaser".to_string(),
            },
            TrailerVideo {
                key: format!("trailer-{movie_id}"),
                name: "Official Trailer".to_string(),
                site: "YouTube".to_string(),
                video_type: "Trailer".to_string(),
            },
        ])
    }
}

fn service_with(stub: Arc<StubCatalog>) -> CatalogService {
    CatalogService::new(&Config::default(), stub)
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_within_ttl_then_refetch_after() {
    let stub = Arc::new(StubCatalog::new(3, 5));
    let service = service_with(stub.clone());

    // t=0: miss, fetch.
    let first = service.movies(1, Some(1985)).await.expect("fetch");
    assert_eq!(stub.fetch_count(), 1);

    // t=100s: inside the 300s TTL, identical payload, no new fetch.
    tokio::time::advance(std::time::Duration::from_secs(100)).await;
    let second = service.movies(1, Some(1985)).await.expect("cached");
    assert_eq!(stub.fetch_count(), 1);
    assert_eq!(second, first);

    // t=400s: past the TTL, a fresh fetch happens.
    tokio::time::advance(std::time::Duration::from_secs(300)).await;
    service.movies(1, Some(1985)).await.expect("refetched");
    assert_eq!(stub.fetch_count(), 2);
}

#[tokio::test]
async fn test_distinct_keys_are_cached_separately() {
    let stub = Arc::new(StubCatalog::new(3, 5));
    let service = service_with(stub.clone());

    service.movies(1, Some(1985)).await.expect("fetch");
    service.movies(2, Some(1985)).await.expect("fetch");
    service.movies(1, Some(1986)).await.expect("fetch");
    assert_eq!(stub.fetch_count(), 3);

    // All three keys now hit.
    service.movies(1, Some(1985)).await.expect("hit");
    service.movies(2, Some(1985)).await.expect("hit");
    service.movies(1, Some(1986)).await.expect("hit");
    assert_eq!(stub.fetch_count(), 3);
}

#[tokio::test]
async fn test_new_key_cancels_in_flight_fetch() {
    let stub = Arc::new(StubCatalog::gated(3, 5));
    let service = Arc::new(service_with(stub.clone()));

    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.movies(1, Some(1985)).await })
    };
    // Let the first fetch reach the gate.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.movies(2, Some(1985)).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    stub.release();

    let superseded = first.await.expect("join");
    assert!(matches!(superseded, Err(AppError::Cancelled)));

    let current = second.await.expect("join").expect("second fetch");
    assert_eq!(current.movies.len(), 3);
}

#[tokio::test]
async fn test_has_more_follows_total_pages() {
    let stub = Arc::new(StubCatalog::new(3, 2));
    let service = service_with(stub.clone());

    let first = service.movies(1, None).await.expect("fetch");
    assert!(first.has_more);
    let last = service.movies(2, None).await.expect("fetch");
    assert!(!last.has_more);
}

#[tokio::test]
async fn test_trailer_prefers_youtube_trailer_and_caches() {
    let stub = Arc::new(StubCatalog::new(0, 1));
    let service = service_with(stub.clone());

    let trailer = service.trailer(42).await.expect("lookup").expect("some");
    assert_eq!(trailer.video_type, "Trailer");
    assert_eq!(trailer.key, "trailer-42");
    assert_eq!(stub.fetch_count(), 1);

    service.trailer(42).await.expect("cached");
    assert_eq!(stub.fetch_count(), 1);
}
