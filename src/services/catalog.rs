// SPDX-License-Identifier: MIT

//! Catalog API client and time-bounded query cache.
//!
//! Handles:
//! - Paginated discovery queries with an optional release-year filter
//! - Client-side filtering before caching (poster present, year match)
//! - TTL'd, capacity-bounded caching with least-recently-used eviction
//! - Cancellation of superseded in-flight fetches
//! - Trailer lookup per movie

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AppError, Result};

/// Movie entry returned by the discovery endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogMovie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub vote_average: f64,
}

impl CatalogMovie {
    /// Release year parsed from the leading "YYYY" of the release date.
    pub fn release_year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|year| year.parse().ok())
    }
}

/// One page of the discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPage {
    pub page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub results: Vec<CatalogMovie>,
}

/// Video entry from the trailer-lookup endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrailerVideo {
    pub key: String,
    pub name: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    #[serde(default)]
    results: Vec<TrailerVideo>,
}

/// Catalog API seam; implemented by `TmdbClient` and by test stubs.
#[async_trait]
pub trait CatalogFetch: Send + Sync + 'static {
    /// Fetch one discovery page. Aborts with `Cancelled` when the token
    /// fires before the response arrives.
    async fn discover(
        &self,
        page: u32,
        year: Option<u16>,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage>;

    /// Fetch the video list for a movie.
    async fn videos(&self, movie_id: u64, cancel: &CancellationToken) -> Result<Vec<TrailerVideo>>;
}

/// TMDB API client.
#[derive(Clone)]
pub struct TmdbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    genre: u16,
}

impl TmdbClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.tmdb_base_url.clone(),
            api_key: config.tmdb_api_key.clone(),
            genre: config.catalog_genre,
        }
    }

    /// GET with JSON response, raced against the cancellation token.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<T> {
        let request = self.http.get(url).query(params).send();
        tokio::select! {
            () = cancel.cancelled() => Err(AppError::Cancelled),
            response = request => {
                let response = response.map_err(|e| AppError::CatalogApi(e.to_string()))?;
                check_response_json(response).await
            }
        }
    }
}

#[async_trait]
impl CatalogFetch for TmdbClient {
    async fn discover(
        &self,
        page: u32,
        year: Option<u16>,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage> {
        let url = format!("{}/discover/movie", self.base_url);
        let mut params = vec![
            ("api_key", self.api_key.clone()),
            ("with_genres", self.genre.to_string()),
            ("page", page.to_string()),
            ("sort_by", "popularity.desc".to_string()),
            ("include_adult", "false".to_string()),
            ("language", "en-US".to_string()),
        ];
        if let Some(year) = year {
            params.push(("primary_release_year", year.to_string()));
        }
        self.get_json(&url, &params, cancel).await
    }

    async fn videos(&self, movie_id: u64, cancel: &CancellationToken) -> Result<Vec<TrailerVideo>> {
        let url = format!("{}/movie/{}/videos", self.base_url, movie_id);
        let params = [("api_key", self.api_key.clone())];
        let response: VideoResponse = self.get_json(&url, &params, cancel).await?;
        Ok(response.results)
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::CatalogApi(format!("HTTP {status}: {body}")));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::CatalogApi(format!("JSON parse error: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// CatalogService - cached, cancellable catalog queries
// ─────────────────────────────────────────────────────────────────────────────

/// Cache key for a discovery page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub page: u32,
    pub year: Option<u16>,
}

/// Post-filter page payload exposed to the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPageView {
    pub movies: Vec<CatalogMovie>,
    pub has_more: bool,
}

struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
    last_used: Instant,
}

/// Time-bounded cache with fixed capacity and least-recently-used eviction.
struct TtlCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Fresh value for the key, touching its recency; stale entries are
    /// dropped and treated as absent.
    fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if now.duration_since(entry.fetched_at) < self.ttl {
                entry.last_used = now;
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: now,
                last_used: now,
            },
        );
    }

    /// The cache stays small, so a full scan for the oldest entry is fine.
    fn evict_lru(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().last_used)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Cached catalog queries with in-flight cancellation.
pub struct CatalogService {
    fetcher: Arc<dyn CatalogFetch>,
    pages: TtlCache<PageKey, CatalogPageView>,
    trailers: TtlCache<u64, Option<TrailerVideo>>,
    /// The one in-flight discovery fetch, if any.
    inflight: Mutex<Option<(PageKey, CancellationToken)>>,
}

impl CatalogService {
    pub fn new(config: &Config, fetcher: Arc<dyn CatalogFetch>) -> Self {
        Self {
            fetcher,
            pages: TtlCache::new(config.catalog_cache_ttl, config.catalog_cache_capacity),
            trailers: TtlCache::new(config.catalog_cache_ttl, config.catalog_cache_capacity),
            inflight: Mutex::new(None),
        }
    }

    /// One discovery page, from cache when fresh.
    ///
    /// A fetch for a new page/year combination cancels the previous
    /// in-flight fetch so stale results cannot apply out of order; the
    /// superseded caller gets `Cancelled` and discards it.
    pub async fn movies(&self, page: u32, year: Option<u16>) -> Result<CatalogPageView> {
        let key = PageKey { page, year };
        if let Some(view) = self.pages.get(&key) {
            return Ok(view);
        }

        let cancel = self.begin_fetch(&key).await;
        let result = self.fetcher.discover(page, year, &cancel).await;
        self.finish_fetch(&key).await;
        let fetched = result?;

        let has_more = fetched.page < fetched.total_pages;
        let view = CatalogPageView {
            movies: filter_catalog(fetched.results, year),
            has_more,
        };
        self.pages.insert(key, view.clone());
        Ok(view)
    }

    /// Preferred trailer for a movie: an official YouTube trailer when one
    /// exists, otherwise the first video, otherwise none.
    pub async fn trailer(&self, movie_id: u64) -> Result<Option<TrailerVideo>> {
        if let Some(cached) = self.trailers.get(&movie_id) {
            return Ok(cached);
        }

        let cancel = CancellationToken::new();
        let videos = self.fetcher.videos(movie_id, &cancel).await?;
        let trailer = videos
            .iter()
            .find(|video| video.video_type == "Trailer" && video.site == "YouTube")
            .cloned()
            .or_else(|| videos.first().cloned());

        self.trailers.insert(movie_id, trailer.clone());
        Ok(trailer)
    }

    async fn begin_fetch(&self, key: &PageKey) -> CancellationToken {
        let mut inflight = self.inflight.lock().await;
        if let Some((previous_key, token)) = inflight.take() {
            if previous_key != *key {
                tracing::debug!(?previous_key, ?key, "Cancelling superseded catalog fetch");
                token.cancel();
            }
        }
        let token = CancellationToken::new();
        *inflight = Some((key.clone(), token.clone()));
        token
    }

    async fn finish_fetch(&self, key: &PageKey) {
        let mut inflight = self.inflight.lock().await;
        if matches!(&*inflight, Some((current, _)) if current == key) {
            *inflight = None;
        }
    }
}

/// Drop entries without a poster or whose release year does not match the
/// requested year. The cache stores post-filter results, so the cache key
/// carries the year that shaped them.
fn filter_catalog(results: Vec<CatalogMovie>, year: Option<u16>) -> Vec<CatalogMovie> {
    results
        .into_iter()
        .filter(|movie| {
            movie.poster_path.is_some()
                && movie.release_date.as_deref().is_some_and(|d| !d.is_empty())
                && match year {
                    Some(year) => movie.release_year() == Some(i32::from(year)),
                    None => true,
                }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_movie(id: u64, poster: Option<&str>, release_date: Option<&str>) -> CatalogMovie {
        CatalogMovie {
            id,
            title: format!("Movie {id}"),
            poster_path: poster.map(String::from),
            release_date: release_date.map(String::from),
            overview: String::new(),
            vote_average: 6.66,
        }
    }

    #[test]
    fn test_filter_drops_missing_posters() {
        let movies = vec![
            make_movie(1, Some("/a.jpg"), Some("1985-06-01")),
            make_movie(2, None, Some("1985-07-01")),
        ];
        let filtered = filter_catalog(movies, Some(1985));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }

    #[test]
    fn test_filter_drops_year_mismatches() {
        let movies = vec![
            make_movie(1, Some("/a.jpg"), Some("1985-06-01")),
            make_movie(2, Some("/b.jpg"), Some("1986-01-01")),
            make_movie(3, Some("/c.jpg"), None),
        ];
        let filtered = filter_catalog(movies, Some(1985));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }

    #[test]
    fn test_filter_without_year_keeps_all_posters() {
        let movies = vec![
            make_movie(1, Some("/a.jpg"), Some("1985-06-01")),
            make_movie(2, Some("/b.jpg"), Some("1999-01-01")),
        ];
        assert_eq!(filter_catalog(movies, None).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache_expires_entries() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(300), 8);
        cache.insert(1, 100);
        assert_eq!(cache.get(&1), Some(100));

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(cache.get(&1), Some(100));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(cache.get(&1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_cache_evicts_least_recently_used() {
        let cache: TtlCache<u32, u32> = TtlCache::new(Duration::from_secs(300), 2);
        cache.insert(1, 100);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert(2, 200);
        tokio::time::advance(Duration::from_secs(1)).await;

        // Touch 1 so that 2 becomes the least recently used.
        assert_eq!(cache.get(&1), Some(100));
        tokio::time::advance(Duration::from_secs(1)).await;

        cache.insert(3, 300);
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(100));
        assert_eq!(cache.get(&3), Some(300));
    }
}
