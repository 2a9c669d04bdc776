//! In-memory response cache.
//!
//! # Responsibilities
//! - Store responses of cacheable routes for their `cache_timeout`
//! - Serve them again for the same method, URI, mimetype and locale
//!
//! # Design Decisions
//! - Entries carry the route table generation they were produced under;
//!   a rebuilt table makes every older entry stale
//! - Expired entries are dropped lazily on lookup and by `purge`

use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use dashmap::DashMap;

/// Longest time a response is kept, one year.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Identity of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: String,
    pub uri: String,
    pub mime: String,
    pub locale: String,
}

#[derive(Debug, Clone)]
struct CachedResponse {
    generation: u64,
    expires_at: Instant,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// Responses of one application.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: DashMap<CacheKey, CachedResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh response for `key`, if one is stored for `generation`.
    pub fn get(&self, key: &CacheKey, generation: u64) -> Option<Response> {
        self.get_at(key, generation, Instant::now())
    }

    pub fn get_at(&self, key: &CacheKey, generation: u64, now: Instant) -> Option<Response> {
        let entry = self.entries.get(key)?;
        if entry.generation != generation || entry.expires_at <= now {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        let mut response = Response::new(Body::from(entry.body.clone()));
        *response.status_mut() = entry.status;
        *response.headers_mut() = entry.headers.clone();
        Some(response)
    }

    /// Store a response body with its status and headers.
    pub fn insert(
        &self,
        key: CacheKey,
        generation: u64,
        ttl: Duration,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) {
        self.insert_at(key, generation, ttl, status, headers, body, Instant::now());
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_at(
        &self,
        key: CacheKey,
        generation: u64,
        ttl: Duration,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        now: Instant,
    ) {
        let Some(expires_at) = now.checked_add(ttl.min(MAX_CACHE_TTL)) else {
            return;
        };
        self.entries.insert(
            key,
            CachedResponse {
                generation,
                expires_at,
                status,
                headers,
                body,
            },
        );
    }

    /// Drop every entry not valid for `generation` at `now`.
    pub fn purge(&self, generation: u64, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.generation == generation && e.expires_at > now);
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
