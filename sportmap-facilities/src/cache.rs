use std::collections::HashMap;
use std::time::Duration;

use metrics::counter;
use tokio::sync::RwLock;
use tokio::time::Instant;

use sportmap_shared::clients::redis::RedisClient;

/// Serialized listing payloads keyed by filter. A backend failure is a miss,
/// never a request failure.
#[axum::async_trait]
pub trait ListingCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn put(&self, key: &str, payload: &str, ttl: Duration);
}

// --- Redis ---

pub struct RedisListingCache {
    redis: RedisClient,
}

impl RedisListingCache {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[axum::async_trait]
impl ListingCache for RedisListingCache {
    async fn get(&self, key: &str) -> Option<String> {
        match self.redis.get(key).await {
            Ok(hit) => {
                record(hit.is_some());
                hit
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "listing cache read failed");
                record(false);
                None
            }
        }
    }

    async fn put(&self, key: &str, payload: &str, ttl: Duration) {
        if let Err(e) = self.redis.set(key, payload, ttl.as_secs().max(1)).await {
            tracing::warn!(key = %key, error = %e, "listing cache write failed");
        }
    }
}

// --- Process-local ---

const DEFAULT_MAX_ENTRIES: usize = 256;

struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

pub struct MemoryListingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
}

impl MemoryListingCache {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }
}

impl Default for MemoryListingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[axum::async_trait]
impl ListingCache for MemoryListingCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write().await;
        let hit = match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        record(hit.is_some());
        hit
    }

    async fn put(&self, key: &str, payload: &str, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            entries.retain(|_, entry| now < entry.expires_at);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                payload: payload.to_string(),
                expires_at: now + ttl,
            },
        );
    }
}

fn record(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!("listing_cache_lookups_total", "outcome" => outcome).increment(1);
}
