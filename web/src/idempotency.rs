//! `Idempotency-Key` storage for order creation.
//!
//! Clients may send an `Idempotency-Key` header with `POST /orders`;
//! within the TTL window a repeated key returns the originally produced
//! order instead of creating a new one. The key maps to an `orderId`
//! only — the current contract returns the original order regardless of
//! whether the retried body matches.
//!
//! The shipped implementation is an in-process map, which is correct for
//! a single replica and for tests. Multi-replica deployments should
//! provide an [`IdempotencyStore`] backed by a shared store instead; the
//! trait is the extension point.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default retention for idempotency mappings: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Mapping from idempotency key to the `orderId` it produced.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Look up the order produced under this key, if the mapping is
    /// still within its TTL.
    async fn get(&self, key: &str) -> Option<String>;

    /// Record a key → order mapping with the given TTL.
    async fn put(&self, key: &str, order_id: &str, ttl: Duration);
}

struct Entry {
    order_id: String,
    expires_at: Instant,
}

/// In-process idempotency map with lazy TTL expiry.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.order_id.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop the stale entry before reporting a miss.
        self.entries.write().await.remove(key);
        None
    }

    async fn put(&self, key: &str, order_id: &str, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > Instant::now());
        entries.insert(
            key.to_string(),
            Entry {
                order_id: order_id.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repeated_key_returns_the_original_order() {
        let store = InMemoryIdempotencyStore::new();
        store.put("idem-123", "ord_1", DEFAULT_TTL).await;

        assert_eq!(store.get("idem-123").await, Some("ord_1".to_string()));
        assert_eq!(store.get("idem-456").await, None);
    }

    #[tokio::test]
    async fn expired_mapping_is_a_miss() {
        let store = InMemoryIdempotencyStore::new();
        store.put("idem-123", "ord_1", Duration::from_millis(10)).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("idem-123").await, None);
    }

    #[tokio::test]
    async fn put_overwrites_within_ttl() {
        let store = InMemoryIdempotencyStore::new();
        store.put("idem-123", "ord_1", DEFAULT_TTL).await;
        store.put("idem-123", "ord_2", DEFAULT_TTL).await;

        assert_eq!(store.get("idem-123").await, Some("ord_2".to_string()));
    }
}
