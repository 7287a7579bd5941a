//! Plan cache (§4.4 step 1 / step 7): avoids re-planning identical requests
//! within a TTL window. Two implementations share the [`PlanCache`] trait —
//! a small trait wrapping an `Arc<RwLock<...>>`-guarded map, swappable
//! behind a trait object.

use async_trait::async_trait;
use gomind_core::RoutingPlan;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[async_trait]
pub trait PlanCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<RoutingPlan>;
    async fn put(&self, key: String, plan: RoutingPlan);
    async fn stats(&self) -> CacheStats;
}

struct Entry {
    plan: RoutingPlan,
    inserted_at: Instant,
}

/// A TTL map with a max size, evicting the single oldest-inserted entry when
/// full (not LRU — insertion order only). Good enough when cache pressure is
/// expected to be rare; see [`LruPlanCache`] for access-order eviction.
pub struct SimpleCache {
    ttl: Duration,
    max_size: usize,
    entries: RwLock<HashMap<String, Entry>>,
    stats: RwLock<CacheStats>,
}

impl SimpleCache {
    pub fn new(ttl: Duration, max_size: usize) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            max_size,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// Drops all entries older than the configured TTL. Intended to be driven
    /// by a periodic background task on a `tokio::time::interval`.
    pub async fn cleanup_expired(&self) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            self.stats.write().await.evictions += evicted as u64;
        }
    }

    fn evict_oldest(entries: &mut HashMap<String, Entry>) -> bool {
        let oldest_key = entries.iter().min_by_key(|(_, e)| e.inserted_at).map(|(k, _)| k.clone());
        if let Some(key) = oldest_key {
            entries.remove(&key);
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl PlanCache for SimpleCache {
    async fn get(&self, key: &str) -> Option<RoutingPlan> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                self.stats.write().await.hits += 1;
                Some(entry.plan.clone())
            }
            _ => {
                self.stats.write().await.misses += 1;
                None
            }
        }
    }

    async fn put(&self, key: String, plan: RoutingPlan) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            Self::evict_oldest(&mut entries);
        }
        entries.insert(
            key,
            Entry {
                plan,
                inserted_at: Instant::now(),
            },
        );
    }

    async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

/// A true least-recently-used cache: a linked access order plus a per-entry
/// TTL. Access order is tracked with a `Vec<String>` rather than an
/// intrusive linked list — the expected cache sizes here (tens to low
/// hundreds of distinct plans) make the O(n) reordering cost negligible
/// compared to the LLM round-trip this cache exists to avoid.
pub struct LruPlanCache {
    ttl: Duration,
    max_size: usize,
    entries: RwLock<HashMap<String, Entry>>,
    order: RwLock<Vec<String>>,
    stats: RwLock<CacheStats>,
}

impl LruPlanCache {
    pub fn new(ttl: Duration, max_size: usize) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            max_size,
            entries: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    async fn touch(&self, key: &str) {
        let mut order = self.order.write().await;
        order.retain(|k| k != key);
        order.push(key.to_string());
    }
}

#[async_trait]
impl PlanCache for LruPlanCache {
    async fn get(&self, key: &str) -> Option<RoutingPlan> {
        let hit = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.plan.clone()),
                _ => None,
            }
        };
        match hit {
            Some(plan) => {
                self.touch(key).await;
                self.stats.write().await.hits += 1;
                Some(plan)
            }
            None => {
                self.stats.write().await.misses += 1;
                None
            }
        }
    }

    async fn put(&self, key: String, plan: RoutingPlan) {
        let mut entries = self.entries.write().await;
        let mut order = self.order.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.max_size {
            if let Some(lru_key) = order.first().cloned() {
                entries.remove(&lru_key);
                order.remove(0);
                self.stats.write().await.evictions += 1;
            }
        }

        entries.insert(
            key.clone(),
            Entry {
                plan,
                inserted_at: Instant::now(),
            },
        );
        order.retain(|k| k != &key);
        order.push(key);
    }

    async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}
