use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use planning_core::{Cache, CacheEntry, CacheLevel, CacheStats, CacheType};
use planning_core::{PlanningError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::policy::policy_for;

const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 100 * 1024;

/// Bounded, type-aware in-process cache (§4.2, C2).
///
/// Each [`CacheType`] gets its own [`DashMap`] bucket so that mutation of one
/// type's entries never contends with another's, and within a bucket DashMap's
/// own shard locking keeps `get` non-blocking in the common path.
pub struct CacheManager {
    buckets: [DashMap<String, CacheEntry>; 6],
    stats: Mutex<CacheStats>,
    max_bytes: usize,
    compression_threshold_bytes: usize,
    current_bytes: AtomicUsize,
}

impl CacheManager {
    #[must_use]
    pub fn new(max_bytes: usize, compression_threshold_bytes: usize) -> Self {
        Self {
            buckets: std::array::from_fn(|_| DashMap::new()),
            stats: Mutex::new(CacheStats::default()),
            max_bytes,
            compression_threshold_bytes,
            current_bytes: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(512 * 1024 * 1024, DEFAULT_COMPRESSION_THRESHOLD_BYTES)
    }

    fn bucket(&self, cache_type: CacheType) -> &DashMap<String, CacheEntry> {
        &self.buckets[cache_type as usize]
    }

    /// Runs forever, removing expired entries every `interval` (§4.2
    /// "background sweeper"). Intended to be spawned as a long-lived task.
    pub async fn run_sweeper(self: Arc<Self>, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = self.sweep_expired();
            if removed > 0 {
                debug!(removed, "cache sweeper removed expired entries");
            }
        }
    }

    fn sweep_expired(&self) -> u64 {
        let now = Utc::now();
        let mut removed = 0u64;
        for bucket in &self.buckets {
            bucket.retain(|_, entry| {
                let expired = entry.is_expired(now);
                if expired {
                    self.current_bytes.fetch_sub(entry.size_bytes, Ordering::SeqCst);
                    removed += 1;
                }
                !expired
            });
        }
        if removed > 0 {
            let mut stats = self.stats.lock();
            stats.evictions += removed;
        }
        removed
    }

    /// Frees at least `needed_bytes` from non-critical entries, sorted
    /// ascending by `(level_ordinal, access_count, last_accessed)` (§4.2
    /// eviction ordering). Returns the bytes actually freed.
    fn evict(&self, needed_bytes: usize) -> usize {
        let mut candidates: Vec<(CacheType, String, u8, u64, chrono::DateTime<Utc>, usize)> = Vec::new();
        for (idx, bucket) in self.buckets.iter().enumerate() {
            let cache_type = CacheType::ALL[idx];
            for entry in bucket.iter() {
                if entry.level == CacheLevel::Critical {
                    continue;
                }
                candidates.push((
                    cache_type,
                    entry.key.clone(),
                    entry.level.ordinal(),
                    entry.access_count,
                    entry.last_accessed,
                    entry.size_bytes,
                ));
            }
        }
        candidates.sort_by(|a, b| eviction_rank(a.2, a.3, a.4).cmp(&eviction_rank(b.2, b.3, b.4)));

        let mut freed = 0usize;
        let mut evicted = 0u64;
        for (cache_type, key, .., size) in candidates {
            if freed >= needed_bytes {
                break;
            }
            if self.bucket(cache_type).remove(&key).is_some() {
                self.current_bytes.fetch_sub(size, Ordering::SeqCst);
                freed += size;
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.stats.lock().evictions += evicted;
        }
        freed
    }

    fn record_hit(&self, cache_type: CacheType, latency: std::time::Duration) {
        let mut stats = self.stats.lock();
        stats.total_requests += 1;
        stats.hits += 1;
        *stats
            .per_type_totals
            .entry(cache_type.namespace().to_string())
            .or_insert(0) += 1;
        let total_requests = stats.total_requests;
        rolling_average(&mut stats.average_access_latency_micros, total_requests, latency);
    }

    fn record_miss(&self, latency: std::time::Duration) {
        let mut stats = self.stats.lock();
        stats.total_requests += 1;
        stats.misses += 1;
        let total_requests = stats.total_requests;
        rolling_average(&mut stats.average_access_latency_micros, total_requests, latency);
    }
}

/// Sort key for eviction candidates, ascending: lowest `level_ordinal` first,
/// then least-recently-used, then longest-since-accessed (§4.2 eviction
/// ordering). `Critical` entries never reach this function (filtered in
/// `evict` before ranking).
fn eviction_rank(level_ordinal: u8, access_count: u64, last_accessed: chrono::DateTime<Utc>) -> (u8, u64, chrono::DateTime<Utc>) {
    (level_ordinal, access_count, last_accessed)
}

fn rolling_average(average: &mut f64, total_requests: u64, latency: std::time::Duration) {
    let sample = latency.as_micros() as f64;
    *average += (sample - *average) / total_requests as f64;
}

fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|err| PlanningError::internal(format!("cache compression failed: {err}")))?;
    encoder
        .finish()
        .map_err(|err| PlanningError::internal(format!("cache compression failed: {err}")))
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| PlanningError::internal(format!("cache decompression failed: {err}")))?;
    Ok(out)
}

#[async_trait]
impl Cache for CacheManager {
    async fn get<T>(&self, cache_type: CacheType, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let started = Instant::now();
        let now = Utc::now();

        let Some(mut entry) = self.bucket(cache_type).get_mut(key) else {
            self.record_miss(started.elapsed());
            return Ok(None);
        };

        if entry.is_expired(now) {
            let size = entry.size_bytes;
            drop(entry);
            self.bucket(cache_type).remove(key);
            self.current_bytes.fetch_sub(size, Ordering::SeqCst);
            self.record_miss(started.elapsed());
            return Ok(None);
        }

        entry.access_count += 1;
        entry.last_accessed = now;
        let raw = if entry.compression_enabled {
            let compressed = entry.value.clone();
            drop(entry);
            tokio::task::spawn_blocking(move || decompress(&compressed))
                .await
                .map_err(|err| PlanningError::internal(format!("decompression task panicked: {err}")))??
        } else {
            entry.value.clone()
        };

        self.record_hit(cache_type, started.elapsed());
        let value = serde_json::from_slice(&raw)
            .map_err(|err| PlanningError::internal(format!("failed to decode cached value: {err}")))?;
        Ok(Some(value))
    }

    async fn set<T>(
        &self,
        cache_type: CacheType,
        key: &str,
        value: &T,
        ttl: chrono::Duration,
        level: CacheLevel,
    ) -> Result<bool>
    where
        T: Serialize + Send + Sync,
    {
        let serialized = serde_json::to_vec(value)
            .map_err(|err| PlanningError::internal(format!("failed to encode cache value: {err}")))?;

        let policy = policy_for(cache_type);
        let (stored, compression_enabled) =
            if policy.compression_allowed && serialized.len() >= self.compression_threshold_bytes {
                let to_compress = serialized.clone();
                let compressed = tokio::task::spawn_blocking(move || compress(&to_compress))
                    .await
                    .map_err(|err| PlanningError::internal(format!("compression task panicked: {err}")))??;
                (compressed, true)
            } else {
                (serialized, false)
            };

        let size_bytes = stored.len();
        let current = self.current_bytes.load(Ordering::SeqCst);
        if current + size_bytes > self.max_bytes {
            let needed = current + size_bytes - self.max_bytes;
            let freed = self.evict(needed);
            if freed < needed {
                warn!(cache_type = cache_type.namespace(), key, "cache full, eviction insufficient");
                return Ok(false);
            }
        }

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.to_string(),
            value: stored,
            cache_type,
            level,
            created_at: now,
            expires_at: now + ttl,
            access_count: 0,
            last_accessed: now,
            size_bytes,
            compression_enabled,
        };
        self.bucket(cache_type).insert(key.to_string(), entry);
        self.current_bytes.fetch_add(size_bytes, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete(&self, cache_type: CacheType, key: &str) -> Result<()> {
        if let Some((_, entry)) = self.bucket(cache_type).remove(key) {
            self.current_bytes.fetch_sub(entry.size_bytes, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn invalidate_by_type(&self, cache_type: CacheType) -> Result<u64> {
        let bucket = self.bucket(cache_type);
        let mut removed = 0u64;
        let mut freed = 0usize;
        bucket.retain(|_, entry| {
            freed += entry.size_bytes;
            removed += 1;
            false
        });
        self.current_bytes.fetch_sub(freed, Ordering::SeqCst);
        Ok(removed)
    }

    async fn invalidate_by_pattern(&self, cache_type: CacheType, pattern: &str) -> Result<u64> {
        let bucket = self.bucket(cache_type);
        let mut removed = 0u64;
        let mut freed = 0usize;
        bucket.retain(|key, entry| {
            let matches = key.contains(pattern);
            if matches {
                freed += entry.size_bytes;
                removed += 1;
            }
            !matches
        });
        self.current_bytes.fetch_sub(freed, Ordering::SeqCst);
        Ok(removed)
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self.stats.lock().clone();
        stats.bytes = self.current_bytes.load(Ordering::SeqCst);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn eviction_rank_always_prefers_lower_level_first(
            access_a in 0u64..10_000,
            access_b in 0u64..10_000,
            offset_secs_a in 0i64..1_000_000,
            offset_secs_b in 0i64..1_000_000,
        ) {
            let base = Utc::now();
            let low = eviction_rank(CacheLevel::Low.ordinal(), access_a, base + chrono::Duration::seconds(offset_secs_a));
            let high = eviction_rank(CacheLevel::High.ordinal(), access_b, base + chrono::Duration::seconds(offset_secs_b));
            // A Low-level candidate is always ranked for eviction ahead of a
            // High-level one, regardless of access recency/frequency.
            prop_assert!(low < high);
        }

        #[test]
        fn eviction_rank_breaks_ties_by_access_count_then_recency(
            access_a in 0u64..10_000,
            access_b in 0u64..10_000,
        ) {
            let base = Utc::now();
            let a = eviction_rank(CacheLevel::Normal.ordinal(), access_a, base);
            let b = eviction_rank(CacheLevel::Normal.ordinal(), access_b, base);
            prop_assert_eq!(a.cmp(&b), access_a.cmp(&access_b));
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = CacheManager::with_defaults();
        cache
            .set(CacheType::ApplicationData, "APP-1", &42u32, chrono::Duration::hours(1), CacheLevel::Normal)
            .await
            .unwrap();
        let value: Option<u32> = cache.get(CacheType::ApplicationData, "APP-1").await.unwrap();
        assert_eq!(value, Some(42));
    }

    #[tokio::test]
    async fn get_on_expired_entry_is_a_miss() {
        let cache = CacheManager::with_defaults();
        cache
            .set(CacheType::ApplicationData, "APP-1", &42u32, chrono::Duration::seconds(-1), CacheLevel::Normal)
            .await
            .unwrap();
        let value: Option<u32> = cache.get(CacheType::ApplicationData, "APP-1").await.unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn large_values_round_trip_through_compression() {
        let cache = CacheManager::new(10 * 1024 * 1024, 64);
        let payload = "x".repeat(1024);
        cache
            .set(CacheType::Embeddings, "big", &payload, chrono::Duration::hours(1), CacheLevel::High)
            .await
            .unwrap();
        let value: Option<String> = cache.get(CacheType::Embeddings, "big").await.unwrap();
        assert_eq!(value, Some(payload));
    }

    #[tokio::test]
    async fn invalidate_by_type_clears_only_that_bucket() {
        let cache = CacheManager::with_defaults();
        cache
            .set(CacheType::SearchResults, "s", &1u32, chrono::Duration::hours(1), CacheLevel::Low)
            .await
            .unwrap();
        cache
            .set(CacheType::ApplicationData, "a", &1u32, chrono::Duration::hours(1), CacheLevel::Normal)
            .await
            .unwrap();

        let removed = cache.invalidate_by_type(CacheType::SearchResults).await.unwrap();
        assert_eq!(removed, 1);
        let search_value: Option<u32> = cache.get(CacheType::SearchResults, "s").await.unwrap();
        let app_value: Option<u32> = cache.get(CacheType::ApplicationData, "a").await.unwrap();
        assert_eq!(search_value, None);
        assert_eq!(app_value, Some(1));
    }

    #[tokio::test]
    async fn critical_entries_survive_eviction_pressure() {
        let cache = CacheManager::new(200, 10_000);
        cache
            .set(CacheType::UserSessions, "session", &"keep-me", chrono::Duration::hours(1), CacheLevel::Critical)
            .await
            .unwrap();
        // Force eviction pressure with low-priority entries.
        for i in 0..20 {
            let _ = cache
                .set(CacheType::SearchResults, &format!("s{i}"), &"filler", chrono::Duration::hours(1), CacheLevel::Low)
                .await;
        }
        let value: Option<String> = cache.get(CacheType::UserSessions, "session").await.unwrap();
        assert_eq!(value, Some("keep-me".to_string()));
    }

    #[tokio::test]
    async fn hit_and_miss_counters_update_stats() {
        let cache = CacheManager::with_defaults();
        let _miss: Option<u32> = cache.get(CacheType::ApplicationData, "missing").await.unwrap();
        cache
            .set(CacheType::ApplicationData, "present", &1u32, chrono::Duration::hours(1), CacheLevel::Normal)
            .await
            .unwrap();
        let _hit: Option<u32> = cache.get(CacheType::ApplicationData, "present").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
