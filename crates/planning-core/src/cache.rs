//! The Cache Manager contract (§4.2, C2).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache_types::{CacheLevel, CacheStats, CacheType};
use crate::error::Result;

/// Typed, tiered cache over the six [`CacheType`] namespaces (§4.2).
///
/// Implementations own TTL expiry and priority-based eviction; callers never
/// manage either directly. Keys are namespaced internally by `cache_type`, so
/// the same `key` string in two different types never collides.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads and deserializes a value, transparently decompressing it if it was
    /// stored compressed. Returns `Ok(None)` on a miss or expired entry.
    async fn get<T>(&self, cache_type: CacheType, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Serializes and stores a value under `cache_type`'s default TTL and the
    /// given eviction `level`. Values at or above the compression threshold are
    /// gzip-compressed transparently (§4.2). Returns `false` when eviction could
    /// not free enough non-critical memory for the entry to fit — the caller
    /// must tolerate the resulting cache miss rather than treat this as an error.
    async fn set<T>(
        &self,
        cache_type: CacheType,
        key: &str,
        value: &T,
        ttl: chrono::Duration,
        level: CacheLevel,
    ) -> Result<bool>
    where
        T: Serialize + Send + Sync;

    /// Removes a single key, if present.
    async fn delete(&self, cache_type: CacheType, key: &str) -> Result<()>;

    /// Removes every entry of a given type. Used on schema changes that
    /// invalidate a whole namespace at once.
    async fn invalidate_by_type(&self, cache_type: CacheType) -> Result<u64>;

    /// Removes every entry of a given type whose key matches a glob-style
    /// `pattern` (§4.2 step "surgical invalidation").
    async fn invalidate_by_pattern(&self, cache_type: CacheType, pattern: &str) -> Result<u64>;

    /// Current aggregate statistics, including the per-type hit/miss totals.
    fn stats(&self) -> CacheStats;
}
