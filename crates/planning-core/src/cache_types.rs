//! Shared [`CacheEntry`] vocabulary (§3.1) used by `planning-cache` and every
//! caller that reasons about cache policy (the AI Orchestrator, the search
//! service's location-stats cache, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The logical category of a cached value. Each type carries its own default TTL,
/// size share, and compression policy (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    AiProcessing,
    SearchResults,
    ApplicationData,
    Embeddings,
    MarketInsights,
    UserSessions,
}

impl CacheType {
    /// All cache types, used to seed per-type statistics and bucket locks.
    pub const ALL: [CacheType; 6] = [
        CacheType::AiProcessing,
        CacheType::SearchResults,
        CacheType::ApplicationData,
        CacheType::Embeddings,
        CacheType::MarketInsights,
        CacheType::UserSessions,
    ];

    /// Stable namespace prefix for keys of this type.
    #[must_use]
    pub fn namespace(self) -> &'static str {
        match self {
            CacheType::AiProcessing => "ai_processing",
            CacheType::SearchResults => "search_results",
            CacheType::ApplicationData => "application_data",
            CacheType::Embeddings => "embeddings",
            CacheType::MarketInsights => "market_insights",
            CacheType::UserSessions => "user_sessions",
        }
    }
}

/// Eviction priority. `Critical` entries are never evicted except by expiry or
/// explicit invalidation (§4.2, §8 invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLevel {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl CacheLevel {
    /// Ordinal used to sort eviction candidates ascending (lowest evicted first).
    /// `Critical` is excluded from the candidate set entirely by the cache, so this
    /// ordinal only orders `Low`/`Normal`/`High`.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

/// One entry in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Raw bytes: either the JSON-serialized value, or gzip-compressed JSON if
    /// `compression_enabled` is set.
    pub value: Vec<u8>,
    pub cache_type: CacheType,
    pub level: CacheLevel,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub size_bytes: usize,
    pub compression_enabled: bool,
}

impl CacheEntry {
    /// Whether this entry has passed its expiry time as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Aggregate cache statistics (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub bytes: usize,
    pub average_access_latency_micros: f64,
    pub per_type_totals: std::collections::HashMap<String, u64>,
}

impl CacheStats {
    /// `hits / total_requests`, or `0.0` when no requests have been made yet.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_level_ordering_places_critical_highest() {
        assert!(CacheLevel::Critical > CacheLevel::High);
        assert!(CacheLevel::High > CacheLevel::Normal);
        assert!(CacheLevel::Normal > CacheLevel::Low);
    }

    #[test]
    fn hit_rate_is_zero_with_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_computes_ratio() {
        let stats = CacheStats {
            total_requests: 4,
            hits: 3,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
