//! Per-[`CacheType`] defaults (§4.2: "per type, configuration gives default
//! TTL, max size share, compression on/off, default level").

use chrono::Duration;
use planning_core::{CacheLevel, CacheType};

#[derive(Debug, Clone, Copy)]
pub struct TypePolicy {
    pub default_ttl: Duration,
    pub max_share: f64,
    pub compression_allowed: bool,
    pub default_level: CacheLevel,
}

#[must_use]
pub fn policy_for(cache_type: CacheType) -> TypePolicy {
    match cache_type {
        CacheType::AiProcessing => TypePolicy {
            default_ttl: Duration::hours(24),
            max_share: 0.30,
            compression_allowed: true,
            default_level: CacheLevel::Normal,
        },
        CacheType::SearchResults => TypePolicy {
            default_ttl: Duration::minutes(15),
            max_share: 0.20,
            compression_allowed: true,
            default_level: CacheLevel::Low,
        },
        CacheType::ApplicationData => TypePolicy {
            default_ttl: Duration::hours(6),
            max_share: 0.20,
            compression_allowed: false,
            default_level: CacheLevel::Normal,
        },
        CacheType::Embeddings => TypePolicy {
            default_ttl: Duration::hours(72),
            max_share: 0.15,
            compression_allowed: true,
            default_level: CacheLevel::High,
        },
        CacheType::MarketInsights => TypePolicy {
            default_ttl: Duration::hours(1),
            max_share: 0.10,
            compression_allowed: true,
            default_level: CacheLevel::Normal,
        },
        CacheType::UserSessions => TypePolicy {
            default_ttl: Duration::hours(12),
            max_share: 0.05,
            compression_allowed: false,
            default_level: CacheLevel::Critical,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_across_all_types_do_not_exceed_one() {
        let total: f64 = CacheType::ALL.iter().map(|t| policy_for(*t).max_share).sum();
        assert!(total <= 1.0 + f64::EPSILON, "type shares sum to {total}, expected <= 1.0");
    }

    #[test]
    fn user_sessions_default_to_critical() {
        assert_eq!(policy_for(CacheType::UserSessions).default_level, CacheLevel::Critical);
    }
}
