//! Application configuration, loaded from the environment (§6.4, SPEC_FULL.md §A.3).

use std::time::Duration;

use crate::error::{PlanningError, Result};

/// Elasticsearch connection settings.
#[derive(Debug, Clone)]
pub struct EsConfig {
    pub url: String,
    pub index_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
}

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub completion_model: String,
    pub embedding_model: String,
    pub daily_budget_usd: f64,
}

/// Cache Manager settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_bytes: usize,
    pub compression_threshold_bytes: usize,
    pub sweep_interval: Duration,
}

/// Background Processor settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub max_retries: u32,
}

/// The top-level application configuration (§6.4).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub es: EsConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub workers: WorkerConfig,
}

impl AppConfig {
    /// Loads configuration from environment variables, falling back to the
    /// documented defaults for anything optional. Fails with
    /// [`crate::error::ErrorKind::Validation`] if a required variable is absent
    /// or malformed.
    pub fn from_env() -> Result<Self> {
        let bind_address = env_or("PLANNING_BIND_ADDRESS", "0.0.0.0:8000");

        let es = EsConfig {
            url: env_or("PLANNING_ES_URL", "http://localhost:9200"),
            index_name: env_or("PLANNING_ES_INDEX", "planning_applications"),
            username: std::env::var("PLANNING_ES_USERNAME").ok(),
            password: std::env::var("PLANNING_ES_PASSWORD").ok(),
            request_timeout: Duration::from_secs(parse_env_or("PLANNING_ES_TIMEOUT_SECS", 30)?),
        };

        let llm = LlmConfig {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            completion_model: env_or("PLANNING_LLM_MODEL", "claude-3-5-haiku-20241022"),
            embedding_model: env_or("PLANNING_EMBEDDING_MODEL", "text-embedding-3-small"),
            daily_budget_usd: parse_env_or("PLANNING_LLM_DAILY_BUDGET_USD", 50.0)?,
        };

        if llm.anthropic_api_key.is_none() && llm.openai_api_key.is_none() {
            return Err(PlanningError::validation(
                "at least one of ANTHROPIC_API_KEY or OPENAI_API_KEY must be set",
            ));
        }

        let cache = CacheConfig {
            max_bytes: parse_env_or::<usize>("PLANNING_CACHE_MAX_BYTES", 512 * 1024 * 1024)?,
            compression_threshold_bytes: parse_env_or::<usize>(
                "PLANNING_CACHE_COMPRESSION_THRESHOLD_BYTES",
                100 * 1024,
            )?,
            sweep_interval: Duration::from_secs(parse_env_or(
                "PLANNING_CACHE_SWEEP_INTERVAL_SECS",
                60,
            )?),
        };

        let workers = WorkerConfig {
            worker_count: parse_env_or("PLANNING_WORKER_COUNT", 4)?,
            max_retries: parse_env_or("PLANNING_WORKER_MAX_RETRIES", 3)?,
        };

        Ok(Self {
            bind_address,
            es,
            llm,
            cache,
            workers,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|err| {
            PlanningError::validation(format!("invalid value for {key}: {err}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default_when_unset() {
        assert_eq!(env_or("PLANNING_TEST_UNSET_VAR_XYZ", "fallback"), "fallback");
    }

    #[test]
    fn parse_env_or_rejects_malformed_values() {
        std::env::set_var("PLANNING_TEST_BAD_NUMBER", "not-a-number");
        let result = parse_env_or::<u64>("PLANNING_TEST_BAD_NUMBER", 1);
        std::env::remove_var("PLANNING_TEST_BAD_NUMBER");
        assert!(result.is_err());
    }

    #[test]
    fn parse_env_or_uses_default_when_unset() {
        let result = parse_env_or::<u64>("PLANNING_TEST_UNSET_NUMBER_XYZ", 42).unwrap();
        assert_eq!(result, 42);
    }
}
