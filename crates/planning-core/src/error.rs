//! Error taxonomy shared across the Planning Explorer core crates.
//!
//! Every component-level error type in this workspace ultimately converts into
//! [`PlanningError`] so the HTTP layer (`planning-server`) can map failures to a
//! status code with a single `match` on [`ErrorKind`].

use thiserror::Error;

/// Stable classification of a failure, independent of which component raised it.
///
/// Kinds, not concrete types, so callers branch on behavior (retry? surface to
/// user? degrade?) rather than on which crate happened to produce the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Malformed input, unknown enum value, or an out-of-range field.
    Validation,
    /// Missing or invalid credential.
    Authentication,
    /// Caller is authenticated but lacks the tier/role for the operation.
    Authorization,
    /// Unknown document or task id.
    NotFound,
    /// A request or usage rate limit was breached.
    RateLimit,
    /// Elasticsearch is unreachable, unhealthy, or timing out.
    DatabaseUnavailable,
    /// An LLM or embedding provider failed.
    AiServiceUnavailable,
    /// A portal fetch or headless-browser fetch failed.
    ExternalServiceError,
    /// A daily cost cap or token budget was exceeded.
    BudgetExceeded,
    /// Everything else.
    Internal,
}

impl ErrorKind {
    /// The HTTP status code this kind maps to (§7).
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::NotFound => 404,
            Self::RateLimit => 429,
            Self::DatabaseUnavailable | Self::AiServiceUnavailable | Self::BudgetExceeded => 503,
            Self::ExternalServiceError => 502,
            Self::Internal => 500,
        }
    }

    /// A stable, user-facing identifier for this kind (used as `error_code`'s prefix).
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Authorization => "AUTHORIZATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimit => "RATE_LIMIT_EXCEEDED",
            Self::DatabaseUnavailable => "DATABASE_UNAVAILABLE",
            Self::AiServiceUnavailable => "AI_SERVICE_UNAVAILABLE",
            Self::ExternalServiceError => "EXTERNAL_SERVICE_ERROR",
            Self::BudgetExceeded => "BUDGET_EXCEEDED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// The unified error type propagated out of a Planning Explorer component.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct PlanningError {
    kind: ErrorKind,
    message: String,
    /// Seconds the caller should wait before retrying, set only for [`ErrorKind::RateLimit`]
    /// and [`ErrorKind::BudgetExceeded`].
    retry_after_seconds: Option<u64>,
    /// A human-readable recovery hint, e.g. "fall back to text search".
    suggestion: Option<String>,
}

impl PlanningError {
    /// Builds an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after_seconds: None,
            suggestion: None,
        }
    }

    /// Attaches a `retry_after_seconds` hint.
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_seconds = Some(seconds);
        self
    }

    /// Attaches a recovery suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The stable `error_code` string for the HTTP body (§7).
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        self.kind.code()
    }

    /// The human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status code the HTTP layer should return.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// The retry hint, if any.
    #[must_use]
    pub fn retry_after_seconds(&self) -> Option<u64> {
        self.retry_after_seconds
    }

    /// The recovery suggestion, if any.
    #[must_use]
    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    /// Shorthand constructors, one per [`ErrorKind`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Shorthand for [`ErrorKind::DatabaseUnavailable`].
    pub fn database_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseUnavailable, message)
    }

    /// Shorthand for [`ErrorKind::AiServiceUnavailable`].
    pub fn ai_service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AiServiceUnavailable, message)
    }

    /// Shorthand for [`ErrorKind::ExternalServiceError`].
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalServiceError, message)
    }

    /// Shorthand for [`ErrorKind::BudgetExceeded`].
    pub fn budget_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BudgetExceeded, message)
    }

    /// Shorthand for [`ErrorKind::RateLimit`].
    pub fn rate_limit(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::new(ErrorKind::RateLimit, message).with_retry_after(retry_after_seconds)
    }

    /// Shorthand for [`ErrorKind::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

/// Result alias used throughout the Planning Explorer workspace.
pub type Result<T> = std::result::Result<T, PlanningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_taxonomy() {
        assert_eq!(ErrorKind::Validation.http_status(), 422);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::RateLimit.http_status(), 429);
        assert_eq!(ErrorKind::DatabaseUnavailable.http_status(), 503);
        assert_eq!(ErrorKind::AiServiceUnavailable.http_status(), 503);
        assert_eq!(ErrorKind::ExternalServiceError.http_status(), 502);
        assert_eq!(ErrorKind::BudgetExceeded.http_status(), 503);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = PlanningError::rate_limit("too many requests", 30);
        assert_eq!(err.retry_after_seconds(), Some(30));
        assert_eq!(err.error_code(), "RATE_LIMIT_EXCEEDED");
    }

    #[test]
    fn suggestion_round_trips() {
        let err = PlanningError::ai_service_unavailable("embedding provider down")
            .with_suggestion("fall back to text search");
        assert_eq!(err.suggestion(), Some("fall back to text search"));
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn not_found_has_no_retry_hint_by_default() {
        let err = PlanningError::not_found("application APP-1 not found");
        assert_eq!(err.retry_after_seconds(), None);
        assert!(err.message().contains("APP-1"));
    }
}
