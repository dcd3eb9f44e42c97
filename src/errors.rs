// Error types for the extraction pipeline

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Category of a single failed step. Callers map these onto user-facing
/// guidance; the orchestrator only records them and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// URL not recognized as a supported media source
    InvalidSource,

    /// Metadata probe failed for a strategy
    StrategyMetadataFailed,

    /// Transfer failed partway for a strategy
    StrategyTransferFailed,

    /// Source explicitly signalled bot detection / sign-in requirement
    BlockedBySource,

    /// No usable proxy when one was required
    ProxyUnavailable,

    /// The external conversion service failed or was not configured
    ExternalServiceFailed,

    /// A strategy reported success but no file is resolvable
    ArtifactMissing,
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidSource => "invalid_source",
            Self::StrategyMetadataFailed => "strategy_metadata_failed",
            Self::StrategyTransferFailed => "strategy_transfer_failed",
            Self::BlockedBySource => "blocked_by_source",
            Self::ProxyUnavailable => "proxy_unavailable",
            Self::ExternalServiceFailed => "external_service_failed",
            Self::ArtifactMissing => "artifact_missing",
        };
        write!(f, "{}", s)
    }
}

/// Error raised by a single collaborator (fetcher, fallback client, store).
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported source URL: {0}")]
    InvalidSource(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("failed to parse extractor output: {0}")]
    Parse(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("external conversion service failed: {0}")]
    ExternalService(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Outcome of one attempted strategy (or the external fallback), kept so the
/// aggregate failure can enumerate exactly what was tried and why it failed.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    /// Label of the strategy ("android-music", "external-service", ...)
    pub strategy: String,
    pub category: FailureCategory,
    /// First lines of the underlying cause, for diagnostics
    pub detail: String,
}

impl AttemptRecord {
    pub fn new(strategy: impl Into<String>, category: FailureCategory, detail: &str) -> Self {
        // Keep only the leading lines; yt-dlp stderr can run to pages.
        let detail = detail.lines().take(3).collect::<Vec<_>>().join(" | ");
        Self {
            strategy: strategy.into(),
            category,
            detail,
        }
    }
}

/// Surfaced only when the whole chain plus the external fallback failed, or
/// when the URL was rejected up front. Enumerates every attempt so the caller
/// can render actionable guidance.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateFailure {
    /// Dominant category, for coarse status mapping
    pub category: FailureCategory,
    /// One record per attempted strategy, in chain order
    pub attempts: Vec<AttemptRecord>,
    /// Outcome of the external fallback, when it ran
    pub fallback: Option<AttemptRecord>,
}

impl AggregateFailure {
    /// Fast-path rejection before any strategy runs. No attempts, no
    /// fallback: the category alone carries the outcome.
    pub fn invalid_source() -> Self {
        Self {
            category: FailureCategory::InvalidSource,
            attempts: Vec::new(),
            fallback: None,
        }
    }

    /// Chain exhausted and the fallback failed too.
    pub fn exhausted(attempts: Vec<AttemptRecord>, fallback: AttemptRecord) -> Self {
        let category = if attempts
            .iter()
            .any(|a| a.category == FailureCategory::BlockedBySource)
        {
            FailureCategory::BlockedBySource
        } else {
            fallback.category
        };
        Self {
            category,
            attempts,
            fallback: Some(fallback),
        }
    }

    /// Whether any attempt hit explicit bot detection / sign-in walls.
    pub fn blocked(&self) -> bool {
        self.category == FailureCategory::BlockedBySource
    }

    /// User-facing guidance, tuned to what was observed.
    pub fn suggestions(&self) -> Vec<&'static str> {
        if self.category == FailureCategory::InvalidSource {
            return vec!["Provide a youtube.com or youtu.be video URL"];
        }
        let mut tips = vec!["Try a different video", "Wait a few minutes and try again"];
        if self.blocked() {
            tips.insert(1, "Use older, more popular videos");
            tips.push("Avoid age-restricted videos");
        }
        tips
    }
}

impl fmt::Display for AggregateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extraction failed ({}): {} strategy attempt(s)",
            self.category,
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "\n  {} -> {}: {}", attempt.strategy, attempt.category, attempt.detail)?;
        }
        if let Some(fb) = &self.fallback {
            write!(f, "\n  {} -> {}: {}", fb.strategy, fb.category, fb.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_source_has_no_attempts_and_no_fallback_record() {
        let failure = AggregateFailure::invalid_source();
        assert_eq!(failure.category, FailureCategory::InvalidSource);
        assert!(failure.attempts.is_empty());
        assert!(failure.fallback.is_none());
    }

    #[test]
    fn blocked_attempt_dominates_category() {
        let attempts = vec![
            AttemptRecord::new("a", FailureCategory::StrategyMetadataFailed, "x"),
            AttemptRecord::new("b", FailureCategory::BlockedBySource, "bot check"),
        ];
        let fb = AttemptRecord::new(
            "external-service",
            FailureCategory::ExternalServiceFailed,
            "500",
        );
        let failure = AggregateFailure::exhausted(attempts, fb);
        assert!(failure.blocked());
        assert_eq!(failure.attempts.len(), 2);
        assert!(failure.fallback.is_some());
    }

    #[test]
    fn detail_is_truncated_to_leading_lines() {
        let record = AttemptRecord::new(
            "a",
            FailureCategory::StrategyTransferFailed,
            "one\ntwo\nthree\nfour\nfive",
        );
        assert_eq!(record.detail, "one | two | three");
    }
}
