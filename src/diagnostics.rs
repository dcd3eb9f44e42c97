// Failure classification - maps extractor error text onto failure categories
//
// The source signals blocking in many shapes (sign-in walls, bot checks,
// 403/429). Those get a dedicated category because they warrant different
// user-facing guidance than a plain broken transfer.

use crate::errors::FailureCategory;

/// Which pipeline phase produced the error being classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Metadata,
    Transfer,
}

/// Whether the error text is an explicit block signal from the source.
pub fn is_blocked(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("sign in to confirm")
        || lower.contains("bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("automated")
        || lower.contains("403")
        || lower.contains("forbidden")
        || lower.contains("429")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
}

/// Classify an error for the given phase. Block signals win regardless of
/// phase; everything else falls back to the phase's generic category.
pub fn classify(error: &str, phase: Phase) -> FailureCategory {
    if is_blocked(error) {
        return FailureCategory::BlockedBySource;
    }
    match phase {
        Phase::Metadata => FailureCategory::StrategyMetadataFailed,
        Phase::Transfer => FailureCategory::StrategyTransferFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_detection() {
        let error = "ERROR: Sign in to confirm you're not a bot";
        assert!(is_blocked(error));
        assert_eq!(
            classify(error, Phase::Metadata),
            FailureCategory::BlockedBySource
        );
    }

    #[test]
    fn test_403_detection() {
        let error = "ERROR: HTTP Error 403: Forbidden";
        assert_eq!(
            classify(error, Phase::Transfer),
            FailureCategory::BlockedBySource
        );
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_blocked("HTTP Error 429: Too Many Requests"));
    }

    #[test]
    fn test_captcha_detection() {
        assert!(is_blocked("please solve this CAPTCHA to continue"));
    }

    #[test]
    fn test_generic_metadata_failure() {
        let error = "Unable to extract player response";
        assert_eq!(
            classify(error, Phase::Metadata),
            FailureCategory::StrategyMetadataFailed
        );
    }

    #[test]
    fn test_generic_transfer_failure() {
        let error = "fragment 3 not found, unable to continue";
        assert_eq!(
            classify(error, Phase::Transfer),
            FailureCategory::StrategyTransferFailed
        );
    }
}
