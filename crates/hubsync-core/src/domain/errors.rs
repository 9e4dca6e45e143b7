//! Errors - 失敗の運用分類
//!
//! Every failure that reaches the orchestrator is reduced to an `ErrorKind`
//! plus a message. The decider only ever looks at this reduced form, so new
//! error sources (a different API, a different store) plug in by mapping
//! themselves onto these kinds.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Operational classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failure, 5xx, or any non-auth upstream API error.
    Transient,

    /// Upstream told us when to come back.
    RateLimited,

    /// Missing or rejected credential. Never retried.
    Auth,

    /// Upstream payload did not match the expected shape.
    Malformed,

    /// Anything retrying cannot fix (corrupt step log, invalid input).
    Permanent,
}

impl ErrorKind {
    /// Kinds the retry policy may retry at all.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Transient | ErrorKind::RateLimited | ErrorKind::Malformed
        )
    }
}

/// What the decider sees of one failed step attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureObservation {
    pub kind: ErrorKind,
    pub message: String,

    /// Server-provided wait, only set for `RateLimited`.
    pub retry_after: Option<Duration>,
}

impl FailureObservation {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Duration) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
            retry_after: Some(retry_after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::transient(ErrorKind::Transient, true)]
    #[case::rate_limited(ErrorKind::RateLimited, true)]
    #[case::malformed(ErrorKind::Malformed, true)]
    #[case::auth(ErrorKind::Auth, false)]
    #[case::permanent(ErrorKind::Permanent, false)]
    fn retryable_kinds(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let s = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(s, "\"rate_limited\"");
    }
}
