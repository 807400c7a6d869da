use std::fmt;

use super::error::TranscriptionError;

/// Terminal result of one transcription request. Exactly one is produced per
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionOutcome {
    Success(String),
    Empty,
    Failed(String),
    RateLimited,
}

impl TranscriptionOutcome {
    pub fn from_result(result: Result<String, TranscriptionError>) -> Self {
        match result {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    Self::Empty
                } else {
                    Self::Success(trimmed.to_string())
                }
            }
            Err(err) if err.is_rate_limited() => Self::RateLimited,
            Err(err) => Self::Failed(err.to_string()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Empty => "empty",
            Self::Failed(_) => "failed",
            Self::RateLimited => "rate_limited",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl fmt::Display for TranscriptionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(text) => write!(f, "{}", text),
            Self::Empty => f.write_str("<no speech>"),
            Self::Failed(detail) => write!(f, "failed: {}", detail),
            Self::RateLimited => f.write_str("rate limited, try again later"),
        }
    }
}

/// Receiver for the four mutually exclusive terminal notifications.
pub trait TranscriptionObserver: Send + Sync {
    fn on_success(&self, text: String);
    fn on_empty(&self);
    fn on_failed(&self, detail: String);
    fn on_rate_limited(&self);

    fn deliver(&self, outcome: TranscriptionOutcome) {
        match outcome {
            TranscriptionOutcome::Success(text) => self.on_success(text),
            TranscriptionOutcome::Empty => self.on_empty(),
            TranscriptionOutcome::Failed(detail) => self.on_failed(detail),
            TranscriptionOutcome::RateLimited => self.on_rate_limited(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_trimmed_on_success() {
        let outcome = TranscriptionOutcome::from_result(Ok("  hello world  ".into()));
        assert_eq!(outcome, TranscriptionOutcome::Success("hello world".into()));
    }

    #[test]
    fn blank_text_is_empty() {
        assert_eq!(
            TranscriptionOutcome::from_result(Ok(" \n\t".into())),
            TranscriptionOutcome::Empty
        );
    }

    #[test]
    fn rate_limit_is_not_a_failure() {
        let outcome = TranscriptionOutcome::from_result(Err(TranscriptionError::RateLimited {
            body: "slow down".into(),
        }));
        assert_eq!(outcome, TranscriptionOutcome::RateLimited);
    }

    #[test]
    fn other_errors_fail_with_detail() {
        let outcome = TranscriptionOutcome::from_result(Err(TranscriptionError::status(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            "upstream exploded",
        )));
        match outcome {
            TranscriptionOutcome::Failed(detail) => assert!(detail.contains("upstream exploded")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
