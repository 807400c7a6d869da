use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription provider '{provider}' is not available: {reason}")]
    Unavailable {
        provider: &'static str,
        reason: String,
    },
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("invalid transcription request: {0}")]
    InvalidRequest(String),
    #[error("HTTP request failed: {source}")]
    Http {
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("rate limited by provider: {body}")]
    RateLimited { body: String },
    #[error("unable to parse provider response: {0}")]
    ResponseParse(String),
    #[error("local engine error: {0}")]
    Engine(String),
    #[error("transcription queue is full")]
    QueueFull,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TranscriptionError {
    pub fn unavailable(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider,
            reason: reason.into(),
        }
    }

    pub fn http(source: reqwest::Error) -> Self {
        Self::Http { source }
    }

    pub fn status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ResponseParse(message.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_keeps_body_in_message() {
        let err = TranscriptionError::status(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"bad audio"}}"#,
        );
        let rendered = err.to_string();
        assert!(rendered.contains("400"));
        assert!(rendered.contains("bad audio"));
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn rate_limited_is_distinguished() {
        let err = TranscriptionError::RateLimited {
            body: String::new(),
        };
        assert!(err.is_rate_limited());
    }
}
