//! Errors raised while fetching pairs from the search endpoint

use thiserror::Error;

/// Response bodies are cut to this many characters in error messages
pub const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("feed rate limit exceeded")]
    RateLimited,

    #[error("could not decode feed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("feed did not answer within {0} s")]
    Timeout(u64),
}

impl FeedError {
    pub fn status(status: u16, body: &str) -> Self {
        FeedError::Status {
            status,
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_is_truncated() {
        let body = "x".repeat(500);
        match FeedError::status(502, &body) {
            FeedError::Status { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
