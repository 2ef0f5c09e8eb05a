use thiserror::Error;

/// Failure talking to a blockchain data provider. Any of these aborts the
/// current scan window; the caller retries the identical window later.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("provider returned an empty response for {0}")]
    EmptyResponse(&'static str),

    #[error("provider status rejected: {0}")]
    Status(String),

    #[error("get block {height} page {page} failed: {reason}")]
    BlockPage {
        height: u64,
        page: u32,
        reason: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    #[error("cannot decode provider response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::Timeout(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ApiError::Decode(error.to_string())
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

/// Formats an error with all of its sources, colon separated.
pub fn as_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_transient() {
        assert!(ApiError::Timeout(120).is_transient());
        assert!(ApiError::Transport("reset".into()).is_transient());
        assert!(!ApiError::Status("Not sync API".into()).is_transient());
        assert!(!ApiError::EmptyResponse("get_block").is_transient());
    }

    #[test]
    fn block_page_error_names_the_page() {
        let e = ApiError::BlockPage {
            height: 10,
            page: 2,
            reason: "empty".into(),
        };
        assert_eq!(e.to_string(), "get block 10 page 2 failed: empty");
    }
}
