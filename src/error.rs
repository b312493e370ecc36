use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid knowledge record: {0}")]
    InvalidRecord(String),

    #[error("Generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Generation API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Generation response contained no choices")]
    EmptyCompletion,

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl ChatError {
    /// Rate limits, server-side failures and timeouts may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Api { status, .. } => *status == 429 || *status >= 500,
            ChatError::Transport(e) => e.is_timeout() || e.is_connect(),
            ChatError::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        let limited = ChatError::Api { status: 429, body: "slow down".into() };
        let unavailable = ChatError::Api { status: 503, body: String::new() };
        assert!(limited.is_retryable());
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn auth_errors_are_not_retryable() {
        let unauthorized = ChatError::Api { status: 401, body: "bad key".into() };
        assert!(!unauthorized.is_retryable());
        assert!(!ChatError::EmptyCompletion.is_retryable());
    }

    #[test]
    fn api_error_message_includes_status_and_body() {
        let err = ChatError::Api { status: 401, body: "invalid api key".into() };
        assert_eq!(err.to_string(), "Generation API error 401: invalid api key");
    }
}
