use colloquy_cache::CacheError;
use colloquy_config::ConfigError;
use http::StatusCode;

use crate::types::ApiError;

/// Client result type
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors from the chat client
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A required argument is missing or empty
    #[error("invalid argument: {0}")]
    Validation(String),

    /// The operation needs a conversation that does not exist
    #[error("conversation state: {0}")]
    ConversationState(String),

    /// The service rejected the request
    #[error("{status}: {error}")]
    Api {
        /// HTTP status of the response
        status: StatusCode,
        /// Error payload, synthesized from the status when the body had none
        error: ApiError,
    },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Conversation store failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,
}

impl From<ConfigError> for ChatError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl ChatError {
    /// API error payload, if this is an API error
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api { error, .. } => Some(error),
            _ => None,
        }
    }
}
