use thiserror::Error;

/// Errors raised while resolving or validating client configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Endpoint URL could not be built
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// A header value contains characters HTTP does not allow
    #[error("invalid value for header `{0}`")]
    Header(&'static str),

    /// A setting is out of range or missing
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// `{{ env.VAR }}` placeholder could not be expanded
    #[error("variable expansion failed: {0}")]
    Expansion(String),
}
