//! Client configuration for Colloquy
//!
//! A [`ClientConfig`] is either built in code with [`ClientConfig::openai`] /
//! [`ClientConfig::azure`] and the `with_*` methods, or loaded from a TOML
//! file with [`ClientConfig::load`].

#![allow(clippy::must_use_candidate)]

mod env;
pub mod error;
mod loader;
pub mod parameters;
pub mod service;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Deserializer};
use url::Url;

pub use env::expand_env;
pub use error::ConfigError;
pub use parameters::*;
pub use service::*;

/// Top-level client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Remote service and credentials
    pub service: ServiceConfig,
    /// Non-system messages kept per conversation
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
    /// Idle lifetime of a cached conversation (e.g. "30m", "1h")
    #[serde(default = "default_message_expiration", deserialize_with = "deserialize_duration")]
    pub message_expiration: Duration,
    /// Raise API errors instead of returning them inside the response
    #[serde(default = "default_throw_on_error")]
    pub throw_on_error: bool,
    /// Chat model (or Azure deployment) used when a call names none
    #[serde(default)]
    pub default_model: Option<String>,
    /// Embedding model (or Azure deployment) used when a call names none
    #[serde(default)]
    pub default_embedding_model: Option<String>,
    /// Parameters applied to every chat request unless overridden
    #[serde(default)]
    pub default_parameters: ChatParameters,
    /// Parameters applied to every embedding request unless overridden
    #[serde(default)]
    pub default_embedding_parameters: EmbeddingParameters,
    /// End-user identifier forwarded as `user`
    #[serde(default)]
    pub user: Option<String>,
    /// Conversation store
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Conversation cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Upper bound on conversations held in memory
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// Use Redis/Valkey instead of process memory
    #[serde(default)]
    pub redis: Option<RedisCacheConfig>,
}

/// Redis/Valkey connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// Connection URL
    pub url: Url,
    /// Key prefix, entries live under `{prefix}:{conversation_id}`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            redis: None,
        }
    }
}

const fn default_message_limit() -> usize {
    10
}

const fn default_message_expiration() -> Duration {
    Duration::from_secs(60 * 60)
}

const fn default_throw_on_error() -> bool {
    true
}

const fn default_max_capacity() -> u64 {
    10_000
}

fn default_key_prefix() -> String {
    "colloquy:conversation".to_owned()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    duration_str::parse(&raw).map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

impl ClientConfig {
    /// Configuration for the `OpenAI` API with library defaults
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_service(ServiceConfig::openai(api_key))
    }

    /// Configuration for an Azure `OpenAI` resource with library defaults
    pub fn azure(
        resource_name: impl Into<String>,
        api_key: impl Into<String>,
        authentication: AzureAuthentication,
    ) -> Self {
        Self::with_service(ServiceConfig::azure(resource_name, api_key, authentication))
    }

    /// Configuration for an arbitrary service with library defaults
    pub fn with_service(service: ServiceConfig) -> Self {
        Self {
            service,
            message_limit: default_message_limit(),
            message_expiration: default_message_expiration(),
            throw_on_error: default_throw_on_error(),
            default_model: None,
            default_embedding_model: None,
            default_parameters: ChatParameters::default(),
            default_embedding_parameters: EmbeddingParameters::default(),
            user: None,
            cache: CacheConfig::default(),
        }
    }

    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_default_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.default_embedding_model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_message_limit(mut self, limit: usize) -> Self {
        self.message_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_message_expiration(mut self, expiration: Duration) -> Self {
        self.message_expiration = expiration;
        self
    }

    #[must_use]
    pub const fn with_throw_on_error(mut self, throw: bool) -> Self {
        self.throw_on_error = throw;
        self
    }

    #[must_use]
    pub fn with_default_parameters(mut self, parameters: ChatParameters) -> Self {
        self.default_parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_default_embedding_parameters(mut self, parameters: EmbeddingParameters) -> Self {
        self.default_embedding_parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Override the service host, mainly for tests and proxies
    #[must_use]
    pub fn with_base_url(mut self, url: Url) -> Self {
        self.service.set_base_url(url);
        self
    }

    /// Check that the configuration can produce valid requests
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_limit == 0 {
            return Err(ConfigError::Invalid("message_limit must be greater than zero".to_owned()));
        }

        if self.message_expiration.is_zero() {
            return Err(ConfigError::Invalid("message_expiration must be greater than zero".to_owned()));
        }

        if self.service.api_key().expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("service api_key must not be empty".to_owned()));
        }

        if let ServiceConfig::Azure(azure) = &self.service {
            let has_resource = azure.resource_name.as_deref().is_some_and(|n| !n.trim().is_empty());
            if !has_resource && azure.endpoint.is_none() {
                return Err(ConfigError::Invalid(
                    "azure service requires `resource_name` or `endpoint`".to_owned(),
                ));
            }
            if azure.api_version.trim().is_empty() {
                return Err(ConfigError::Invalid("azure api_version must not be empty".to_owned()));
            }
        }

        if self.default_model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid("default_model must not be empty when set".to_owned()));
        }

        self.default_parameters
            .check()
            .map_err(|e| ConfigError::Invalid(format!("default_parameters: {e}")))?;

        if self.cache.max_capacity == 0 {
            return Err(ConfigError::Invalid("cache.max_capacity must be greater than zero".to_owned()));
        }

        // Header construction is the last thing that can fail per request
        self.service.request_headers()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programmatic_defaults() {
        let config = ClientConfig::openai("sk-test");
        assert_eq!(config.message_limit, 10);
        assert_eq!(config.message_expiration, Duration::from_secs(3600));
        assert!(config.throw_on_error);
        assert!(config.default_model.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_with_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            default_model = "gpt-4o"

            [service]
            type = "openai"
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_model.as_deref(), Some("gpt-4o"));
        assert_eq!(config.message_limit, 10);
        assert_eq!(config.cache.max_capacity, 10_000);
        assert!(matches!(config.service, ServiceConfig::OpenAi(_)));
    }

    #[test]
    fn toml_azure_with_overrides() {
        let config: ClientConfig = toml::from_str(
            r#"
            message_limit = 4
            message_expiration = "15m"
            throw_on_error = false
            user = "tester"

            [service]
            type = "azure"
            resource_name = "contoso"
            api_key = "key"
            authentication = "active_directory"

            [default_parameters]
            temperature = 0.3
            response_format = { type = "json_object" }
            "#,
        )
        .unwrap();

        assert_eq!(config.message_limit, 4);
        assert_eq!(config.message_expiration, Duration::from_secs(15 * 60));
        assert!(!config.throw_on_error);
        assert_eq!(config.default_parameters.temperature, Some(0.3));
        assert_eq!(config.default_parameters.response_format, Some(ResponseFormat::JSON_OBJECT));

        let ServiceConfig::Azure(azure) = &config.service else {
            panic!("expected azure service");
        };
        assert_eq!(azure.authentication, AzureAuthentication::ActiveDirectory);
        assert_eq!(azure.api_version, AZURE_DEFAULT_API_VERSION);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<ClientConfig, _> = toml::from_str(
            r#"
            message_limt = 4

            [service]
            type = "openai"
            api_key = "sk-test"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let result: Result<ClientConfig, _> = toml::from_str(
            r#"
            message_expiration = "soon"

            [service]
            type = "openai"
            api_key = "sk-test"
            "#,
        );
        assert!(result.unwrap_err().to_string().contains("invalid duration"));
    }

    #[test]
    fn validation_failures() {
        assert!(ClientConfig::openai("sk").with_message_limit(0).validate().is_err());
        assert!(ClientConfig::openai("  ").validate().is_err());
        assert!(
            ClientConfig::openai("sk")
                .with_default_parameters(ChatParameters::default().with_temperature(3.0))
                .validate()
                .is_err()
        );
        assert!(ClientConfig::azure("", "key", AzureAuthentication::ApiKey).validate().is_err());
    }

    #[test]
    fn azure_endpoint_override_satisfies_validation() {
        let config = ClientConfig::azure("", "key", AzureAuthentication::ApiKey)
            .with_base_url(Url::parse("http://localhost:8080").unwrap());
        assert!(config.validate().is_ok());
    }
}
