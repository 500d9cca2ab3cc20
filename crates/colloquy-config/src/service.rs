//! Provider endpoint and authentication resolution
//!
//! `OpenAI` and Azure `OpenAI` expose the same wire format behind different
//! URLs and auth headers. The variant is selected once when the
//! configuration is built; every request asks it for its endpoint and
//! headers.

use http::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Default `OpenAI` API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Azure `OpenAI` API version used when none is configured
pub const AZURE_DEFAULT_API_VERSION: &str = "2024-02-15-preview";

/// Remote service the client talks to
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceConfig {
    /// `OpenAI` API (or a compatible server via `base_url`)
    #[serde(rename = "openai")]
    OpenAi(OpenAiServiceConfig),
    /// Azure `OpenAI` resource
    Azure(AzureServiceConfig),
}

/// `OpenAI` service settings
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiServiceConfig {
    /// API key sent as a bearer token
    pub api_key: SecretString,
    /// Optional organization, sent as `OpenAI-Organization`
    #[serde(default)]
    pub organization: Option<String>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
}

/// Azure `OpenAI` service settings
#[derive(Debug, Clone, Deserialize)]
pub struct AzureServiceConfig {
    /// Resource name, the `{name}` in `{name}.openai.azure.com`
    #[serde(default)]
    pub resource_name: Option<String>,
    /// API key, or an Entra ID token when `authentication` is `active_directory`
    pub api_key: SecretString,
    /// Value of the `api-version` query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// How `api_key` is presented
    #[serde(default)]
    pub authentication: AzureAuthentication,
    /// Full endpoint override, replaces the resource-derived host
    #[serde(default)]
    pub endpoint: Option<Url>,
}

/// Azure authentication scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AzureAuthentication {
    /// `api-key: <key>` header
    #[default]
    #[serde(alias = "apikey")]
    ApiKey,
    /// `Authorization: Bearer <token>` header
    #[serde(
        alias = "activedirectory",
        alias = "azure_active_directory",
        alias = "azure_ad",
        alias = "azuread",
        alias = "ad"
    )]
    ActiveDirectory,
}

fn default_api_version() -> String {
    AZURE_DEFAULT_API_VERSION.to_owned()
}

impl ServiceConfig {
    /// `OpenAI` service with the given API key
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::OpenAi(OpenAiServiceConfig {
            api_key: SecretString::from(api_key.into()),
            organization: None,
            base_url: None,
        })
    }

    /// Azure service for the given resource
    pub fn azure(
        resource_name: impl Into<String>,
        api_key: impl Into<String>,
        authentication: AzureAuthentication,
    ) -> Self {
        Self::Azure(AzureServiceConfig {
            resource_name: Some(resource_name.into()),
            api_key: SecretString::from(api_key.into()),
            api_version: default_api_version(),
            authentication,
            endpoint: None,
        })
    }

    /// Point the service at a different host
    ///
    /// For `OpenAI` this replaces the base URL (`.../v1`); for Azure it
    /// replaces `https://{resource}.openai.azure.com`.
    pub fn set_base_url(&mut self, url: Url) {
        match self {
            Self::OpenAi(openai) => openai.base_url = Some(url),
            Self::Azure(azure) => azure.endpoint = Some(url),
        }
    }

    /// Whether requests go to the canonical `OpenAI` host
    ///
    /// Compatible servers and Azure reject `stream_options`, so it is only
    /// sent here.
    pub fn is_canonical_openai(&self) -> bool {
        match self {
            Self::OpenAi(openai) => openai
                .base_url
                .as_ref()
                .is_none_or(|url| url.host_str() == Some("api.openai.com")),
            Self::Azure(_) => false,
        }
    }

    /// Chat completion URL for the given model
    ///
    /// Azure routes by deployment, so `model` must name one.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built
    pub fn chat_completion_endpoint(&self, model: &str) -> Result<Url, ConfigError> {
        self.endpoint(model, "chat/completions")
    }

    /// Embeddings URL for the given model
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built
    pub fn embedding_endpoint(&self, model: &str) -> Result<Url, ConfigError> {
        self.endpoint(model, "embeddings")
    }

    fn endpoint(&self, model: &str, operation: &str) -> Result<Url, ConfigError> {
        match self {
            Self::OpenAi(openai) => {
                let base = openai
                    .base_url
                    .as_ref()
                    .map_or(OPENAI_BASE_URL, Url::as_str)
                    .trim_end_matches('/');
                parse_url(&format!("{base}/{operation}"))
            }
            Self::Azure(azure) => {
                if model.trim().is_empty() {
                    return Err(ConfigError::Invalid(
                        "azure requests require a deployment name".to_owned(),
                    ));
                }

                let mut url = parse_url(&azure.host()?)?;
                url.path_segments_mut()
                    .map_err(|()| ConfigError::Endpoint("azure endpoint cannot be a base URL".to_owned()))?
                    .pop_if_empty()
                    .extend(["openai", "deployments", model])
                    .extend(operation.split('/'));
                url.query_pairs_mut().append_pair("api-version", &azure.api_version);
                Ok(url)
            }
        }
    }

    /// Authentication headers attached to every request
    ///
    /// # Errors
    ///
    /// Returns an error if a configured value is not a valid header value
    pub fn request_headers(&self) -> Result<HeaderMap, ConfigError> {
        let mut headers = HeaderMap::new();

        match self {
            Self::OpenAi(openai) => {
                headers.insert(AUTHORIZATION, bearer(&openai.api_key)?);

                if let Some(organization) = openai.organization.as_deref().filter(|o| !o.trim().is_empty()) {
                    let value = HeaderValue::from_str(organization)
                        .map_err(|_| ConfigError::Header("OpenAI-Organization"))?;
                    headers.insert(HeaderName::from_static("openai-organization"), value);
                }
            }
            Self::Azure(azure) => match azure.authentication {
                AzureAuthentication::ApiKey => {
                    headers.insert(
                        HeaderName::from_static("api-key"),
                        sensitive(azure.api_key.expose_secret(), "api-key")?,
                    );
                }
                AzureAuthentication::ActiveDirectory => {
                    headers.insert(AUTHORIZATION, bearer(&azure.api_key)?);
                }
            },
        }

        Ok(headers)
    }

    /// The configured credential
    pub fn api_key(&self) -> &SecretString {
        match self {
            Self::OpenAi(openai) => &openai.api_key,
            Self::Azure(azure) => &azure.api_key,
        }
    }
}

impl AzureServiceConfig {
    fn host(&self) -> Result<String, ConfigError> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.as_str().trim_end_matches('/').to_owned());
        }

        match self.resource_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(format!("https://{name}.openai.azure.com")),
            _ => Err(ConfigError::Invalid(
                "azure service requires `resource_name` or `endpoint`".to_owned(),
            )),
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::Endpoint(format!("{raw}: {e}")))
}

fn bearer(secret: &SecretString) -> Result<HeaderValue, ConfigError> {
    sensitive(&format!("Bearer {}", secret.expose_secret()), "Authorization")
}

fn sensitive(value: &str, name: &'static str) -> Result<HeaderValue, ConfigError> {
    let mut value = HeaderValue::from_str(value).map_err(|_| ConfigError::Header(name))?;
    value.set_sensitive(true);
    Ok(value)
}
