use std::fmt;
use std::future::Future;
use std::sync::Arc;

use colloquy_cache::{ConversationCache, MemoryConversationCache};
use colloquy_config::ClientConfig;
use colloquy_core::{ConversationId, Message, resolve_conversation_id};
use http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::builder::{build_chat_request, require_text, resolve_model};
use crate::error::{ChatError, Result};
use crate::history::trim_history;
use crate::options::{AskOptions, EmbeddingOptions};
use crate::stream::{ChatStream, WriteBack, chat_stream};
use crate::types::{ApiError, ChatResponse, EmbeddingRequest, EmbeddingResponse, ErrorPayload};

/// Conversation-aware chat completion client
///
/// Cheap to clone; clones share the HTTP connection pool and the
/// conversation cache. Calls on the same conversation are not serialized:
/// when two run concurrently the last one to finish overwrites the other's
/// history.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    cache: Arc<dyn ConversationCache>,
    config: Arc<ClientConfig>,
    headers: HeaderMap,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a client with the cache described by the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or names a cache
    /// backend that is not compiled in
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let cache = default_cache(&config)?;
        let http = reqwest::Client::builder().build()?;

        Self::assemble(config, cache, http)
    }

    /// Create a client with a caller-provided conversation cache
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn with_cache(config: ClientConfig, cache: Arc<dyn ConversationCache>) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder().build()?;

        Self::assemble(config, cache, http)
    }

    /// Replace the HTTP client, e.g. to set timeouts or a proxy
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn assemble(config: ClientConfig, cache: Arc<dyn ConversationCache>, http: reqwest::Client) -> Result<Self> {
        let headers = config.service.request_headers()?;

        Ok(Self {
            http,
            cache,
            config: Arc::new(config),
            headers,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -- Chat --

    /// Send a message and wait for the full answer
    ///
    /// A nil `conversation_id` starts a new conversation; the id used is
    /// returned in [`ChatResponse::conversation_id`]. History is written
    /// back only when the call succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for an empty message or missing
    /// model, [`ChatError::Api`] for service errors when `throw_on_error`
    /// is set, and transport, cache or cancellation errors
    pub async fn ask(&self, conversation_id: ConversationId, message: &str, options: &AskOptions) -> Result<ChatResponse> {
        let (id, model, mut history) = self.prepare(conversation_id, message, options).await?;
        let request = build_chat_request(&self.config, model, &history, options, false)?;
        let url = self.config.service.chat_completion_endpoint(model)?;

        tracing::debug!(conversation_id = %id, model, messages = history.len(), "sending chat completion");

        let cancel = options.cancel.as_ref();
        let response = cancellable(cancel, self.post(url, &request)).await??;
        let mut response: ChatResponse = cancellable(cancel, self.read_response(response)).await??;
        response.conversation_id = id;

        if !response.is_successful() {
            return Ok(response);
        }

        let answer = response
            .first_choice()
            .and_then(|choice| choice.message.clone())
            .filter(|message| message.content.is_some() || message.has_calls());

        if let Some(answer) = answer {
            history.push(answer);
            self.store(id, history).await?;
        } else {
            tracing::warn!(conversation_id = %id, "completion returned no message");
        }

        if let Some(usage) = response.usage {
            tracing::debug!(
                conversation_id = %id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        Ok(response)
    }

    /// Send a message and stream the answer as it is generated
    ///
    /// Each item carries one text fragment. History is written back after
    /// the service signals completion; a stream that is dropped, cancelled
    /// or cut short leaves the conversation unchanged.
    ///
    /// # Errors
    ///
    /// Same as [`ChatClient::ask`] for everything that happens before the
    /// first fragment
    pub async fn ask_stream(
        &self,
        conversation_id: ConversationId,
        message: &str,
        options: &AskOptions,
    ) -> Result<ChatStream> {
        let (id, model, history) = self.prepare(conversation_id, message, options).await?;
        let request = build_chat_request(&self.config, model, &history, options, true)?;
        let url = self.config.service.chat_completion_endpoint(model)?;

        tracing::debug!(conversation_id = %id, model, messages = history.len(), "sending streaming chat completion");

        let cancel = options.cancel.clone().unwrap_or_default();
        let response = cancellable(Some(&cancel), self.post(url, &request)).await??;
        let status = response.status();

        if !status.is_success() {
            let mut response: ChatResponse = cancellable(Some(&cancel), self.read_response(response)).await??;
            response.conversation_id = id;
            let stream: ChatStream = Box::pin(futures_util::stream::once(async move { Ok::<_, ChatError>(response) }));
            return Ok(stream);
        }

        let write_back = WriteBack {
            cache: Arc::clone(&self.cache),
            history,
            message_limit: self.config.message_limit,
            ttl: self.config.message_expiration,
        };

        Ok(chat_stream(
            response.bytes_stream(),
            status,
            id,
            write_back,
            self.config.throw_on_error,
            cancel,
        ))
    }

    /// Validate inputs and build the conversation snapshot for a new turn
    async fn prepare<'a>(
        &'a self,
        conversation_id: ConversationId,
        message: &str,
        options: &'a AskOptions,
    ) -> Result<(ConversationId, &'a str, Vec<Message>)> {
        let message = require_text(message, "message")?;
        let model = resolve_model(options.model.as_deref(), self.config.default_model.as_deref(), "model")?;
        let id = resolve_conversation_id(conversation_id);

        let mut history = cancellable(options.cancel.as_ref(), self.cache.get(id)).await??.unwrap_or_default();
        history.push(Message::user(message));

        Ok((id, model, history))
    }

    // -- Embeddings --

    /// Embed a single input
    ///
    /// # Errors
    ///
    /// Same as [`ChatClient::generate_embeddings`]
    pub async fn generate_embedding(&self, input: &str, options: &EmbeddingOptions) -> Result<EmbeddingResponse> {
        self.generate_embeddings(&[input], options).await
    }

    /// Embed several inputs in one request
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for empty input or a missing
    /// model, [`ChatError::Api`] for service errors when `throw_on_error`
    /// is set, and transport or cancellation errors
    pub async fn generate_embeddings<S: AsRef<str>>(
        &self,
        inputs: &[S],
        options: &EmbeddingOptions,
    ) -> Result<EmbeddingResponse> {
        if inputs.is_empty() {
            return Err(ChatError::Validation("at least one input is required".to_owned()));
        }
        let input = inputs
            .iter()
            .map(|input| require_text(input.as_ref(), "embedding input").map(str::to_owned))
            .collect::<Result<Vec<_>>>()?;

        let model = resolve_model(
            options.model.as_deref(),
            self.config.default_embedding_model.as_deref(),
            "embedding model",
        )?;

        let request = EmbeddingRequest {
            model: model.to_owned(),
            input,
            user: self.config.user.clone(),
            parameters: options
                .parameters
                .clone()
                .unwrap_or_default()
                .or(&self.config.default_embedding_parameters),
        };
        let url = self.config.service.embedding_endpoint(model)?;

        tracing::debug!(model, inputs = request.input.len(), "sending embedding request");

        let cancel = options.cancel.as_ref();
        let response = cancellable(cancel, self.post(url, &request)).await??;
        cancellable(cancel, self.read_response(response)).await?
    }

    // -- Transport --

    async fn post<T: Serialize + Sync>(&self, url: Url, body: &T) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "request failed");
                ChatError::Http(e)
            })?;

        Ok(response)
    }

    /// Decode a body, normalizing service errors
    ///
    /// Failed responses without an error payload get one built from the
    /// status. Errors are raised or returned inside the body depending on
    /// `throw_on_error`.
    async fn read_response<T>(&self, response: reqwest::Response) -> Result<T>
    where
        T: DeserializeOwned + Default + ErrorPayload,
    {
        let status = response.status();
        let body = response.bytes().await?;

        let mut parsed: T = if status.is_success() {
            serde_json::from_slice(&body).map_err(|e| ChatError::Parse(e.to_string()))?
        } else {
            serde_json::from_slice(&body).unwrap_or_default()
        };

        if !status.is_success() && parsed.error().is_none() {
            parsed.set_error(ApiError::from_status(status));
        }

        if let Some(error) = parsed.error() {
            tracing::warn!(
                status = %status,
                code = error.code.as_deref().unwrap_or_default(),
                message = %error.message,
                "service returned error"
            );

            if self.config.throw_on_error {
                return Err(ChatError::Api {
                    status,
                    error: error.clone(),
                });
            }
        }

        Ok(parsed)
    }

    // -- Cache --

    /// Trim and persist a conversation
    pub(crate) async fn store(&self, id: ConversationId, mut messages: Vec<Message>) -> Result<()> {
        trim_history(&mut messages, self.config.message_limit);
        self.cache.set(id, &messages, self.config.message_expiration).await?;

        tracing::debug!(conversation_id = %id, messages = messages.len(), "stored conversation");
        Ok(())
    }

    pub(crate) fn cache(&self) -> &dyn ConversationCache {
        self.cache.as_ref()
    }
}

fn default_cache(config: &ClientConfig) -> Result<Arc<dyn ConversationCache>> {
    match &config.cache.redis {
        #[cfg(feature = "redis")]
        Some(redis) => Ok(Arc::new(colloquy_cache::RedisConversationCache::new(
            redis.url.as_str(),
            redis.key_prefix.clone(),
        )?)),
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(ChatError::Config(
            "redis cache configured but the `redis` feature is not enabled".to_owned(),
        )),
        None => Ok(Arc::new(MemoryConversationCache::new(config.cache.max_capacity))),
    }
}

/// Run `future` unless `cancel` fires first
async fn cancellable<F: Future>(cancel: Option<&CancellationToken>, future: F) -> Result<F::Output> {
    let Some(cancel) = cancel else {
        return Ok(future.await);
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ChatError::Cancelled),
        output = future => Ok(output),
    }
}
