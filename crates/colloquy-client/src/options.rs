use colloquy_config::{ChatParameters, EmbeddingParameters};
use tokio_util::sync::CancellationToken;

use crate::types::ToolParameters;

/// Per-call settings for `ask` and `ask_stream`
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Overrides for the configured default parameters
    pub parameters: Option<ChatParameters>,
    /// Functions or tools offered to the model
    pub tools: Option<ToolParameters>,
    /// Model (or Azure deployment), falls back to the configured default
    pub model: Option<String>,
    /// Aborts the call; a cancelled call writes nothing back
    pub cancel: Option<CancellationToken>,
}

impl AskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: ChatParameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolParameters) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Per-call settings for embedding requests
#[derive(Debug, Clone, Default)]
pub struct EmbeddingOptions {
    pub parameters: Option<EmbeddingParameters>,
    pub model: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl EmbeddingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: u32) -> Self {
        self.parameters = Some(EmbeddingParameters {
            dimensions: Some(dimensions),
        });
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
