use std::fmt;

use colloquy_core::{ConversationId, FunctionCall, Message, Role, ToolCall};
use http::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};

/// Finish reason reported when output was withheld by the content filter
pub const FINISH_CONTENT_FILTER: &str = "content_filter";

/// Chat completion response, or one streamed fragment of it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    /// Unix timestamp
    #[serde(default)]
    pub created: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
    /// Conversation this response belongs to, set by the client
    #[serde(default)]
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    /// Azure prompt moderation results
    #[serde(default, alias = "prompt_annotations")]
    pub prompt_filter_results: Option<Vec<PromptFilterResult>>,
    #[serde(default)]
    pub usage: Option<Usage>,
    /// Present when the request failed
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// One completion choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    /// Complete message (non-streaming)
    #[serde(default)]
    pub message: Option<Message>,
    /// Partial message (streaming)
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Azure completion moderation results
    #[serde(default)]
    pub content_filter_results: Option<ContentFilterResults>,
    /// Token log probabilities, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<LogProbabilities>,
}

/// Log probability information of a choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogProbabilities {
    /// One entry per output token
    #[serde(default)]
    pub content: Option<Vec<TokenLogProbability>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenLogProbability {
    pub token: String,
    /// `-9999.0` when the token is outside the top 20
    pub logprob: f64,
    /// UTF-8 bytes of the token, for tokens that split a character
    #[serde(default)]
    pub bytes: Option<Vec<u8>>,
    /// Most likely alternatives at this position
    #[serde(default)]
    pub top_logprobs: Vec<TokenLogProbability>,
}

/// Streamed message fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCallDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Streamed piece of a function call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Streamed piece of a tool call, identified by `index`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallDelta {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub tool_type: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionCallDelta>,
}

/// Token accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Moderation verdicts per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilterResults {
    #[serde(default)]
    pub hate: Option<ContentFilterResult>,
    #[serde(default)]
    pub self_harm: Option<ContentFilterResult>,
    #[serde(default)]
    pub sexual: Option<ContentFilterResult>,
    #[serde(default)]
    pub violence: Option<ContentFilterResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilterResult {
    #[serde(default)]
    pub filtered: bool,
    /// `safe`, `low`, `medium` or `high`
    #[serde(default)]
    pub severity: Option<String>,
}

/// Moderation verdict for one prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptFilterResult {
    #[serde(default)]
    pub prompt_index: u32,
    #[serde(default)]
    pub content_filter_results: Option<ContentFilterResults>,
}

impl ContentFilterResults {
    /// Whether any category was filtered
    pub fn is_filtered(&self) -> bool {
        [&self.hate, &self.self_harm, &self.sexual, &self.violence]
            .into_iter()
            .flatten()
            .any(|result| result.filtered)
    }
}

/// Error payload returned by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub param: Option<String>,
    /// Provider code, or the HTTP status when synthesized
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
}

impl ApiError {
    /// Error for a failed response whose body carried none
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            message: status.canonical_reason().unwrap_or("Unknown error").to_owned(),
            error_type: None,
            param: None,
            code: Some(status.as_u16().to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Code>::deserialize(deserializer)?.map(|code| match code {
        Code::Text(text) => text,
        Code::Number(number) => number.to_string(),
    }))
}

/// Responses that can carry an [`ApiError`]
pub(crate) trait ErrorPayload {
    fn error(&self) -> Option<&ApiError>;
    fn set_error(&mut self, error: ApiError);
}

impl ErrorPayload for ChatResponse {
    fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    fn set_error(&mut self, error: ApiError) {
        self.error = Some(error);
    }
}

// -- Helpers --

impl ChatResponse {
    /// Whether the request succeeded
    pub const fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    pub fn first_choice(&self) -> Option<&ChatChoice> {
        self.choices.first()
    }

    /// Text of the first choice
    ///
    /// Streamed fragments return their delta verbatim; complete messages
    /// are trimmed.
    pub fn content(&self) -> Option<&str> {
        let choice = self.first_choice()?;

        choice
            .delta
            .as_ref()
            .and_then(|delta| delta.content.as_deref())
            .or_else(|| choice.message.as_ref()?.content.as_deref().map(str::trim))
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.first_choice()?.finish_reason.as_deref()
    }

    /// Legacy function call requested by the model
    pub fn function_call(&self) -> Option<&FunctionCall> {
        self.first_choice()?.message.as_ref()?.function_call.as_ref()
    }

    /// Tool calls requested by the model
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.first_choice()
            .and_then(|choice| choice.message.as_ref())
            .and_then(|message| message.tool_calls.as_deref())
            .unwrap_or_default()
    }

    pub fn contains_function_calls(&self) -> bool {
        self.function_call().is_some()
    }

    pub fn contains_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    /// Whether any choice was withheld or flagged by the content filter
    pub fn is_content_filtered(&self) -> bool {
        self.choices.iter().any(|choice| {
            choice.finish_reason.as_deref() == Some(FINISH_CONTENT_FILTER)
                || choice
                    .content_filter_results
                    .as_ref()
                    .is_some_and(ContentFilterResults::is_filtered)
        })
    }

    /// Whether the prompt itself was flagged
    pub fn is_prompt_filtered(&self) -> bool {
        self.prompt_filter_results.iter().flatten().any(|result| {
            result
                .content_filter_results
                .as_ref()
                .is_some_and(ContentFilterResults::is_filtered)
        })
    }
}
