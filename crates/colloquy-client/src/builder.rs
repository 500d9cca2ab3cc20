use colloquy_config::ClientConfig;
use colloquy_core::Message;

use crate::error::{ChatError, Result};
use crate::options::AskOptions;
use crate::types::{ChatRequest, StreamOptions, encode_function_call, encode_tool_choice};

/// Reject empty or whitespace-only arguments
pub(crate) fn require_text<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(ChatError::Validation(format!("{what} must not be empty")));
    }

    Ok(value)
}

/// Pick the call's model, falling back to the configured default
pub(crate) fn resolve_model<'a>(explicit: Option<&'a str>, default: Option<&'a str>, what: &str) -> Result<&'a str> {
    explicit
        .or(default)
        .filter(|model| !model.trim().is_empty())
        .ok_or_else(|| ChatError::Validation(format!("a {what} name is required")))
}

/// Assemble the wire request for a conversation snapshot
pub(crate) fn build_chat_request(
    config: &ClientConfig,
    model: &str,
    messages: &[Message],
    options: &AskOptions,
    stream: bool,
) -> Result<ChatRequest> {
    let parameters = options
        .parameters
        .clone()
        .unwrap_or_default()
        .or(&config.default_parameters);

    let stream_options = (stream && config.service.is_canonical_openai()).then_some(StreamOptions { include_usage: true });

    let mut request = ChatRequest {
        model: model.to_owned(),
        messages: messages.to_vec(),
        stream,
        stream_options,
        parameters,
        functions: None,
        function_call: None,
        tools: None,
        tool_choice: None,
        user: config.user.clone(),
    };

    if let Some(tools) = &options.tools {
        if !tools.functions.is_empty() && !tools.tools.is_empty() {
            return Err(ChatError::Validation(
                "functions and tools cannot be offered in the same request".to_owned(),
            ));
        }

        let names = tools
            .functions
            .iter()
            .map(|function| function.name.as_str())
            .chain(tools.tools.iter().map(|tool| tool.function.name.as_str()));
        for name in names {
            require_text(name, "function name")?;
        }

        if !tools.functions.is_empty() {
            request.functions = Some(tools.functions.clone());
            request.function_call = tools.function_call.as_deref().map(encode_function_call);
        }

        if !tools.tools.is_empty() {
            request.tools = Some(tools.tools.clone());
            request.tool_choice = tools.tool_choice.as_deref().map(encode_tool_choice);
        }
    }

    Ok(request)
}
