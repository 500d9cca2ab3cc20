use colloquy_config::ChatParameters;
use colloquy_core::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Tool choice that lets the model decide
pub const CHOICE_AUTO: &str = "auto";
/// Tool choice that disables calls
pub const CHOICE_NONE: &str = "none";
/// Tool choice that forces some call (tools only)
pub const CHOICE_REQUIRED: &str = "required";

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier (ignored by Azure, which routes by deployment)
    pub model: String,
    /// Full conversation snapshot
    pub messages: Vec<Message>,
    /// Server-sent events instead of a single body
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    /// Sampling parameters, unset fields omitted
    #[serde(flatten)]
    pub parameters: ChatParameters,
    /// Legacy function declarations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<Function>>,
    /// Legacy function choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
    /// Tool declarations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// Tool choice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    /// End-user identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Streaming options
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamOptions {
    /// Send a final usage frame before `[DONE]`
    pub include_usage: bool,
}

/// Function the model may call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Function name
    pub name: String,
    /// What the function does, used by the model to pick it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl Function {
    /// Declare a function taking no arguments
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters: empty_object_schema(),
        }
    }

    /// Set the argument schema
    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }
}

/// Tool declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function definition
    pub function: Function,
}

impl From<Function> for Tool {
    fn from(function: Function) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function,
        }
    }
}

/// Functions or tools offered to the model for one call
///
/// `functions` and `tools` are mutually exclusive. Choices are `"none"`,
/// `"auto"`, `"required"` (tools only) or the name of a function to force.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolParameters {
    pub functions: Vec<Function>,
    pub function_call: Option<String>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<String>,
}

impl ToolParameters {
    /// Offer legacy functions
    pub fn functions(functions: Vec<Function>) -> Self {
        Self {
            functions,
            ..Self::default()
        }
    }

    /// Offer tools
    pub fn tools(tools: impl IntoIterator<Item = impl Into<Tool>>) -> Self {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_function_call(mut self, choice: impl Into<String>) -> Self {
        self.function_call = Some(choice.into());
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, choice: impl Into<String>) -> Self {
        self.tool_choice = Some(choice.into());
        self
    }
}

/// Encode a legacy `function_call` choice
pub fn encode_function_call(choice: &str) -> Value {
    match choice {
        CHOICE_NONE | CHOICE_AUTO => Value::String(choice.to_owned()),
        name => json!({ "name": name }),
    }
}

/// Encode a `tool_choice`
pub fn encode_tool_choice(choice: &str) -> Value {
    match choice {
        CHOICE_NONE | CHOICE_AUTO | CHOICE_REQUIRED => Value::String(choice.to_owned()),
        name => json!({ "type": "function", "function": { "name": name } }),
    }
}
