//! Scripted OpenAI-compatible backend for integration tests
//!
//! Replies are served in the order they were queued; once the queue is
//! empty every request gets a plain text completion. Every request is
//! recorded for inspection.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Text returned when no reply is queued
pub const DEFAULT_CONTENT: &str = "Hello from mock OpenAI";

/// One scripted response
#[derive(Debug, Clone)]
pub enum Reply {
    /// JSON body with the given status
    Json(StatusCode, Value),
    /// Status with an empty body
    Status(StatusCode),
    /// Event stream, each string sent as its own body chunk
    Chunks(Vec<String>),
    /// Event stream that sends its chunks then never ends
    Stalled(Vec<String>),
}

impl Reply {
    /// Successful completion with assistant text
    pub fn text(content: &str) -> Self {
        Self::Json(StatusCode::OK, completion(json!({ "role": "assistant", "content": content })))
    }

    /// Successful completion carrying an arbitrary assistant message
    pub fn message(message: Value) -> Self {
        Self::Json(StatusCode::OK, completion(message))
    }

    /// Well-formed stream of text deltas terminated by `[DONE]`
    pub fn stream(deltas: &[&str]) -> Self {
        let mut chunks: Vec<String> = deltas.iter().map(|content| sse_frame(&content_delta(content))).collect();
        chunks.push(sse_frame(&json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }] })));
        chunks.push("data: [DONE]\n\n".to_owned());
        Self::Chunks(chunks)
    }
}

/// `data: {json}` line followed by the blank event separator
pub fn sse_frame(value: &Value) -> String {
    format!("data: {value}\n\n")
}

pub fn content_delta(content: &str) -> Value {
    json!({
        "id": "chatcmpl-mock-stream",
        "object": "chat.completion.chunk",
        "created": 1_700_000_000,
        "model": "mock-model",
        "choices": [{ "index": 0, "delta": { "content": content } }]
    })
}

fn completion(message: Value) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "mock-model",
        "choices": [{ "index": 0, "message": message, "finish_reason": "stop" }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

/// Request as received by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path and query
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Value,
}

impl RecordedRequest {
    /// Roles of the `messages` array, in order
    pub fn roles(&self) -> Vec<String> {
        self.body["messages"]
            .as_array()
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|message| message["role"].as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock service bound to an ephemeral local port
pub struct MockOpenAi {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

impl MockOpenAi {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(MockState::default());

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// `OpenAI`-style base URL including `/v1`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Host root, used as the Azure endpoint override
    pub fn root_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue a reply for the next unanswered request
    pub fn push(&self, reply: Reply) -> &Self {
        self.state.replies.lock().expect("replies lock").push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().expect("requests lock").len()
    }
}

impl Drop for MockOpenAi {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let is_embedding = uri.path().ends_with("/embeddings");

    state.requests.lock().expect("requests lock").push(RecordedRequest {
        uri: uri.to_string(),
        headers,
        body: body.clone(),
    });

    let reply = state.replies.lock().expect("replies lock").pop_front();

    match reply {
        Some(Reply::Json(status, value)) => (status, axum::Json(value)).into_response(),
        Some(Reply::Status(status)) => status.into_response(),
        Some(Reply::Chunks(chunks)) => event_stream(chunks, false),
        Some(Reply::Stalled(chunks)) => event_stream(chunks, true),
        None if is_embedding => axum::Json(embeddings(&body)).into_response(),
        None => axum::Json(completion(json!({ "role": "assistant", "content": DEFAULT_CONTENT }))).into_response(),
    }
}

fn event_stream(chunks: Vec<String>, stall: bool) -> Response {
    let frames = futures_util::stream::iter(chunks).map(Ok::<_, Infallible>);

    let body = if stall {
        Body::from_stream(frames.chain(futures_util::stream::pending()))
    } else {
        Body::from_stream(frames)
    };

    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// One deterministic vector per input, `[len, 1.0, index]`
fn embeddings(request: &Value) -> Value {
    let inputs = request["input"].as_array().cloned().unwrap_or_default();

    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            let len = input.as_str().map_or(0, str::len);
            json!({
                "index": index,
                "object": "embedding",
                "embedding": [len as f32, 1.0, index as f32]
            })
        })
        .collect();

    json!({
        "object": "list",
        "model": request["model"],
        "data": data,
        "usage": { "prompt_tokens": inputs.len(), "total_tokens": inputs.len() }
    })
}
