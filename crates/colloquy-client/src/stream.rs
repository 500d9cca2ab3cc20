//! Server-sent event parsing for streamed completions
//!
//! Events with JSON data are completion fragments and a `[DONE]` event ends
//! the stream. Text fragments are yielded as they arrive while the full
//! assistant message is accumulated, then written back to the conversation
//! once the done marker is seen.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use colloquy_cache::ConversationCache;
use colloquy_core::{ConversationId, FunctionCall, Message, ToolCall};
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt};
use http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::history::trim_history;
use crate::types::{ChatResponse, Delta, FINISH_CONTENT_FILTER, PromptFilterResult, Usage};

/// Stream of completion fragments
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatResponse>> + Send>>;

type EventStream = Pin<Box<dyn Stream<Item = std::result::Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

// -- Event framing --

/// Parse a response body into server-sent events
///
/// A final line break is appended so a last event terminated by a single
/// newline is still dispatched; a line without any terminator is dropped.
fn events<S>(body: S) -> EventStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let terminator = futures_util::stream::once(async { Ok(Bytes::from_static(b"\n")) });
    Box::pin(body.chain(terminator).eventsource())
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Frame<'a> {
    /// JSON completion fragment
    Data(&'a str),
    /// `[DONE]`
    Done,
    /// Anything else
    Other,
}

pub(crate) fn classify(data: &str) -> Frame<'_> {
    if data == "[DONE]" {
        return Frame::Done;
    }

    if data.starts_with('{') {
        Frame::Data(data)
    } else {
        Frame::Other
    }
}

// -- Accumulation --

#[derive(Debug, Default)]
struct CallBuilder {
    id: String,
    name: String,
    arguments: String,
}

/// Folds fragments into the final assistant message
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    conversation_id: ConversationId,
    content: String,
    /// Leading newlines are stripped until the first text arrives
    started: bool,
    usage: Option<Usage>,
    prompt_filter_results: Option<Vec<PromptFilterResult>>,
    function_call: Option<CallBuilder>,
    tool_calls: BTreeMap<usize, CallBuilder>,
}

impl StreamAccumulator {
    pub(crate) fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            ..Self::default()
        }
    }

    /// Absorb a fragment, returning it if the caller should see it
    ///
    /// Fragments with text are returned. Metadata-only fragments are held
    /// and merged into the next returned fragment, except a content-filter
    /// stop which is returned even without text.
    pub(crate) fn accept(&mut self, mut fragment: ChatResponse) -> Option<ChatResponse> {
        fragment.conversation_id = self.conversation_id;

        if let Some(usage) = fragment.usage.take() {
            self.usage.get_or_insert(usage);
        }
        if let Some(results) = fragment.prompt_filter_results.take() {
            self.prompt_filter_results.get_or_insert(results);
        }

        let filtered = fragment
            .choices
            .iter()
            .any(|choice| choice.finish_reason.as_deref() == Some(FINISH_CONTENT_FILTER));

        let mut has_text = false;
        for delta in fragment.choices.iter_mut().filter_map(|choice| choice.delta.as_mut()) {
            self.absorb_calls(delta);

            let Some(text) = delta.content.as_deref().filter(|text| !text.is_empty()) else {
                continue;
            };

            let text = if self.started {
                text
            } else {
                text.trim_start_matches(['\n', '\r'])
            };

            if text.is_empty() {
                delta.content = None;
                continue;
            }

            let text = text.to_owned();
            self.started = true;
            self.content.push_str(&text);
            delta.content = Some(text);
            has_text = true;
        }

        if !has_text && !filtered {
            return None;
        }

        fragment.usage = self.usage.take();
        fragment.prompt_filter_results = self.prompt_filter_results.take();
        Some(fragment)
    }

    fn absorb_calls(&mut self, delta: &mut Delta) {
        if let Some(call) = delta.function_call.take() {
            let builder = self.function_call.get_or_insert_with(CallBuilder::default);
            builder.name.push_str(call.name.as_deref().unwrap_or_default());
            builder.arguments.push_str(call.arguments.as_deref().unwrap_or_default());
        }

        for call in delta.tool_calls.take().into_iter().flatten() {
            let builder = self.tool_calls.entry(call.index).or_default();
            if let Some(id) = call.id {
                builder.id = id;
            }
            if let Some(function) = call.function {
                builder.name.push_str(function.name.as_deref().unwrap_or_default());
                builder.arguments.push_str(function.arguments.as_deref().unwrap_or_default());
            }
        }
    }

    /// Usage that arrived after the last yielded fragment
    pub(crate) const fn trailing_usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Assistant message built from the stream, if it produced anything
    ///
    /// Text and requested calls end up in the same message.
    pub(crate) fn finish(self) -> Option<Message> {
        let content = (!self.content.is_empty()).then_some(self.content);

        let mut message = if !self.tool_calls.is_empty() {
            let calls = self
                .tool_calls
                .into_values()
                .map(|call| ToolCall::function(call.id, FunctionCall::new(call.name, call.arguments)))
                .collect();
            Message::assistant_tool_calls(calls)
        } else if let Some(call) = self.function_call {
            Message::assistant_function_call(FunctionCall::new(call.name, call.arguments))
        } else {
            return content.map(Message::assistant);
        };

        message.content = content;
        Some(message)
    }
}

// -- Stream driver --

/// Where the finished conversation is written
pub(crate) struct WriteBack {
    pub cache: Arc<dyn ConversationCache>,
    /// History including the new user message
    pub history: Vec<Message>,
    pub message_limit: usize,
    pub ttl: Duration,
}

struct StreamState {
    events: EventStream,
    accumulator: StreamAccumulator,
    write_back: WriteBack,
    conversation_id: ConversationId,
    status: StatusCode,
    throw_on_error: bool,
    cancel: CancellationToken,
    finished: bool,
}

/// Turn a successful streaming response body into a [`ChatStream`]
pub(crate) fn chat_stream<S>(
    body: S,
    status: StatusCode,
    conversation_id: ConversationId,
    write_back: WriteBack,
    throw_on_error: bool,
    cancel: CancellationToken,
) -> ChatStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = StreamState {
        events: events(body),
        accumulator: StreamAccumulator::new(conversation_id),
        write_back,
        conversation_id,
        status,
        throw_on_error,
        cancel,
        finished: false,
    };

    let stream = futures_util::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let item = state.next_item().await?;
        Some((item, state))
    });

    Box::pin(stream)
}

impl StreamState {
    async fn next_item(&mut self) -> Option<Result<ChatResponse>> {
        loop {
            if self.cancel.is_cancelled() {
                return self.fail(ChatError::Cancelled);
            }

            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                event = self.events.next() => Some(event),
            };

            let Some(event) = next else {
                return self.fail(ChatError::Cancelled);
            };

            let event = match event {
                Some(Ok(event)) => event,
                Some(Err(EventStreamError::Transport(e))) => return self.fail(ChatError::Http(e)),
                Some(Err(e)) => return self.fail(ChatError::Parse(format!("invalid event stream: {e}"))),
                None => {
                    return self.fail(ChatError::Parse("stream ended before completion marker".to_owned()));
                }
            };

            match classify(&event.data) {
                Frame::Done => {
                    self.finished = true;
                    return self.complete().await.err().map(Err);
                }
                Frame::Data(json) => {
                    let fragment = match serde_json::from_str::<ChatResponse>(json) {
                        Ok(fragment) => fragment,
                        Err(e) => return self.fail(ChatError::Parse(format!("invalid stream frame: {e}"))),
                    };

                    if let Some(error) = fragment.error.clone() {
                        tracing::warn!(
                            conversation_id = %self.conversation_id,
                            message = %error.message,
                            "error frame in completion stream"
                        );
                        self.finished = true;
                        return Some(if self.throw_on_error {
                            Err(ChatError::Api {
                                status: self.status,
                                error,
                            })
                        } else {
                            Ok(ChatResponse {
                                conversation_id: self.conversation_id,
                                ..fragment
                            })
                        });
                    }

                    if let Some(out) = self.accumulator.accept(fragment) {
                        return Some(Ok(out));
                    }
                }
                Frame::Other => {}
            }
        }
    }

    fn fail(&mut self, error: ChatError) -> Option<Result<ChatResponse>> {
        tracing::debug!(conversation_id = %self.conversation_id, error = %error, "completion stream aborted");
        self.finished = true;
        Some(Err(error))
    }

    async fn complete(&mut self) -> Result<()> {
        let accumulator = std::mem::take(&mut self.accumulator);

        if let Some(usage) = accumulator.trailing_usage() {
            tracing::debug!(
                conversation_id = %self.conversation_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "stream usage"
            );
        }

        let Some(message) = accumulator.finish() else {
            tracing::warn!(conversation_id = %self.conversation_id, "stream completed without output");
            return Ok(());
        };

        let WriteBack {
            cache,
            history,
            message_limit,
            ttl,
        } = &mut self.write_back;

        history.push(message);
        trim_history(history, *message_limit);
        cache.set(self.conversation_id, history, *ttl).await?;

        tracing::debug!(
            conversation_id = %self.conversation_id,
            messages = history.len(),
            "stored streamed conversation"
        );

        Ok(())
    }
}
