//! Conversation management that does not call the service

use colloquy_core::{ConversationId, Message, resolve_conversation_id};

use crate::builder::require_text;
use crate::client::ChatClient;
use crate::error::{ChatError, Result};
use crate::history::normalize_system;

impl ChatClient {
    /// Start (or restart) a conversation with a system message
    ///
    /// Any existing history for the id is replaced. A nil id starts a new
    /// conversation; the id used is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for an empty message, or a cache
    /// error
    pub async fn setup(&self, conversation_id: ConversationId, system_message: &str) -> Result<ConversationId> {
        let system_message = require_text(system_message, "system message")?;
        let id = resolve_conversation_id(conversation_id);

        self.store(id, vec![Message::system(system_message)]).await?;
        Ok(id)
    }

    /// Append the result of a legacy function call
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for empty arguments and
    /// [`ChatError::ConversationState`] when the conversation does not
    /// exist
    pub async fn add_function_response(
        &self,
        conversation_id: ConversationId,
        function_name: &str,
        content: &str,
    ) -> Result<()> {
        let function_name = require_text(function_name, "function name")?;
        let content = require_text(content, "function response")?;

        let mut history = self.existing_history(conversation_id).await?;
        history.push(Message::function(function_name, content));

        self.store(conversation_id, history).await
    }

    /// Append the result of a tool call
    ///
    /// # Errors
    ///
    /// Same as [`ChatClient::add_function_response`]
    pub async fn add_tool_response(
        &self,
        conversation_id: ConversationId,
        tool_call_id: &str,
        function_name: &str,
        content: &str,
    ) -> Result<()> {
        let tool_call_id = require_text(tool_call_id, "tool call id")?;
        let function_name = require_text(function_name, "function name")?;
        let content = require_text(content, "tool response")?;

        let mut history = self.existing_history(conversation_id).await?;
        history.push(Message::tool(tool_call_id, function_name, content));

        self.store(conversation_id, history).await
    }

    /// Record a question and answer without calling the service
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Validation`] for a nil id or empty text
    pub async fn add_interaction(&self, conversation_id: ConversationId, question: &str, answer: &str) -> Result<()> {
        if conversation_id.is_nil() {
            return Err(ChatError::Validation("conversation id must not be nil".to_owned()));
        }
        let question = require_text(question, "question")?;
        let answer = require_text(answer, "answer")?;

        let mut history = self.cache().get(conversation_id).await?.unwrap_or_default();
        history.push(Message::user(question));
        history.push(Message::assistant(answer));

        self.store(conversation_id, history).await
    }

    /// Replace or extend a conversation with the given messages
    ///
    /// At most one system message is kept and it is moved first; the last
    /// one supplied wins over an existing one. A nil id starts a new
    /// conversation; the id used is returned.
    ///
    /// # Errors
    ///
    /// Returns a cache error
    pub async fn load_conversation(
        &self,
        conversation_id: ConversationId,
        messages: Vec<Message>,
        replace_history: bool,
    ) -> Result<ConversationId> {
        let id = resolve_conversation_id(conversation_id);

        let combined = if replace_history {
            messages
        } else {
            let mut existing = self.cache().get(id).await?.unwrap_or_default();
            existing.extend(messages);
            existing
        };

        self.store(id, normalize_system(combined)).await?;
        Ok(id)
    }

    /// Stored messages, empty when the conversation does not exist
    ///
    /// # Errors
    ///
    /// Returns a cache error
    pub async fn get_conversation(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        Ok(self.cache().get(conversation_id).await?.unwrap_or_default())
    }

    /// # Errors
    ///
    /// Returns a cache error
    pub async fn conversation_exists(&self, conversation_id: ConversationId) -> Result<bool> {
        Ok(self.cache().exists(conversation_id).await?)
    }

    /// Forget a conversation
    ///
    /// With `preserve_setup` the system message, if any, is kept and the
    /// rest of the history dropped.
    ///
    /// # Errors
    ///
    /// Returns a cache error
    pub async fn delete_conversation(&self, conversation_id: ConversationId, preserve_setup: bool) -> Result<()> {
        if preserve_setup {
            let system = self
                .cache()
                .get(conversation_id)
                .await?
                .and_then(|messages| messages.into_iter().next())
                .filter(Message::is_system);

            if let Some(system) = system {
                return self.store(conversation_id, vec![system]).await;
            }
        }

        self.cache().remove(conversation_id).await?;
        tracing::debug!(conversation_id = %conversation_id, preserve_setup, "deleted conversation");
        Ok(())
    }

    async fn existing_history(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        self.cache().get(conversation_id).await?.ok_or_else(|| {
            ChatError::ConversationState(format!("conversation {conversation_id} has no history"))
        })
    }
}
