use uuid::Uuid;

/// Opaque 128-bit conversation identifier
pub type ConversationId = Uuid;

/// Map the nil identifier to a freshly generated one
///
/// Callers pass `Uuid::nil()` to start a new conversation.
pub fn resolve_conversation_id(id: ConversationId) -> ConversationId {
    if id.is_nil() { Uuid::new_v4() } else { id }
}
