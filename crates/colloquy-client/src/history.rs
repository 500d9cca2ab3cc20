//! Bounded conversation history

use colloquy_core::Message;

/// Keep at most `limit` non-system messages, dropping the oldest
///
/// A leading system message is never counted or removed.
pub fn trim_history(messages: &mut Vec<Message>, limit: usize) {
    let start = usize::from(messages.first().is_some_and(Message::is_system));
    let count = messages.len() - start;

    if count > limit {
        messages.drain(start..start + (count - limit));
    }
}

/// Reduce system messages to one, placed first
///
/// The last system message in `messages` wins; everything else keeps its
/// relative order.
pub fn normalize_system(messages: Vec<Message>) -> Vec<Message> {
    let (mut system, rest): (Vec<_>, Vec<_>) = messages.into_iter().partition(Message::is_system);

    match system.pop() {
        Some(last) => std::iter::once(last).chain(rest).collect(),
        None => rest,
    }
}
