use shared::domain::{DeliveryStatus, MediaKind, Message, MessageId, Peer, UserId};

use crate::push::PushState;

/// An image staged for upload alongside (or instead of) text content.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub kind: MediaKind,
}

/// The conversation session for the active peer: the ordered timeline plus
/// the loading flag, the retrievable last error, and staged input. Exactly
/// one exists at a time; it is dropped wholesale when the peer changes.
#[derive(Debug)]
pub struct Conversation {
    pub(crate) peer: Peer,
    pub(crate) messages: Vec<Message>,
    pub(crate) loading: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) draft: String,
    pub(crate) staged_media: Option<MediaUpload>,
}

impl Conversation {
    pub(crate) fn new(peer: Peer) -> Self {
        Self {
            peer,
            messages: Vec::new(),
            loading: false,
            last_error: None,
            draft: String::new(),
            staged_media: None,
        }
    }

    /// Replaces the timeline with a freshly fetched history, sorted ascending
    /// by creation time. Optimistic entries not present in the fetched set are
    /// superseded.
    pub(crate) fn replace_history(&mut self, mut messages: Vec<Message>) {
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.messages = messages;
        self.last_error = None;
    }

    /// Optimistic entries go to the tail; call order is their order.
    pub(crate) fn append_optimistic(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Settles a provisional entry against the server-confirmed record.
    /// The entry is updated in place so it keeps its timeline position; if
    /// the provisional id is gone (a reload superseded it) the record is
    /// inserted in creation order instead. Never produces a duplicate.
    pub(crate) fn reconcile_provisional(&mut self, provisional_id: &MessageId, persisted: Message) {
        if self.messages.iter().any(|m| m.id == persisted.id) {
            self.messages.retain(|m| m.id != *provisional_id);
            return;
        }
        if let Some(slot) = self
            .messages
            .iter_mut()
            .find(|m| m.id == *provisional_id)
        {
            *slot = persisted;
            return;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= persisted.created_at);
        self.messages.insert(at, persisted);
    }

    /// Applies a seen receipt: every message addressed to `receiver_id`
    /// becomes seen and read. Idempotent; returns whether anything changed.
    pub(crate) fn apply_seen(&mut self, receiver_id: &UserId) -> bool {
        let mut changed = false;
        for message in &mut self.messages {
            if &message.receiver_id == receiver_id
                && (message.status != Some(DeliveryStatus::Seen) || !message.is_read)
            {
                message.status = Some(DeliveryStatus::Seen);
                message.is_read = true;
                changed = true;
            }
        }
        changed
    }

    pub(crate) fn clear_staged(&mut self) {
        self.draft.clear();
        self.staged_media = None;
    }
}

/// Read-only copy of the active conversation handed to the UI layer.
#[derive(Debug, Clone)]
pub struct ConversationSnapshot {
    pub peer: Peer,
    pub messages: Vec<Message>,
    pub loading: bool,
    pub last_error: Option<String>,
    pub draft: String,
    pub push_state: PushState,
}

#[cfg(test)]
#[path = "tests/conversation_tests.rs"]
mod tests;
