//! Client-local message store.
//!
//! Ordered read model of the active channel's messages. Holds persisted
//! history, live inbound messages, and optimistic local entries, and
//! reconciles server confirmations against their optimistic twins so
//! exactly one copy survives.

use chrono::Duration;
use tracing::debug;

use crate::model::ChatMessage;

/// How far apart an optimistic entry and its server confirmation may be
/// timestamped and still be treated as the same message. The temporary
/// client id never matches the server id, so correlation goes by
/// (sender, body, time window).
pub const PENDING_MATCH_WINDOW_SECS: i64 = 30;

/// Ordered message list for one chat channel.
#[derive(Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop everything (channel switch).
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Whether a confirmed message matches a not-yet-confirmed local
    /// entry emitted for the same request.
    fn matches_pending(pending: &ChatMessage, confirmed: &ChatMessage) -> bool {
        pending.pending
            && pending.sender == confirmed.sender
            && pending.body == confirmed.body
            && (pending.sent_at - confirmed.sent_at).abs()
                <= Duration::seconds(PENDING_MATCH_WINDOW_SECS)
    }

    /// Insert a server-confirmed message.
    ///
    /// An id collision is dropped (duplicate delivery). A confirmation
    /// matching an optimistic entry replaces it in place — the entry
    /// keeps its position, gains the server id, and stops being pending.
    /// Returns whether the store changed.
    pub fn insert_confirmed(&mut self, message: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == message.id) {
            debug!(message_id = %message.id, "Duplicate message dropped");
            return false;
        }

        if let Some(local) = self
            .messages
            .iter_mut()
            .find(|m| Self::matches_pending(m, &message))
        {
            debug!(
                temp_id = %local.id,
                message_id = %message.id,
                "Optimistic message confirmed"
            );
            *local = message;
            return true;
        }

        self.messages.push(message);
        true
    }

    /// Append an optimistic local entry.
    pub fn insert_optimistic(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Merge a freshly-fetched history into the store.
    ///
    /// Each history record goes through confirmation reconciliation (it
    /// may confirm a pending entry), then the whole list is sorted by
    /// timestamp — the only client-side reordering ever performed.
    pub fn merge_history(&mut self, history: Vec<ChatMessage>) {
        for message in history {
            self.insert_confirmed(message);
        }
        self.messages.sort_by_key(|m| m.sent_at);
    }

    /// Ids of entries still awaiting confirmation.
    pub fn pending_ids(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.pending)
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Bump the send-attempt counter of a pending entry, returning the
    /// new count.
    pub fn record_send_attempt(&mut self, id: &str) -> Option<u32> {
        let message = self.messages.iter_mut().find(|m| m.id == id && m.pending)?;
        message.send_attempts += 1;
        Some(message.send_attempts)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
