//! Real-time message synchronizer.
//!
//! One `ChatSession` per customer session. It owns the transport, tracks
//! which room is joined, and keeps the message store consistent with the
//! live stream: stale events from a just-left room are discarded the
//! moment the channel switches, without waiting for the leave signal to
//! reach the server.

use tracing::{debug, info, warn};

use crate::chat::store::MessageStore;
use crate::chat::transport::{ChatTransport, ClientEvent, OutboundMessage, ServerEvent};
use crate::error::ChatError;
use crate::model::{ChannelDescriptor, ChatMessage};

/// Bound on explicit re-sends of a single pending message. There is no
/// automatic retry: a failed send stays pending until the user retries
/// or a confirmation arrives.
pub const MAX_SEND_ATTEMPTS: u32 = 5;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Connection state of a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Joined the room for this entity id.
    Joined(String),
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Per-session chat synchronizer.
pub struct ChatSession {
    transport: Box<dyn ChatTransport>,
    state: SessionState,
    /// Channel selected by the resolver; joined lazily once connected.
    channel: Option<ChannelDescriptor>,
    store: MessageStore,
    sender_id: String,
}

impl ChatSession {
    pub fn new(transport: Box<dyn ChatTransport>, sender_id: &str) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            channel: None,
            store: MessageStore::new(),
            sender_id: sender_id.to_string(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn channel(&self) -> Option<&ChannelDescriptor> {
        self.channel.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    /// Id of the currently joined room, if any.
    fn joined_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Joined(id) => Some(id.as_str()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Connect the transport and join the selected channel, if any.
    pub fn connect(&mut self) -> Result<(), ChatError> {
        self.state = SessionState::Connecting;
        self.transport.connect().map_err(|e| {
            self.state = SessionState::Disconnected;
            e
        })?;

        if let Some(channel) = self.channel.clone() {
            self.join(&channel.entity_id)?;
        } else {
            self.state = SessionState::Disconnected;
        }
        Ok(())
    }

    /// Re-establish after a lost connection: reconnect the transport and
    /// re-join the selected channel. History is NOT replayed over the
    /// socket — the caller re-fetches it via REST and hands it to
    /// [`ChatSession::load_history`], since the live stream only carries
    /// messages emitted after the join.
    pub fn reconnect(&mut self) -> Result<(), ChatError> {
        info!("Chat transport reconnecting");
        self.connect()
    }

    fn join(&mut self, entity_id: &str) -> Result<(), ChatError> {
        self.transport.emit(&ClientEvent::Join {
            entity_id: entity_id.to_string(),
        })?;
        self.state = SessionState::Joined(entity_id.to_string());
        info!(entity_id = %entity_id, "Chat room joined");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Channel selection
    // -----------------------------------------------------------------------

    /// React to a resolver decision.
    ///
    /// On an entity change: leave the old room strictly before joining
    /// the new one (never two rooms at once), and reset the store — the
    /// caller follows up with a REST history fetch. The local switch is
    /// unconditional and synchronous: inbound events for the old room
    /// are rejected from this call onward even if the leave signal never
    /// makes it out. Returns whether the active entity changed.
    pub fn set_channel(&mut self, next: Option<ChannelDescriptor>) -> bool {
        let same_entity = match (&self.channel, &next) {
            (Some(a), Some(b)) => a.entity_id == b.entity_id && a.entity_type == b.entity_type,
            (None, None) => true,
            _ => false,
        };
        if same_entity {
            // Status-only refresh; room membership is untouched.
            self.channel = next;
            return false;
        }

        if let Some(old_id) = self.joined_id().map(str::to_string) {
            if let Err(e) = self.transport.emit(&ClientEvent::Leave {
                entity_id: old_id.clone(),
            }) {
                warn!(entity_id = %old_id, error = %e, "Leave signal failed; switching anyway");
            }
            self.state = SessionState::Disconnected;
            info!(entity_id = %old_id, "Chat room left");
        }

        self.store.clear();
        self.channel = next;

        if let Some(channel) = self.channel.clone() {
            if self.transport.is_connected() {
                if let Err(e) = self.join(&channel.entity_id) {
                    // Stay disconnected; the reconnect path re-joins.
                    warn!(entity_id = %channel.entity_id, error = %e, "Join failed after switch");
                }
            }
        }
        true
    }

    /// Merge a REST-fetched history for the selected channel.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) {
        let Some(channel) = &self.channel else {
            return;
        };
        let relevant: Vec<ChatMessage> = history
            .into_iter()
            .filter(|m| m.channel_id == channel.entity_id)
            .collect();
        self.store.merge_history(relevant);
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Drain and process pending transport events. A lost connection
    /// flips the session to `Disconnected` and surfaces the error so the
    /// owner can reconnect and re-fetch history.
    pub fn pump(&mut self) -> Result<usize, ChatError> {
        let events = match self.transport.poll() {
            Ok(events) => events,
            Err(ChatError::ConnectionLost(reason)) => {
                warn!(reason = %reason, "Chat connection lost");
                self.state = SessionState::Disconnected;
                return Err(ChatError::ConnectionLost(reason));
            }
            Err(e) => return Err(e),
        };

        let mut processed = 0;
        for event in events {
            self.handle_server_event(event);
            processed += 1;
        }
        Ok(processed)
    }

    /// Route one server event into the store.
    pub fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Message(message) => {
                let Some(joined) = self.joined_id() else {
                    debug!(message_id = %message.id, "Message dropped: no room joined");
                    return;
                };
                if message.channel_id != joined {
                    // Late event from a room we already left.
                    debug!(
                        message_id = %message.id,
                        channel_id = %message.channel_id,
                        joined = %joined,
                        "Message dropped: stale channel"
                    );
                    return;
                }
                self.store.insert_confirmed(message);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Send a message on the joined channel.
    ///
    /// The optimistic entry is appended to the store before the emit, so
    /// the UI sees it immediately. An emit failure leaves it pending —
    /// confirmation or an explicit retry resolves it later.
    pub fn send(&mut self, body: &str) -> Result<ChatMessage, ChatError> {
        let joined = self
            .joined_id()
            .map(str::to_string)
            .ok_or(ChatError::NotJoined)?;

        let message = ChatMessage::optimistic(&joined, &self.sender_id, body);
        self.store.insert_optimistic(message.clone());
        self.store.record_send_attempt(&message.id);

        let event = ClientEvent::Message {
            entity_id: joined,
            message: OutboundMessage {
                sender: message.sender.clone(),
                body: message.body.clone(),
                sent_at: message.sent_at,
            },
        };
        if let Err(e) = self.transport.emit(&event) {
            warn!(
                temp_id = %message.id,
                error = %e,
                "Message send failed; entry stays pending until retried"
            );
        }
        Ok(message)
    }

    /// Explicitly re-send one pending message, bounded by
    /// [`MAX_SEND_ATTEMPTS`].
    pub fn retry_message(&mut self, temp_id: &str) -> Result<(), ChatError> {
        let joined = self
            .joined_id()
            .map(str::to_string)
            .ok_or(ChatError::NotJoined)?;

        let message = self
            .store
            .get(temp_id)
            .filter(|m| m.pending)
            .cloned()
            .ok_or_else(|| ChatError::Transport(format!("no pending message {temp_id}")))?;

        if message.send_attempts >= MAX_SEND_ATTEMPTS {
            return Err(ChatError::SendRetryExhausted {
                attempts: message.send_attempts,
            });
        }

        self.store.record_send_attempt(temp_id);
        self.transport.emit(&ClientEvent::Message {
            entity_id: joined,
            message: OutboundMessage {
                sender: message.sender.clone(),
                body: message.body.clone(),
                sent_at: message.sent_at,
            },
        })
    }

    /// Re-send every retryable pending message; returns how many were
    /// re-emitted. Exhausted messages are skipped (and logged).
    pub fn retry_pending(&mut self) -> usize {
        let mut retried = 0;
        for id in self.store.pending_ids() {
            match self.retry_message(&id) {
                Ok(()) => retried += 1,
                Err(ChatError::SendRetryExhausted { attempts }) => {
                    warn!(temp_id = %id, attempts, "Pending message out of retries");
                }
                Err(e) => {
                    warn!(temp_id = %id, error = %e, "Pending message retry failed");
                }
            }
        }
        retried
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::transport::{LoopbackHandle, LoopbackTransport};
    use crate::model::{ChannelEntityType, QuotationStatus};
    use chrono::Utc;

    fn descriptor(id: &str) -> ChannelDescriptor {
        ChannelDescriptor {
            entity_type: ChannelEntityType::Quotation,
            entity_id: id.to_string(),
            status: QuotationStatus::Requested,
        }
    }

    fn server_message(id: &str, channel: &str, sender: &str, body: &str) -> ServerEvent {
        ServerEvent::Message(ChatMessage {
            id: id.to_string(),
            channel_id: channel.to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
            pending: false,
            send_attempts: 0,
        })
    }

    fn joined_session(channel_id: &str) -> (ChatSession, LoopbackHandle) {
        let (transport, handle) = LoopbackTransport::pair();
        let mut session = ChatSession::new(Box::new(transport), "cust-1");
        session.set_channel(Some(descriptor(channel_id)));
        session.connect().unwrap();
        (session, handle)
    }

    #[test]
    fn test_connect_joins_selected_channel() {
        let (session, handle) = joined_session("q-1");
        assert_eq!(session.state(), &SessionState::Joined("q-1".into()));
        assert_eq!(
            handle.emitted(),
            vec![ClientEvent::Join {
                entity_id: "q-1".into()
            }]
        );
    }

    #[test]
    fn test_channel_switch_leaves_before_join() {
        let (mut session, handle) = joined_session("q-1");
        let switched = session.set_channel(Some(descriptor("ord-7")));
        assert!(switched);

        let emitted = handle.emitted();
        assert_eq!(
            emitted,
            vec![
                ClientEvent::Join {
                    entity_id: "q-1".into()
                },
                ClientEvent::Leave {
                    entity_id: "q-1".into()
                },
                ClientEvent::Join {
                    entity_id: "ord-7".into()
                },
            ]
        );
        assert_eq!(session.state(), &SessionState::Joined("ord-7".into()));
    }

    #[test]
    fn test_stale_events_dropped_after_switch() {
        let (mut session, handle) = joined_session("q-1");
        session.set_channel(Some(descriptor("ord-7")));

        // A message for the old room arrives after the switch — it must
        // not reach the store even though the leave only just went out.
        handle.push_server_event(server_message("m-1", "q-1", "admin", "late"));
        handle.push_server_event(server_message("m-2", "ord-7", "admin", "current"));
        session.pump().unwrap();

        let bodies: Vec<&str> = session.messages().iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["current"]);
    }

    #[test]
    fn test_status_only_change_keeps_room() {
        let (mut session, handle) = joined_session("q-1");
        let mut refreshed = descriptor("q-1");
        refreshed.status = QuotationStatus::Quoted;
        let switched = session.set_channel(Some(refreshed));
        assert!(!switched);
        // Only the original join was emitted.
        assert_eq!(handle.emitted().len(), 1);
    }

    #[test]
    fn test_deselect_leaves_room() {
        let (mut session, handle) = joined_session("q-1");
        session.set_channel(None);
        assert_eq!(session.state(), &SessionState::Disconnected);
        assert!(matches!(
            handle.emitted().last(),
            Some(ClientEvent::Leave { .. })
        ));
    }

    #[test]
    fn test_send_appends_optimistic_then_emits() {
        let (mut session, handle) = joined_session("q-1");
        let sent = session.send("hello").unwrap();
        assert!(sent.pending);
        assert_eq!(session.messages().len(), 1);

        let emitted = handle.emitted();
        match emitted.last().unwrap() {
            ClientEvent::Message { entity_id, message } => {
                assert_eq!(entity_id, "q-1");
                assert_eq!(message.body, "hello");
            }
            other => panic!("expected chat:message, got {other:?}"),
        }
    }

    #[test]
    fn test_send_confirmation_dedups() {
        let (mut session, handle) = joined_session("q-1");
        session.send("hello").unwrap();

        // Server broadcast of the same message with its real id.
        handle.push_server_event(server_message("srv-1", "q-1", "cust-1", "hello"));
        session.pump().unwrap();

        assert_eq!(session.messages().len(), 1);
        let survivor = &session.messages()[0];
        assert_eq!(survivor.id, "srv-1");
        assert!(!survivor.pending);
    }

    #[test]
    fn test_send_requires_joined_room() {
        let (transport, _handle) = LoopbackTransport::pair();
        let mut session = ChatSession::new(Box::new(transport), "cust-1");
        assert_eq!(session.send("hi").unwrap_err(), ChatError::NotJoined);
    }

    #[test]
    fn test_retry_is_bounded() {
        let (mut session, _handle) = joined_session("q-1");
        let sent = session.send("flaky").unwrap();

        for _ in 1..MAX_SEND_ATTEMPTS {
            session.retry_message(&sent.id).unwrap();
        }
        let err = session.retry_message(&sent.id).unwrap_err();
        assert_eq!(
            err,
            ChatError::SendRetryExhausted {
                attempts: MAX_SEND_ATTEMPTS
            }
        );
    }

    #[test]
    fn test_connection_lost_then_rejoin() {
        let (mut session, handle) = joined_session("q-1");
        handle.drop_connection();
        assert!(matches!(
            session.pump().unwrap_err(),
            ChatError::ConnectionLost(_)
        ));
        assert_eq!(session.state(), &SessionState::Disconnected);

        session.reconnect().unwrap();
        assert_eq!(session.state(), &SessionState::Joined("q-1".into()));
        assert!(matches!(
            handle.emitted().last(),
            Some(ClientEvent::Join { .. })
        ));
    }

    #[test]
    fn test_history_filtered_to_selected_channel() {
        let (mut session, _handle) = joined_session("q-1");
        let mine = ChatMessage {
            id: "m-1".into(),
            channel_id: "q-1".into(),
            sender: "admin".into(),
            body: "for you".into(),
            sent_at: Utc::now(),
            pending: false,
            send_attempts: 0,
        };
        let mut foreign = mine.clone();
        foreign.id = "m-2".into();
        foreign.channel_id = "q-other".into();

        session.load_history(vec![mine, foreign]);
        assert_eq!(session.messages().len(), 1);
    }
}
