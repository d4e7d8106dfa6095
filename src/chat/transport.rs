//! Transport layer for the real-time chat channel.
//!
//! Defines the `ChatTransport` trait plus the wire event types exchanged
//! with the chat server. The network implementation lives with the
//! embedding application; the in-memory `LoopbackTransport` here is the
//! reference implementation and the test double.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChatError;
use crate::model::ChatMessage;

// ---------------------------------------------------------------------------
// Transport state
// ---------------------------------------------------------------------------

/// Connection state of a chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

// ---------------------------------------------------------------------------
// Wire events
// ---------------------------------------------------------------------------

/// Body of an outbound `chat:message` emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub sender: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "sentAt")]
    pub sent_at: chrono::DateTime<chrono::Utc>,
}

/// Events the client emits to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "chat:join")]
    Join {
        #[serde(rename = "entityId")]
        entity_id: String,
    },
    #[serde(rename = "chat:leave")]
    Leave {
        #[serde(rename = "entityId")]
        entity_id: String,
    },
    #[serde(rename = "chat:message")]
    Message {
        #[serde(rename = "entityId")]
        entity_id: String,
        message: OutboundMessage,
    },
}

/// Events the server pushes to joined participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    #[serde(rename = "chat:message")]
    Message(ChatMessage),
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Abstract bidirectional transport for chat events.
pub trait ChatTransport: Send {
    /// Establish the connection.
    fn connect(&mut self) -> Result<(), ChatError>;

    /// Tear down the connection.
    fn disconnect(&mut self) -> Result<(), ChatError>;

    /// Emit a client event to the server.
    fn emit(&mut self, event: &ClientEvent) -> Result<(), ChatError>;

    /// Drain any server events received since the last poll.
    fn poll(&mut self) -> Result<Vec<ServerEvent>, ChatError>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Current transport state.
    fn state(&self) -> TransportState;

    /// Human-readable description of the connection target.
    fn description(&self) -> String;
}

// ---------------------------------------------------------------------------
// Loopback transport
// ---------------------------------------------------------------------------

/// Shared side of a loopback pair: what the client emitted, what the
/// "server" wants delivered, and a pending connection-drop signal.
#[derive(Default)]
struct LoopbackShared {
    emitted: Vec<ClientEvent>,
    inbox: VecDeque<ServerEvent>,
    drop_pending: bool,
}

/// Handle held by the test/server side of a loopback transport.
#[derive(Clone, Default)]
pub struct LoopbackHandle {
    shared: Arc<Mutex<LoopbackShared>>,
}

impl LoopbackHandle {
    /// Queue a server event for the next client poll.
    pub fn push_server_event(&self, event: ServerEvent) {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .inbox
            .push_back(event);
    }

    /// Everything the client has emitted so far, in order.
    pub fn emitted(&self) -> Vec<ClientEvent> {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .emitted
            .clone()
    }

    /// Make the next client poll fail with `ConnectionLost`.
    pub fn drop_connection(&self) {
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drop_pending = true;
    }
}

/// In-memory transport: events emitted by the client land in a shared
/// log, and server events queued on the handle are delivered on poll.
pub struct LoopbackTransport {
    shared: Arc<Mutex<LoopbackShared>>,
    state: TransportState,
}

impl LoopbackTransport {
    /// Create a connected pair: the transport for the client side and a
    /// handle for the server/test side.
    pub fn pair() -> (Self, LoopbackHandle) {
        let handle = LoopbackHandle::default();
        let transport = Self {
            shared: handle.shared.clone(),
            state: TransportState::Disconnected,
        };
        (transport, handle)
    }
}

impl ChatTransport for LoopbackTransport {
    fn connect(&mut self) -> Result<(), ChatError> {
        self.state = TransportState::Connected;
        debug!("loopback transport connected");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ChatError> {
        self.state = TransportState::Disconnected;
        Ok(())
    }

    fn emit(&mut self, event: &ClientEvent) -> Result<(), ChatError> {
        if self.state != TransportState::Connected {
            return Err(ChatError::Transport("loopback not connected".into()));
        }
        self.shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .emitted
            .push(event.clone());
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<ServerEvent>, ChatError> {
        if self.state != TransportState::Connected {
            return Err(ChatError::Transport("loopback not connected".into()));
        }
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if shared.drop_pending {
            shared.drop_pending = false;
            drop(shared);
            self.state = TransportState::Error;
            return Err(ChatError::ConnectionLost("loopback dropped".into()));
        }
        Ok(shared.inbox.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn description(&self) -> String {
        "Loopback".to_string()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_client_event_wire_shape() {
        let join = ClientEvent::Join {
            entity_id: "q-1".into(),
        };
        let json = serde_json::to_value(&join).unwrap();
        assert_eq!(json["event"], "chat:join");
        assert_eq!(json["entityId"], "q-1");

        let msg = ClientEvent::Message {
            entity_id: "q-1".into(),
            message: OutboundMessage {
                sender: "cust-1".into(),
                body: "hello".into(),
                sent_at: Utc::now(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "chat:message");
        assert_eq!(json["message"]["message"], "hello");
    }

    #[test]
    fn test_server_event_parses_message() {
        let json = serde_json::json!({
            "event": "chat:message",
            "_id": "m-1",
            "quotation": "q-1",
            "sender": "admin-1",
            "message": "your quote is ready",
            "sentAt": "2025-03-01T10:00:00Z",
        });
        let ev: ServerEvent = serde_json::from_value(json).unwrap();
        let ServerEvent::Message(msg) = ev;
        assert_eq!(msg.id, "m-1");
        assert_eq!(msg.channel_id, "q-1");
    }

    #[test]
    fn test_loopback_emit_requires_connection() {
        let (mut t, _handle) = LoopbackTransport::pair();
        let join = ClientEvent::Join {
            entity_id: "q-1".into(),
        };
        assert!(t.emit(&join).is_err());
        t.connect().unwrap();
        assert!(t.emit(&join).is_ok());
    }

    #[test]
    fn test_loopback_delivers_queued_events() {
        let (mut t, handle) = LoopbackTransport::pair();
        t.connect().unwrap();
        handle.push_server_event(ServerEvent::Message(ChatMessage::optimistic(
            "q-1", "admin", "hi",
        )));
        let events = t.poll().unwrap();
        assert_eq!(events.len(), 1);
        assert!(t.poll().unwrap().is_empty());
    }

    #[test]
    fn test_loopback_drop_surfaces_connection_lost() {
        let (mut t, handle) = LoopbackTransport::pair();
        t.connect().unwrap();
        handle.drop_connection();
        let err = t.poll().unwrap_err();
        assert!(matches!(err, ChatError::ConnectionLost(_)));
        assert_eq!(t.state(), TransportState::Error);
    }
}
