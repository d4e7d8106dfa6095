//! Real-time chat subsystem.
//!
//! Provides the transport abstraction for the bidirectional chat
//! channel, the client-local message store, and the per-session
//! synchronizer that ties channel selection to room membership.

pub mod store;
pub mod sync;
pub mod transport;

pub use store::MessageStore;
pub use sync::{ChatSession, SessionState};
pub use transport::{
    ChatTransport, ClientEvent, LoopbackHandle, LoopbackTransport, OutboundMessage, ServerEvent,
    TransportState,
};
