//! Error taxonomy for the commerce core.
//!
//! Commerce (state machine, ledger, REST) failures and chat/transport
//! failures are separate enums; both surface as rejected operations with
//! a human-readable reason and never leave an entity partially
//! transitioned.

use thiserror::Error;

/// Commerce state-machine and API errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommerceError {
    #[error("illegal transition: {entity} cannot move from '{from}' to '{attempted}'")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        attempted: String,
    },
    #[error("price integrity violation: supplied total {supplied:.2} does not match computed total {computed:.2}")]
    PriceIntegrity { supplied: f64, computed: f64 },
    #[error("price integrity violation: line item '{item}' has a negative price")]
    NegativePrice { item: String },
    #[error("cannot submit an empty cart")]
    EmptyCart,
    #[error("payment amount must be positive, got {0:.2}")]
    InvalidAmount(f64),
    #[error("payment not found: {0}")]
    PaymentNotFound(String),
    #[error("storefront API error: {0}")]
    Api(String),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Real-time chat channel errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    #[error("no chat channel is currently joined")]
    NotJoined,
    #[error("channel resolution conflict: {0}")]
    ChannelResolutionConflict(String),
    #[error("chat transport error: {0}")]
    Transport(String),
    #[error("message send retries exhausted after {attempts} attempts")]
    SendRetryExhausted { attempts: u32 },
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_transition_names_both_states() {
        let err = CommerceError::IllegalTransition {
            entity: "quotation",
            from: "cart".into(),
            attempted: "quoted".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cart"));
        assert!(msg.contains("quoted"));
    }

    #[test]
    fn test_chat_error_converts_to_commerce_error() {
        let err: CommerceError = ChatError::NotJoined.into();
        assert!(matches!(err, CommerceError::Chat(ChatError::NotJoined)));
    }
}
