//! Shared commerce data model.
//!
//! Defines the entity types exchanged with the storefront server —
//! quotations, orders, payments, chat messages — plus the derived
//! `ChannelDescriptor` used for chat-channel resolution. Field renames
//! match the server's wire shapes (`_id`, camelCase keys).
//!
//! Status enums are closed sets and carry their own legal-transition
//! tables, so a status change that is not in the table cannot be
//! expressed without going through `can_transition_to`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Lifecycle status of a quotation (the customer's cart or priced request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    Cart,
    Requested,
    InProcess,
    Quoted,
    Approved,
    Rejected,
}

impl QuotationStatus {
    /// Legal-transition table. `Quoted -> InProcess` is the explicit admin
    /// revert; every other edge moves strictly forward.
    pub fn can_transition_to(self, next: QuotationStatus) -> bool {
        use QuotationStatus::*;
        matches!(
            (self, next),
            (Cart, Requested)
                | (Requested, InProcess)
                | (InProcess, Quoted)
                | (Quoted, Approved)
                | (Quoted, Rejected)
                | (Quoted, InProcess)
        )
    }

    /// Whether this status ends the quotation lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, QuotationStatus::Approved | QuotationStatus::Rejected)
    }

    /// Whether a quotation in this status is in active negotiation and
    /// therefore eligible to carry a chat channel.
    pub fn is_negotiating(self) -> bool {
        matches!(
            self,
            QuotationStatus::Requested | QuotationStatus::InProcess | QuotationStatus::Quoted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuotationStatus::Cart => "cart",
            QuotationStatus::Requested => "requested",
            QuotationStatus::InProcess => "in_process",
            QuotationStatus::Quoted => "quoted",
            QuotationStatus::Approved => "approved",
            QuotationStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a confirmed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProcess,
    InProduction,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Legal-transition table. Cancellation is reachable from any
    /// non-terminal state; completion only from production.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, InProcess)
                | (InProcess, InProduction)
                | (InProduction, Completed)
                | (Pending, Cancelled)
                | (InProcess, Cancelled)
                | (InProduction, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProcess => "in_process",
            OrderStatus::InProduction => "in_production",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Transfer,
    Cash,
    Other,
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// A single product/service line on a quotation or order.
///
/// `unit_price` stays `None` until an admin quotes the line; on a
/// promoted order it holds the agreed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(rename = "_id")]
    pub id: String,
    pub description: String,
    pub quantity: u32,
    #[serde(rename = "price", default)]
    pub unit_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}

impl LineItem {
    pub fn new(description: &str, quantity: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.to_string(),
            quantity,
            unit_price: None,
            admin_notes: None,
        }
    }

    /// Line subtotal: price × quantity, or 0 while unquoted.
    pub fn subtotal(&self) -> f64 {
        self.unit_price.unwrap_or(0.0) * f64::from(self.quantity)
    }
}

// ---------------------------------------------------------------------------
// Quotation
// ---------------------------------------------------------------------------

/// A customer's cart or submitted request for pricing.
///
/// Created implicitly on first cart mutation; becomes an immutable
/// historical record once the customer issues a decision. Never deleted,
/// only status-terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "customer")]
    pub customer_id: String,
    pub status: QuotationStatus,
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    /// Non-null only once status has reached `Quoted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_estimate: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    /// Fresh cart for a customer, before any submission.
    pub fn new_cart(customer_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            status: QuotationStatus::Cart,
            items: Vec::new(),
            admin_notes: None,
            total_estimate: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A confirmed, payable unit of work, created from an approved quotation
/// or directly by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "customer")]
    pub customer_id: String,
    pub status: OrderStatus,
    /// Quotation-like sub-status carried while the order still has an open
    /// negotiation attached (feeds the chat-channel resolver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiation_status: Option<QuotationStatus>,
    pub items: Vec<LineItem>,
    /// Always equals the sum of item values; recomputed, never trusted.
    pub total: f64,
    #[serde(default)]
    pub payments: Vec<Payment>,
    /// Source quotation when the order came from an approval.
    #[serde(rename = "quotation", default, skip_serializing_if = "Option::is_none")]
    pub quotation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_delivery_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

/// An append-only payment record on an order's ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// New payment record, starting in `Pending` until the gateway (or an
    /// admin) settles it.
    pub fn new(amount: f64, method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            method,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Chat message
// ---------------------------------------------------------------------------

/// A chat message on a commerce entity's channel.
///
/// `pending` and `send_attempts` are client-local bookkeeping for
/// optimistic sends and never cross the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: String,
    /// Entity id of the channel this message belongs to.
    #[serde(rename = "quotation")]
    pub channel_id: String,
    pub sender: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "sentAt")]
    pub sent_at: DateTime<Utc>,
    #[serde(skip)]
    pub pending: bool,
    #[serde(skip)]
    pub send_attempts: u32,
}

impl ChatMessage {
    /// Client-local optimistic entry with a temporary id. The temporary id
    /// never matches the server-assigned one; reconciliation goes by
    /// (sender, body, timestamp window) instead.
    pub fn optimistic(channel_id: &str, sender: &str, body: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel_id: channel_id.to_string(),
            sender: sender.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
            pending: true,
            send_attempts: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Channel descriptor
// ---------------------------------------------------------------------------

/// Which kind of commerce entity a chat channel is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEntityType {
    Quotation,
    Order,
}

/// Immutable view naming the single entity currently eligible for chat.
///
/// Derived by the channel resolver; never persisted. Consumers react to
/// value changes between resolutions, not to in-place mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub entity_type: ChannelEntityType,
    pub entity_id: String,
    /// Quotation-side status at resolution time.
    pub status: QuotationStatus,
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotation_transition_table() {
        use QuotationStatus::*;
        assert!(Cart.can_transition_to(Requested));
        assert!(Requested.can_transition_to(InProcess));
        assert!(InProcess.can_transition_to(Quoted));
        assert!(Quoted.can_transition_to(Approved));
        assert!(Quoted.can_transition_to(Rejected));
        // Explicit admin revert
        assert!(Quoted.can_transition_to(InProcess));

        // No skipping ahead, no moving backwards
        assert!(!Cart.can_transition_to(Quoted));
        assert!(!Cart.can_transition_to(Approved));
        assert!(!Requested.can_transition_to(Cart));
        assert!(!InProcess.can_transition_to(Requested));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Cart));
    }

    #[test]
    fn test_order_transition_table() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(InProcess));
        assert!(InProcess.can_transition_to(InProduction));
        assert!(InProduction.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InProcess.can_transition_to(Cancelled));
        assert!(InProduction.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(InProduction));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!InProcess.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(InProcess));
    }

    #[test]
    fn test_negotiating_statuses() {
        use QuotationStatus::*;
        assert!(Requested.is_negotiating());
        assert!(InProcess.is_negotiating());
        assert!(Quoted.is_negotiating());
        assert!(!Cart.is_negotiating());
        assert!(!Approved.is_negotiating());
        assert!(!Rejected.is_negotiating());
    }

    #[test]
    fn test_chat_message_wire_shape() {
        let json = serde_json::json!({
            "_id": "m1",
            "quotation": "q1",
            "sender": "cust-1",
            "message": "hello",
            "sentAt": "2025-03-01T12:00:00Z",
        });
        let msg: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.channel_id, "q1");
        assert_eq!(msg.body, "hello");
        // Client-only flags default off for server records
        assert!(!msg.pending);
        assert_eq!(msg.send_attempts, 0);
    }

    #[test]
    fn test_quotation_wire_roundtrip() {
        let mut q = Quotation::new_cart("cust-9");
        q.items.push(LineItem::new("Walnut sideboard", 1));
        let json = serde_json::to_value(&q).unwrap();
        assert!(json.get("_id").is_some());
        assert_eq!(json["customer"], "cust-9");
        assert_eq!(json["status"], "cart");
        // totalEstimate omitted entirely while null
        assert!(json.get("totalEstimate").is_none());

        let back: Quotation = serde_json::from_value(json).unwrap();
        assert_eq!(back.id, q.id);
        assert_eq!(back.items.len(), 1);
    }

    #[test]
    fn test_line_item_subtotal() {
        let mut item = LineItem::new("Oak chair", 4);
        assert_eq!(item.subtotal(), 0.0);
        item.unit_price = Some(150.0);
        assert_eq!(item.subtotal(), 600.0);
    }
}
