//! Quotation lifecycle operations.
//!
//! Implements the customer/admin state machine over a `Quotation`:
//! cart mutation, submission, admin acknowledgment, quoting with
//! server-side price recomputation, and the customer decision that
//! atomically promotes an approved quotation into an `Order`.
//!
//! Every operation validates first and mutates last, so a rejected
//! operation leaves the quotation exactly as it found it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CommerceError;
use crate::model::{LineItem, Order, Quotation, QuotationStatus};
use crate::order;

/// Tolerance for comparing a supplied total against the recomputed one.
/// Half a cent: enough to absorb floating-point noise, never a real
/// price difference.
pub const PRICE_TOLERANCE: f64 = 0.005;

// ---------------------------------------------------------------------------
// Quote payload
// ---------------------------------------------------------------------------

/// Per-item pricing supplied by an admin when quoting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItemPrice {
    #[serde(rename = "_id")]
    pub id: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}

/// Admin quote payload: the estimate plus optional per-item prices/notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub total_estimate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(default)]
    pub items: Vec<QuoteItemPrice>,
}

/// Customer decision on a quoted quotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteDecision {
    Approved,
    Rejected,
}

// ---------------------------------------------------------------------------
// Transition guard
// ---------------------------------------------------------------------------

/// Check the legal-transition table, producing the taxonomy error on a
/// violation.
fn guard_transition(
    quotation: &Quotation,
    next: QuotationStatus,
) -> Result<(), CommerceError> {
    if quotation.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(CommerceError::IllegalTransition {
            entity: "quotation",
            from: quotation.status.to_string(),
            attempted: next.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Cart mutation
// ---------------------------------------------------------------------------

/// Require the quotation to still be an open cart before item mutation.
fn guard_cart(quotation: &Quotation) -> Result<(), CommerceError> {
    if quotation.status == QuotationStatus::Cart {
        Ok(())
    } else {
        Err(CommerceError::IllegalTransition {
            entity: "quotation",
            from: quotation.status.to_string(),
            attempted: QuotationStatus::Cart.to_string(),
        })
    }
}

/// Add a line item to an open cart.
pub fn add_item(
    quotation: &mut Quotation,
    description: &str,
    quantity: u32,
) -> Result<String, CommerceError> {
    guard_cart(quotation)?;
    let item = LineItem::new(description, quantity);
    let item_id = item.id.clone();
    quotation.items.push(item);
    quotation.updated_at = Utc::now();
    Ok(item_id)
}

/// Change a cart line's quantity.
pub fn update_item_quantity(
    quotation: &mut Quotation,
    item_id: &str,
    quantity: u32,
) -> Result<(), CommerceError> {
    guard_cart(quotation)?;
    let item = quotation
        .items
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| CommerceError::Api(format!("cart item not found: {item_id}")))?;
    item.quantity = quantity;
    quotation.updated_at = Utc::now();
    Ok(())
}

/// Remove a line from an open cart.
pub fn remove_item(quotation: &mut Quotation, item_id: &str) -> Result<(), CommerceError> {
    guard_cart(quotation)?;
    let before = quotation.items.len();
    quotation.items.retain(|i| i.id != item_id);
    if quotation.items.len() == before {
        return Err(CommerceError::Api(format!("cart item not found: {item_id}")));
    }
    quotation.updated_at = Utc::now();
    Ok(())
}

// ---------------------------------------------------------------------------
// Lifecycle transitions
// ---------------------------------------------------------------------------

/// Customer submits the cart for pricing (`Cart -> Requested`).
///
/// Rejects an empty cart before touching any state.
pub fn submit(quotation: &mut Quotation) -> Result<(), CommerceError> {
    guard_transition(quotation, QuotationStatus::Requested)?;
    if quotation.items.is_empty() {
        return Err(CommerceError::EmptyCart);
    }

    quotation.status = QuotationStatus::Requested;
    quotation.updated_at = Utc::now();
    info!(
        quotation_id = %quotation.id,
        items = quotation.items.len(),
        "Quotation submitted"
    );
    Ok(())
}

/// Admin acknowledges the request (`Requested -> InProcess`). No side
/// effects beyond the audit timestamp.
pub fn acknowledge(quotation: &mut Quotation) -> Result<(), CommerceError> {
    guard_transition(quotation, QuotationStatus::InProcess)?;
    quotation.status = QuotationStatus::InProcess;
    quotation.updated_at = Utc::now();
    info!(quotation_id = %quotation.id, "Quotation acknowledged");
    Ok(())
}

/// Admin quotes the request (`InProcess -> Quoted`).
///
/// Per-item prices from the request are applied, unpriced items default
/// to 0, and the total is recomputed from item prices — the supplied
/// estimate is verified against it, never trusted. Any violation leaves
/// the quotation untouched.
pub fn apply_quote(quotation: &mut Quotation, quote: &QuoteRequest) -> Result<(), CommerceError> {
    guard_transition(quotation, QuotationStatus::Quoted)?;

    // Resolve the would-be price of every line before mutating anything.
    let mut priced: Vec<(f64, Option<String>)> = Vec::with_capacity(quotation.items.len());
    for item in &quotation.items {
        let supplied = quote.items.iter().find(|p| p.id == item.id);
        let price = supplied
            .map(|p| p.price)
            .or(item.unit_price)
            .unwrap_or(0.0);
        if price < 0.0 {
            return Err(CommerceError::NegativePrice {
                item: item.description.clone(),
            });
        }
        priced.push((price, supplied.and_then(|p| p.admin_notes.clone())));
    }

    let computed: f64 = priced
        .iter()
        .zip(&quotation.items)
        .map(|((price, _), item)| price * f64::from(item.quantity))
        .sum();

    if (computed - quote.total_estimate).abs() > PRICE_TOLERANCE {
        warn!(
            quotation_id = %quotation.id,
            supplied = quote.total_estimate,
            computed,
            "Quote rejected: supplied estimate disagrees with recomputed total"
        );
        return Err(CommerceError::PriceIntegrity {
            supplied: quote.total_estimate,
            computed,
        });
    }

    // All checks passed — commit.
    for (item, (price, notes)) in quotation.items.iter_mut().zip(priced) {
        item.unit_price = Some(price);
        if notes.is_some() {
            item.admin_notes = notes;
        }
    }
    quotation.total_estimate = Some(computed);
    if quote.admin_notes.is_some() {
        quotation.admin_notes = quote.admin_notes.clone();
    }
    quotation.status = QuotationStatus::Quoted;
    quotation.updated_at = Utc::now();
    info!(
        quotation_id = %quotation.id,
        total = computed,
        "Quotation quoted"
    );
    Ok(())
}

/// Explicit admin revert (`Quoted -> InProcess`), e.g. to re-price.
///
/// Clears the estimate so it is only ever non-null at `Quoted` or later.
pub fn revert_to_in_process(quotation: &mut Quotation) -> Result<(), CommerceError> {
    guard_transition(quotation, QuotationStatus::InProcess)?;
    quotation.status = QuotationStatus::InProcess;
    quotation.total_estimate = None;
    quotation.updated_at = Utc::now();
    info!(quotation_id = %quotation.id, "Quotation reverted to in_process");
    Ok(())
}

/// Customer decision (`Quoted -> Approved | Rejected`).
///
/// Approval promotes the quotation into an `Order` as one atomic step:
/// the order is constructed first, and only if that succeeds does the
/// quotation leave `Quoted`. Returns the new order on approval.
pub fn decide(
    quotation: &mut Quotation,
    decision: QuoteDecision,
) -> Result<Option<Order>, CommerceError> {
    match decision {
        QuoteDecision::Rejected => {
            guard_transition(quotation, QuotationStatus::Rejected)?;
            quotation.status = QuotationStatus::Rejected;
            quotation.updated_at = Utc::now();
            info!(quotation_id = %quotation.id, "Quotation rejected by customer");
            Ok(None)
        }
        QuoteDecision::Approved => {
            guard_transition(quotation, QuotationStatus::Approved)?;
            // Promote first; a failed promotion must leave the quotation
            // in Quoted.
            let new_order = order::promote_from_quotation(quotation)?;
            quotation.status = QuotationStatus::Approved;
            quotation.updated_at = Utc::now();
            info!(
                quotation_id = %quotation.id,
                order_id = %new_order.id,
                total = new_order.total,
                "Quotation approved and promoted to order"
            );
            Ok(Some(new_order))
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
