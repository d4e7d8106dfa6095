//! Order lifecycle operations.
//!
//! Orders come from an approved quotation or direct admin creation. The
//! total is always recomputed from line-item values — caller-supplied
//! totals are never trusted. The `InProcess -> InProduction` transition
//! is owned by the payment ledger gate and re-evaluated after every
//! payment state change.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::CommerceError;
use crate::ledger::{self, LedgerEvaluation};
use crate::model::{LineItem, Order, OrderStatus, Quotation, QuotationStatus};
use crate::quotation::PRICE_TOLERANCE;

// ---------------------------------------------------------------------------
// Transition guard
// ---------------------------------------------------------------------------

fn guard_transition(order: &Order, next: OrderStatus) -> Result<(), CommerceError> {
    if order.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(CommerceError::IllegalTransition {
            entity: "order",
            from: order.status.to_string(),
            attempted: next.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Build an order from priced line items. Total is the recomputed sum of
/// item values; orders enter processing immediately on creation.
fn build(customer_id: &str, items: Vec<LineItem>, quotation_id: Option<String>) -> Order {
    let now = Utc::now();
    let total: f64 = items.iter().map(LineItem::subtotal).sum();
    Order {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        status: OrderStatus::InProcess,
        negotiation_status: None,
        items,
        total,
        payments: Vec::new(),
        quotation_id,
        scheduled_delivery_at: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Promote an approved quotation into an order.
///
/// Called with the quotation still in `Quoted` — the caller flips it to
/// `Approved` only after this returns, keeping the promotion atomic.
/// Items and the quoted total carry over; the total is still recomputed
/// and verified against the estimate.
pub fn promote_from_quotation(quotation: &Quotation) -> Result<Order, CommerceError> {
    if quotation.status != QuotationStatus::Quoted {
        return Err(CommerceError::IllegalTransition {
            entity: "quotation",
            from: quotation.status.to_string(),
            attempted: QuotationStatus::Approved.to_string(),
        });
    }

    let items: Vec<LineItem> = quotation.items.clone();
    let computed: f64 = items.iter().map(LineItem::subtotal).sum();
    let estimate = quotation.total_estimate.unwrap_or(computed);
    if (computed - estimate).abs() > PRICE_TOLERANCE {
        return Err(CommerceError::PriceIntegrity {
            supplied: estimate,
            computed,
        });
    }

    let new_order = build(
        &quotation.customer_id,
        items,
        Some(quotation.id.clone()),
    );
    info!(
        order_id = %new_order.id,
        quotation_id = %quotation.id,
        total = new_order.total,
        "Order created from approved quotation"
    );
    Ok(new_order)
}

/// Direct admin creation from already-priced items.
///
/// Every item must carry a non-negative value; the order total is the
/// recomputed sum.
pub fn create_direct(customer_id: &str, items: Vec<LineItem>) -> Result<Order, CommerceError> {
    for item in &items {
        match item.unit_price {
            Some(price) if price < 0.0 => {
                return Err(CommerceError::NegativePrice {
                    item: item.description.clone(),
                })
            }
            Some(_) => {}
            None => {
                return Err(CommerceError::PriceIntegrity {
                    supplied: 0.0,
                    computed: item.subtotal(),
                })
            }
        }
    }

    let new_order = build(customer_id, items, None);
    info!(
        order_id = %new_order.id,
        total = new_order.total,
        "Order created directly by admin"
    );
    Ok(new_order)
}

// ---------------------------------------------------------------------------
// Ledger gate
// ---------------------------------------------------------------------------

/// Evaluate the order's ledger from its current payment list.
pub fn evaluate_ledger(order: &Order) -> LedgerEvaluation {
    ledger::evaluate(order.total, &order.payments)
}

/// Re-run the production gate against the order's payment list.
///
/// Moves `InProcess -> InProduction` when the ledger reports
/// production-eligible and returns whether the transition fired. Must be
/// called after **every** payment state change — approvals can land
/// asynchronously long after the order was created.
pub fn refresh_production_gate(order: &mut Order) -> bool {
    let eval = evaluate_ledger(order);
    if order.status == OrderStatus::InProcess && eval.production_eligible {
        order.status = OrderStatus::InProduction;
        order.updated_at = Utc::now();
        info!(
            order_id = %order.id,
            paid = eval.paid,
            total = order.total,
            "Production gate opened — order moved to in_production"
        );
        return true;
    }
    false
}

// ---------------------------------------------------------------------------
// Manual transitions
// ---------------------------------------------------------------------------

/// Manual override `Pending -> InProcess` (orders normally enter
/// processing on creation; wire-loaded orders may still be pending).
pub fn activate(order: &mut Order) -> Result<(), CommerceError> {
    guard_transition(order, OrderStatus::InProcess)?;
    order.status = OrderStatus::InProcess;
    order.updated_at = Utc::now();
    info!(order_id = %order.id, "Order activated");
    Ok(())
}

/// Admin marks a produced order as completed. Only legal from
/// `InProduction`.
pub fn complete(order: &mut Order) -> Result<(), CommerceError> {
    guard_transition(order, OrderStatus::Completed)?;
    order.status = OrderStatus::Completed;
    order.delivered_at = Some(Utc::now());
    order.updated_at = Utc::now();
    info!(order_id = %order.id, "Order completed");
    Ok(())
}

/// Cancel from any non-terminal state. Payment history is preserved —
/// cancellation closes the order, it does not erase its ledger.
pub fn cancel(order: &mut Order) -> Result<(), CommerceError> {
    guard_transition(order, OrderStatus::Cancelled)?;
    order.status = OrderStatus::Cancelled;
    order.updated_at = Utc::now();
    warn!(
        order_id = %order.id,
        payments = order.payments.len(),
        "Order cancelled"
    );
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Payment, PaymentMethod, PaymentStatus};

    fn priced_item(description: &str, quantity: u32, price: f64) -> LineItem {
        let mut item = LineItem::new(description, quantity);
        item.unit_price = Some(price);
        item
    }

    fn order_with_total(total: f64) -> Order {
        create_direct("cust-1", vec![priced_item("Dining table", 1, total)]).unwrap()
    }

    fn approved_payment(amount: f64) -> Payment {
        let mut p = Payment::new(amount, PaymentMethod::Transfer);
        p.status = PaymentStatus::Approved;
        p
    }

    #[test]
    fn test_direct_creation_recomputes_total() {
        let items = vec![priced_item("Table", 1, 400.0), priced_item("Chair", 4, 75.0)];
        let o = create_direct("cust-1", items).unwrap();
        assert_eq!(o.total, 700.0);
        assert_eq!(o.status, OrderStatus::InProcess);
        assert!(o.quotation_id.is_none());
    }

    #[test]
    fn test_direct_creation_requires_prices() {
        let items = vec![LineItem::new("Unpriced bench", 1)];
        assert!(create_direct("cust-1", items).is_err());
    }

    #[test]
    fn test_promotion_requires_quoted_status() {
        let q = Quotation::new_cart("cust-1");
        let err = promote_from_quotation(&q).unwrap_err();
        assert!(matches!(err, CommerceError::IllegalTransition { .. }));
    }

    #[test]
    fn test_gate_opens_at_threshold() {
        let mut o = order_with_total(1000.0);
        o.payments.push(approved_payment(299.0));
        assert!(!refresh_production_gate(&mut o));
        assert_eq!(o.status, OrderStatus::InProcess);

        o.payments.push(approved_payment(1.0));
        assert!(refresh_production_gate(&mut o));
        assert_eq!(o.status, OrderStatus::InProduction);
    }

    #[test]
    fn test_gate_ignores_pending_payments() {
        let mut o = order_with_total(1000.0);
        o.payments.push(Payment::new(500.0, PaymentMethod::Card));
        assert!(!refresh_production_gate(&mut o));
        assert_eq!(o.status, OrderStatus::InProcess);
    }

    #[test]
    fn test_gate_is_noop_outside_in_process() {
        let mut o = order_with_total(100.0);
        o.payments.push(approved_payment(100.0));
        assert!(refresh_production_gate(&mut o));
        // Already in production — a second evaluation changes nothing.
        assert!(!refresh_production_gate(&mut o));
        assert_eq!(o.status, OrderStatus::InProduction);
    }

    #[test]
    fn test_complete_only_from_production() {
        let mut o = order_with_total(500.0);
        assert!(complete(&mut o).is_err());

        o.payments.push(approved_payment(150.0));
        refresh_production_gate(&mut o);
        complete(&mut o).unwrap();
        assert_eq!(o.status, OrderStatus::Completed);
        assert!(o.delivered_at.is_some());
    }

    #[test]
    fn test_cancel_preserves_payments() {
        let mut o = order_with_total(500.0);
        o.payments.push(approved_payment(100.0));
        cancel(&mut o).unwrap();
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert_eq!(o.payments.len(), 1);

        // Terminal: no further transitions
        assert!(cancel(&mut o).is_err());
        assert!(activate(&mut o).is_err());
    }

    #[test]
    fn test_zero_total_order_is_immediately_eligible() {
        let mut o = create_direct("cust-1", vec![priced_item("Promo stool", 1, 0.0)]).unwrap();
        assert!(refresh_production_gate(&mut o));
        assert_eq!(o.status, OrderStatus::InProduction);
    }
}
