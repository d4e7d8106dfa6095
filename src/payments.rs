//! Payment recording and settlement.
//!
//! Payments form an append-only ledger on their order: records are never
//! removed, only settled (approved/rejected). Every mutation re-runs the
//! production gate, because a payment can be approved asynchronously
//! long after it — or the order — was created.

use chrono::Utc;
use tracing::{info, warn};

use crate::error::CommerceError;
use crate::model::{Order, OrderStatus, Payment, PaymentMethod, PaymentStatus};
use crate::order;

/// Outcome of a payment mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub payment_id: String,
    /// Whether this mutation opened the production gate.
    pub entered_production: bool,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Append a payment record to an order's ledger. The record starts in
/// `Pending`; settlement arrives separately.
pub fn record_payment(
    order: &mut Order,
    amount: f64,
    method: PaymentMethod,
) -> Result<PaymentOutcome, CommerceError> {
    if amount <= 0.0 {
        return Err(CommerceError::InvalidAmount(amount));
    }
    if order.status == OrderStatus::Cancelled {
        return Err(CommerceError::IllegalTransition {
            entity: "order",
            from: order.status.to_string(),
            attempted: "record_payment".to_string(),
        });
    }

    let payment = Payment::new(amount, method);
    let payment_id = payment.id.clone();
    order.payments.push(payment);
    order.updated_at = Utc::now();

    // A pending payment never opens the gate, but the evaluation is
    // re-run on every mutation regardless.
    let entered_production = order::refresh_production_gate(order);

    info!(
        order_id = %order.id,
        payment_id = %payment_id,
        amount,
        "Payment recorded"
    );
    Ok(PaymentOutcome {
        payment_id,
        entered_production,
    })
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Settle a payment record to a new status and re-run the production
/// gate against the refreshed ledger.
pub fn set_payment_status(
    order: &mut Order,
    payment_id: &str,
    status: PaymentStatus,
) -> Result<PaymentOutcome, CommerceError> {
    let payment = order
        .payments
        .iter_mut()
        .find(|p| p.id == payment_id)
        .ok_or_else(|| CommerceError::PaymentNotFound(payment_id.to_string()))?;

    if payment.status == status {
        warn!(
            order_id = %order.id,
            payment_id = %payment_id,
            status = ?status,
            "Payment settlement is a no-op (already in that status)"
        );
    }
    payment.status = status;
    payment.updated_at = Utc::now();
    order.updated_at = Utc::now();

    let entered_production = order::refresh_production_gate(order);

    info!(
        order_id = %order.id,
        payment_id = %payment_id,
        status = ?status,
        entered_production,
        "Payment settled"
    );
    Ok(PaymentOutcome {
        payment_id: payment_id.to_string(),
        entered_production,
    })
}

/// Approve a pending payment.
pub fn approve_payment(
    order: &mut Order,
    payment_id: &str,
) -> Result<PaymentOutcome, CommerceError> {
    set_payment_status(order, payment_id, PaymentStatus::Approved)
}

/// Reject a pending payment.
pub fn reject_payment(
    order: &mut Order,
    payment_id: &str,
) -> Result<PaymentOutcome, CommerceError> {
    set_payment_status(order, payment_id, PaymentStatus::Rejected)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;

    fn order_with_total(total: f64) -> Order {
        let mut item = LineItem::new("Custom wardrobe", 1);
        item.unit_price = Some(total);
        order::create_direct("cust-1", vec![item]).unwrap()
    }

    #[test]
    fn test_record_rejects_non_positive_amount() {
        let mut o = order_with_total(1000.0);
        assert_eq!(
            record_payment(&mut o, 0.0, PaymentMethod::Cash),
            Err(CommerceError::InvalidAmount(0.0))
        );
        assert_eq!(
            record_payment(&mut o, -5.0, PaymentMethod::Cash),
            Err(CommerceError::InvalidAmount(-5.0))
        );
        assert!(o.payments.is_empty());
    }

    #[test]
    fn test_record_on_cancelled_order_rejected() {
        let mut o = order_with_total(1000.0);
        order::cancel(&mut o).unwrap();
        assert!(record_payment(&mut o, 100.0, PaymentMethod::Card).is_err());
    }

    #[test]
    fn test_pending_payment_does_not_open_gate() {
        let mut o = order_with_total(1000.0);
        let outcome = record_payment(&mut o, 400.0, PaymentMethod::Card).unwrap();
        assert!(!outcome.entered_production);
        assert_eq!(o.status, OrderStatus::InProcess);
    }

    #[test]
    fn test_async_approval_opens_gate() {
        let mut o = order_with_total(1000.0);
        let outcome = record_payment(&mut o, 300.0, PaymentMethod::Transfer).unwrap();
        assert_eq!(o.status, OrderStatus::InProcess);

        // Approval lands later — exactly at the 30% boundary.
        let settled = approve_payment(&mut o, &outcome.payment_id).unwrap();
        assert!(settled.entered_production);
        assert_eq!(o.status, OrderStatus::InProduction);
    }

    #[test]
    fn test_rejected_payment_never_counts() {
        let mut o = order_with_total(1000.0);
        let outcome = record_payment(&mut o, 900.0, PaymentMethod::Card).unwrap();
        reject_payment(&mut o, &outcome.payment_id).unwrap();
        assert_eq!(o.status, OrderStatus::InProcess);
        assert_eq!(order::evaluate_ledger(&o).paid, 0.0);
        // The record itself survives — the ledger is append-only.
        assert_eq!(o.payments.len(), 1);
    }

    #[test]
    fn test_gate_accumulates_across_payments() {
        let mut o = order_with_total(1000.0);
        let first = record_payment(&mut o, 150.0, PaymentMethod::Card).unwrap();
        let second = record_payment(&mut o, 150.0, PaymentMethod::Card).unwrap();
        approve_payment(&mut o, &first.payment_id).unwrap();
        assert_eq!(o.status, OrderStatus::InProcess);

        let settled = approve_payment(&mut o, &second.payment_id).unwrap();
        assert!(settled.entered_production);
        assert_eq!(o.status, OrderStatus::InProduction);
    }

    #[test]
    fn test_settle_unknown_payment() {
        let mut o = order_with_total(100.0);
        let err = approve_payment(&mut o, "nope").unwrap_err();
        assert_eq!(err, CommerceError::PaymentNotFound("nope".to_string()));
    }
}
