//! Payment ledger evaluation.
//!
//! The ledger is the order's append-only payment list; running totals are
//! always recomputed from it on demand. No counter is persisted anywhere,
//! so the evaluation can never drift from the records it summarizes.

use crate::model::{Payment, PaymentStatus};

/// Fraction of the order total that must be paid before production may
/// start.
pub const PRODUCTION_THRESHOLD: f64 = 0.30;

/// Result of evaluating an order's payment ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerEvaluation {
    /// Sum of approved payment amounts. Pending and rejected payments do
    /// not count.
    pub paid: f64,
    /// Outstanding balance, floored at zero (overpayment is not a debt).
    pub remaining: f64,
    /// `paid / total`, or 0 when the total is 0.
    pub percentage_paid: f64,
    /// Whether the 30% production gate is open.
    pub production_eligible: bool,
}

/// Evaluate an order's ledger from its total and full payment list.
///
/// Pure and idempotent: same inputs, same outputs, no side effects. A
/// zero total is vacuously production-eligible — an all-free order has
/// nothing left to pay (`percentage_paid` still reports 0 so callers can
/// tell the vacuous case apart).
pub fn evaluate(total: f64, payments: &[Payment]) -> LedgerEvaluation {
    let paid: f64 = payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Approved)
        .map(|p| p.amount)
        .sum();

    let remaining = (total - paid).max(0.0);
    let percentage_paid = if total > 0.0 { paid / total } else { 0.0 };
    let production_eligible = total <= 0.0 || percentage_paid >= PRODUCTION_THRESHOLD;

    LedgerEvaluation {
        paid,
        remaining,
        percentage_paid,
        production_eligible,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
