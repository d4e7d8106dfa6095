//! Chat channel resolution.
//!
//! Picks, for a customer's current (cart, quotations, orders) read
//! models, the single commerce entity whose chat channel should be
//! active. Resolution is deterministic, first match wins, and is re-run
//! on every change to any of the three inputs. The result is an
//! immutable `ChannelDescriptor`; callers diff descriptors by value to
//! detect channel switches.

use tracing::warn;

use crate::model::{ChannelDescriptor, ChannelEntityType, Order, Quotation};

/// Resolve the active chat channel by priority:
///
/// 1. the cart, if it is in active negotiation;
/// 2. else the first negotiating quotation;
/// 3. else the first order still carrying a negotiating sub-status;
/// 4. else none — chat is suppressed.
///
/// More than one candidate is expected (an older quotation may still be
/// negotiating while a new cart was submitted); resolution never fails
/// on that. It logs when multiple *distinct* entities are eligible so a
/// misbehaving backend is visible, then picks by priority anyway.
pub fn resolve_active_channel(
    cart: Option<&Quotation>,
    quotations: &[Quotation],
    orders: &[Order],
) -> Option<ChannelDescriptor> {
    let mut candidates: Vec<ChannelDescriptor> = Vec::new();

    if let Some(cart) = cart {
        if cart.status.is_negotiating() {
            candidates.push(ChannelDescriptor {
                entity_type: ChannelEntityType::Quotation,
                entity_id: cart.id.clone(),
                status: cart.status,
            });
        }
    }

    if let Some(q) = quotations.iter().find(|q| q.status.is_negotiating()) {
        candidates.push(ChannelDescriptor {
            entity_type: ChannelEntityType::Quotation,
            entity_id: q.id.clone(),
            status: q.status,
        });
    }

    if let Some(o) = orders
        .iter()
        .find(|o| o.negotiation_status.is_some_and(|s| s.is_negotiating()))
    {
        candidates.push(ChannelDescriptor {
            entity_type: ChannelEntityType::Order,
            entity_id: o.id.clone(),
            // Checked is_some above
            status: o.negotiation_status.unwrap_or(crate::model::QuotationStatus::Requested),
        });
    }

    let distinct_ids: std::collections::HashSet<&str> =
        candidates.iter().map(|c| c.entity_id.as_str()).collect();
    if distinct_ids.len() > 1 {
        warn!(
            candidates = distinct_ids.len(),
            selected = %candidates[0].entity_id,
            "Multiple entities claim an active chat channel; picking by priority"
        );
    }

    candidates.into_iter().next()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LineItem, OrderStatus, QuotationStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn quotation(id: &str, status: QuotationStatus) -> Quotation {
        let mut q = Quotation::new_cart("cust-1");
        q.id = id.to_string();
        q.status = status;
        q
    }

    fn order(id: &str, negotiation: Option<QuotationStatus>) -> Order {
        let now = Utc::now();
        Order {
            id: id.to_string(),
            customer_id: "cust-1".to_string(),
            status: OrderStatus::InProcess,
            negotiation_status: negotiation,
            items: vec![LineItem::new("item", 1)],
            total: 100.0,
            payments: Vec::new(),
            quotation_id: Some(Uuid::new_v4().to_string()),
            scheduled_delivery_at: None,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_cart_wins_over_quotation() {
        // A requested cart beats an already-quoted quotation.
        let cart = quotation("cart-1", QuotationStatus::Requested);
        let others = vec![quotation("q-1", QuotationStatus::Quoted)];
        let resolved = resolve_active_channel(Some(&cart), &others, &[]).unwrap();
        assert_eq!(resolved.entity_id, "cart-1");
        assert_eq!(resolved.entity_type, ChannelEntityType::Quotation);
        assert_eq!(resolved.status, QuotationStatus::Requested);
    }

    #[test]
    fn test_idle_cart_falls_through_to_quotations() {
        let cart = quotation("cart-1", QuotationStatus::Cart);
        let others = vec![
            quotation("q-done", QuotationStatus::Rejected),
            quotation("q-live", QuotationStatus::InProcess),
        ];
        let resolved = resolve_active_channel(Some(&cart), &others, &[]).unwrap();
        assert_eq!(resolved.entity_id, "q-live");
    }

    #[test]
    fn test_order_negotiation_is_last_resort() {
        let orders = vec![
            order("o-plain", None),
            order("o-nego", Some(QuotationStatus::Quoted)),
        ];
        let resolved = resolve_active_channel(None, &[], &orders).unwrap();
        assert_eq!(resolved.entity_id, "o-nego");
        assert_eq!(resolved.entity_type, ChannelEntityType::Order);
    }

    #[test]
    fn test_no_candidates_suppresses_chat() {
        let cart = quotation("cart-1", QuotationStatus::Cart);
        let others = vec![quotation("q-1", QuotationStatus::Approved)];
        let orders = vec![order("o-1", None)];
        assert!(resolve_active_channel(Some(&cart), &others, &orders).is_none());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let cart = quotation("cart-1", QuotationStatus::InProcess);
        let others = vec![quotation("q-1", QuotationStatus::Quoted)];
        let orders = vec![order("o-1", Some(QuotationStatus::Requested))];
        let first = resolve_active_channel(Some(&cart), &others, &orders);
        let second = resolve_active_channel(Some(&cart), &others, &orders);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().entity_id, "cart-1");
    }

    #[test]
    fn test_descriptor_change_is_detectable_by_value() {
        let cart = quotation("cart-1", QuotationStatus::Requested);
        let before = resolve_active_channel(Some(&cart), &[], &[]);

        // The cart got quoted and the customer approved: the channel
        // moves to the promoted order.
        let approved = quotation("cart-1", QuotationStatus::Approved);
        let orders = vec![order("o-1", Some(QuotationStatus::Quoted))];
        let after = resolve_active_channel(Some(&approved), &[], &orders);

        assert_ne!(before, after);
        assert_eq!(after.unwrap().entity_id, "o-1");
    }
}
