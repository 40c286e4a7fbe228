//! Verification and dispute tests
//!
//! Covers the delivery verification rules: idempotency guard against double
//! crediting, batch-identity merge into retailer stock, the PTS markdown on
//! fresh rows, and the dispute state machine including the reinvoice path.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::models::{DisputeStatus, IssueType, OrderStatus};
use shared::validation::derive_pts;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_pts_markdown_on_credited_stock() {
        // Fresh retailer rows are seeded at 0.9x the invoiced unit price
        assert_eq!(derive_pts(dec("100.00")), dec("90.00"));
        assert_eq!(derive_pts(dec("25.50")), dec("22.95"));
    }

    #[test]
    fn test_dispute_issue_types_round_trip() {
        for issue in [
            IssueType::Shortage,
            IssueType::Expired,
            IssueType::WrongBatch,
            IssueType::Damaged,
            IssueType::Other,
        ] {
            assert_eq!(IssueType::from_str(issue.as_str()), Some(issue));
        }
    }

    #[test]
    fn test_unknown_issue_type_rejected() {
        assert_eq!(IssueType::from_str("late"), None);
    }

    #[test]
    fn test_dispute_statuses() {
        assert_eq!(DisputeStatus::Open.as_str(), "open");
        assert_eq!(DisputeStatus::Resolved.as_str(), "resolved");
        assert_eq!(DisputeStatus::Rejected.as_str(), "rejected");
    }

    #[test]
    fn test_reinvoice_reopens_confirmed_orders_only() {
        // The reinvoice action reopens confirmed -> processing; cancelled
        // orders stay closed
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_reinvoice_requires_unverified_order() {
        // A verified order already credited the retailer's stock; reopening
        // it would debit the distributor twice for the same order
        assert!(OrderStatus::Confirmed.can_reopen_for_billing(false));
        assert!(!OrderStatus::Confirmed.can_reopen_for_billing(true));
        assert!(!OrderStatus::Cancelled.can_reopen_for_billing(false));
        assert!(!OrderStatus::Pending.can_reopen_for_billing(false));
    }
}

// ============================================================================
// Verification Simulation
// ============================================================================

#[cfg(test)]
mod verification_simulation {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct RetailerBatch {
        product_code: String,
        batch_number: String,
        expiry: NaiveDate,
        stock: i32,
        ptr: Decimal,
        pts: Decimal,
    }

    #[derive(Debug, Clone)]
    struct InvoiceLine {
        product_code: &'static str,
        batch_number: &'static str,
        expiry: Option<NaiveDate>,
        quantity: i32,
        unit_price: Decimal,
    }

    #[derive(Debug, Default)]
    struct VerifiedOrder {
        is_verified: bool,
    }

    /// Verify a confirmed order into a retailer ledger with the service's
    /// rules: idempotency guard, all-or-nothing crediting, merge by batch
    /// identity, PTS markdown on fresh rows.
    fn verify(
        order: &mut VerifiedOrder,
        ledger: &mut Vec<RetailerBatch>,
        lines: &[InvoiceLine],
    ) -> Result<(), &'static str> {
        if order.is_verified {
            return Err("not found");
        }

        let snapshot = ledger.clone();
        for line in lines {
            let Some(expiry) = line.expiry else {
                *ledger = snapshot;
                return Err("line has no batch binding");
            };

            let existing = ledger.iter_mut().find(|b| {
                b.product_code == line.product_code
                    && b.batch_number == line.batch_number
                    && b.expiry == expiry
            });

            match existing {
                Some(batch) => batch.stock += line.quantity,
                None => ledger.push(RetailerBatch {
                    product_code: line.product_code.to_string(),
                    batch_number: line.batch_number.to_string(),
                    expiry,
                    stock: line.quantity,
                    ptr: line.unit_price,
                    pts: derive_pts(line.unit_price),
                }),
            }
        }

        order.is_verified = true;
        Ok(())
    }

    fn line(
        product_code: &'static str,
        batch_number: &'static str,
        quantity: i32,
    ) -> InvoiceLine {
        InvoiceLine {
            product_code,
            batch_number,
            expiry: Some(date(2027, 3, 31)),
            quantity,
            unit_price: dec("25.00"),
        }
    }

    #[test]
    fn test_verify_credits_each_line() {
        let mut order = VerifiedOrder::default();
        let mut ledger = Vec::new();
        let lines = [line("PARA500", "B1001", 50), line("AMOX250", "B2001", 30)];

        assert!(verify(&mut order, &mut ledger, &lines).is_ok());
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].stock, 50);
        assert_eq!(ledger[1].stock, 30);
    }

    #[test]
    fn test_second_verify_rejected_no_double_credit() {
        let mut order = VerifiedOrder::default();
        let mut ledger = Vec::new();
        let lines = [line("PARA500", "B1001", 50)];

        assert!(verify(&mut order, &mut ledger, &lines).is_ok());
        assert_eq!(verify(&mut order, &mut ledger, &lines), Err("not found"));
        assert_eq!(ledger[0].stock, 50);
    }

    #[test]
    fn test_credit_merges_by_batch_identity() {
        let mut first = VerifiedOrder::default();
        let mut second = VerifiedOrder::default();
        let mut ledger = Vec::new();

        verify(&mut first, &mut ledger, &[line("PARA500", "B1001", 50)]).unwrap();
        verify(&mut second, &mut ledger, &[line("PARA500", "B1001", 20)]).unwrap();

        // Same product, batch and expiry: one row, summed stock
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].stock, 70);
    }

    #[test]
    fn test_different_expiry_is_a_different_batch() {
        let mut first = VerifiedOrder::default();
        let mut second = VerifiedOrder::default();
        let mut ledger = Vec::new();

        verify(&mut first, &mut ledger, &[line("PARA500", "B1001", 50)]).unwrap();

        let mut relabelled = line("PARA500", "B1001", 20);
        relabelled.expiry = Some(date(2027, 9, 30));
        verify(&mut second, &mut ledger, &[relabelled]).unwrap();

        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_unbound_line_aborts_whole_verification() {
        let mut order = VerifiedOrder::default();
        let mut ledger = Vec::new();

        let mut broken = line("AMOX250", "B2001", 30);
        broken.expiry = None;
        let lines = [line("PARA500", "B1001", 50), broken];

        assert!(verify(&mut order, &mut ledger, &lines).is_err());
        assert!(ledger.is_empty());
        assert!(!order.is_verified);
    }

    #[test]
    fn test_no_second_billing_cycle_after_verification() {
        // Invoicing debits the distributor once; after verification the
        // order can no longer be reopened, so those units cannot be spent
        // again through a dispute
        let mut order = VerifiedOrder::default();
        let mut ledger = Vec::new();
        let mut distributor_stock = 100;

        distributor_stock -= 50;
        verify(&mut order, &mut ledger, &[line("PARA500", "B1001", 50)]).unwrap();

        assert!(!OrderStatus::Confirmed.can_reopen_for_billing(order.is_verified));
        assert_eq!(distributor_stock, 50);
        assert_eq!(ledger[0].stock, 50);
    }

    #[test]
    fn test_fresh_rows_get_pts_markdown() {
        let mut order = VerifiedOrder::default();
        let mut ledger = Vec::new();

        verify(&mut order, &mut ledger, &[line("PARA500", "B1001", 50)]).unwrap();
        assert_eq!(ledger[0].ptr, dec("25.00"));
        assert_eq!(ledger[0].pts, dec("22.50"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn price_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..=1_000_000).prop_map(|n| Decimal::new(n, 2))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The PTS markdown is always strictly below the PTR and never
        /// negative
        #[test]
        fn prop_pts_below_ptr(price in price_strategy()) {
            let pts = derive_pts(price);
            prop_assert!(pts < price);
            prop_assert!(pts >= Decimal::ZERO);
        }

        /// Crediting the same batch n times equals one credit of the sum
        #[test]
        fn prop_merge_credit_is_additive(
            credits in prop::collection::vec(1i32..=200, 1..10)
        ) {
            let merged: i32 = credits.iter().sum();

            let mut stock = 0;
            for c in &credits {
                stock += c;
            }

            prop_assert_eq!(stock, merged);
        }
    }
}
