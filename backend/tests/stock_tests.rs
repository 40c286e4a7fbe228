//! Stock ledger tests
//!
//! Covers the batch liveness rules, product code and expiry validation, and
//! the non-negativity of the ledger under mixed debit/credit sequences.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::validation::{is_batch_live, parse_expiry, validate_product_code};

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
    fn test_live_batch() {
        let today = date(2026, 8, 30);
        assert!(is_batch_live(10, date(2027, 1, 31), today));
    }

    #[test]
    fn test_empty_batch_is_not_live() {
        let today = date(2026, 8, 30);
        assert!(!is_batch_live(0, date(2027, 1, 31), today));
    }

    #[test]
    fn test_expired_batch_is_not_live() {
        let today = date(2026, 8, 30);
        assert!(!is_batch_live(10, date(2026, 8, 29), today));
    }

    #[test]
    fn test_batch_expiring_today_is_live() {
        let today = date(2026, 8, 30);
        assert!(is_batch_live(10, today, today));
    }

    #[test]
    fn test_product_codes() {
        assert!(validate_product_code("PARA500").is_ok());
        assert!(validate_product_code("AMOX250CAP").is_ok());
        assert!(validate_product_code("ab").is_err());
        assert!(validate_product_code("PARA-500").is_err());
    }

    #[test]
    fn test_expiry_strip_formats() {
        // The month/year form printed on most strips normalizes to day 1
        assert_eq!(parse_expiry("03/2027"), Ok(date(2027, 3, 1)));
        assert_eq!(parse_expiry("2027-03-31"), Ok(date(2027, 3, 31)));
        assert_eq!(parse_expiry("31-03-2027"), Ok(date(2027, 3, 31)));
        assert!(parse_expiry("Mar 2027").is_err());
    }

    #[test]
    fn test_availability_sums_live_batches_only() {
        let today = date(2026, 8, 30);
        let batches = [
            (60, date(2027, 1, 31)),  // live
            (50, date(2026, 6, 30)),  // expired
            (0, date(2027, 6, 30)),   // empty
            (40, date(2026, 8, 30)),  // expires today, still live
        ];

        let available: i64 = batches
            .iter()
            .filter(|(stock, expiry)| is_batch_live(*stock, *expiry, today))
            .map(|(stock, _)| *stock as i64)
            .sum();

        assert_eq!(available, 100);
    }

    #[test]
    fn test_status_follows_stock_level() {
        // The status column mirrors current_stock > 0
        let status = |stock: i32| if stock > 0 { "In Stock" } else { "Out of Stock" };
        assert_eq!(status(10), "In Stock");
        assert_eq!(status(0), "Out of Stock");
    }

    #[test]
    fn test_negative_prices_rejected() {
        let invalid = [dec("-0.01"), dec("-100")];
        for price in invalid {
            assert!(price < Decimal::ZERO);
        }
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum LedgerOp {
        Debit(i32),
        Credit(i32),
    }

    fn op_strategy() -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            (1i32..=100).prop_map(LedgerOp::Debit),
            (1i32..=100).prop_map(LedgerOp::Credit),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// The ledger never goes negative under any debit/credit sequence
        /// when debits use the conditional guard
        #[test]
        fn prop_ledger_never_negative(
            initial in 0i32..=200,
            ops in prop::collection::vec(op_strategy(), 1..30)
        ) {
            let mut stock = initial;
            for op in ops {
                match op {
                    LedgerOp::Debit(q) => {
                        if stock >= q {
                            stock -= q;
                        }
                    }
                    LedgerOp::Credit(q) => stock += q,
                }
                prop_assert!(stock >= 0);
            }
        }

        /// Guarded debits conserve units: what left the ledger is exactly
        /// the sum of the debits that succeeded
        #[test]
        fn prop_debits_conserve_units(
            initial in 0i32..=500,
            debits in prop::collection::vec(1i32..=100, 1..20)
        ) {
            let mut stock = initial;
            let mut debited = 0;
            for q in debits {
                if stock >= q {
                    stock -= q;
                    debited += q;
                }
            }
            prop_assert_eq!(stock + debited, initial);
        }

        /// A batch is live iff it has units and has not passed expiry
        #[test]
        fn prop_liveness_definition(
            stock in -10i32..=10,
            offset_days in -30i64..=30
        ) {
            let today = date(2026, 8, 30);
            let expiry = today + chrono::Duration::days(offset_days);

            let live = is_batch_live(stock, expiry, today);
            prop_assert_eq!(live, stock > 0 && expiry >= today);
        }

        /// Month/year expiry strings always normalize to the first of the
        /// month
        #[test]
        fn prop_month_year_expiry_normalizes(month in 1u32..=12, year in 2026i32..=2035) {
            let raw = format!("{:02}/{}", month, year);
            prop_assert_eq!(parse_expiry(&raw), Ok(date(year, month, 1)));
        }
    }
}
