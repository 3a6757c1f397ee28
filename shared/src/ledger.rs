//! Pure stock ledger rules
//!
//! The cached `quantity` on an item must always equal the sum of its
//! ledger rows. Storage backends apply changes through [`apply_delta`] so
//! every backend enforces the same guard.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::models::{QuantityChange, StockTransaction};

/// New quantity after `delta`, rejecting overflow and, unless
/// `allow_negative`, any result below zero
pub fn apply_delta(current: i32, delta: i32, allow_negative: bool) -> DomainResult<i32> {
    let next = current
        .checked_add(delta)
        .ok_or(DomainError::InvalidQuantity { current, delta })?;
    if next < 0 && !allow_negative {
        return Err(DomainError::InvalidQuantity { current, delta });
    }
    Ok(next)
}

/// Signed delta that `change` represents for an item holding `current`
pub fn resolve_delta(current: i32, change: QuantityChange) -> DomainResult<i32> {
    match change {
        QuantityChange::By(delta) => Ok(delta),
        QuantityChange::SetTo(target) => {
            if target < 0 {
                return Err(DomainError::validation(
                    "quantity",
                    "Target quantity cannot be negative",
                ));
            }
            target
                .checked_sub(current)
                .ok_or(DomainError::InvalidQuantity { current, delta: target })
        }
    }
}

/// Sum of change amounts, widened so it cannot overflow
pub fn ledger_sum(transactions: &[StockTransaction]) -> i64 {
    transactions.iter().map(|t| i64::from(t.change_amount)).sum()
}

/// Result of comparing the cached quantity with the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub item_id: Uuid,
    pub cached_quantity: i64,
    pub ledger_sum: i64,
    pub transaction_count: i64,
    pub matches: bool,
}

impl ReconcileReport {
    pub fn new(item_id: Uuid, cached_quantity: i64, ledger_sum: i64, transaction_count: i64) -> Self {
        Self {
            item_id,
            cached_quantity,
            ledger_sum,
            transaction_count,
            matches: cached_quantity == ledger_sum,
        }
    }

    pub fn drift(&self) -> i64 {
        self.cached_quantity - self.ledger_sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_apply_delta() {
        assert_eq!(apply_delta(10, -3, false).unwrap(), 7);
        assert_eq!(apply_delta(7, 5, false).unwrap(), 12);
        assert_eq!(apply_delta(3, -3, false).unwrap(), 0);
    }

    #[test]
    fn test_negative_result_rejected_by_default() {
        assert_eq!(
            apply_delta(3, -4, false),
            Err(DomainError::InvalidQuantity { current: 3, delta: -4 })
        );
        assert_eq!(apply_delta(3, -4, true).unwrap(), -1);
    }

    #[test]
    fn test_overflow_rejected_even_with_backorder() {
        assert!(apply_delta(i32::MAX, 1, true).is_err());
        assert!(apply_delta(i32::MIN, -1, true).is_err());
    }

    #[test]
    fn test_resolve_set_to() {
        assert_eq!(resolve_delta(10, QuantityChange::SetTo(4)).unwrap(), -6);
        assert_eq!(resolve_delta(10, QuantityChange::SetTo(10)).unwrap(), 0);
        assert_eq!(resolve_delta(2, QuantityChange::SetTo(9)).unwrap(), 7);
        assert!(resolve_delta(2, QuantityChange::SetTo(-1)).is_err());
        assert_eq!(resolve_delta(2, QuantityChange::By(-5)).unwrap(), -5);
    }

    #[test]
    fn test_report_drift() {
        let id = Uuid::new_v4();
        let ok = ReconcileReport::new(id, 12, 12, 3);
        assert!(ok.matches);
        assert_eq!(ok.drift(), 0);

        let off = ReconcileReport::new(id, 15, 12, 3);
        assert!(!off.matches);
        assert_eq!(off.drift(), 3);
    }

    proptest! {
        /// Applying accepted deltas keeps quantity equal to their running sum
        #[test]
        fn prop_accepted_deltas_match_running_sum(
            initial in 0i32..1000,
            deltas in prop::collection::vec(-200i32..200, 0..50)
        ) {
            let mut quantity = initial;
            let mut sum = i64::from(initial);
            for delta in deltas {
                match apply_delta(quantity, delta, false) {
                    Ok(next) => {
                        quantity = next;
                        sum += i64::from(delta);
                    }
                    Err(_) => prop_assert!(i64::from(quantity) + i64::from(delta) < 0),
                }
                prop_assert!(quantity >= 0);
                prop_assert_eq!(i64::from(quantity), sum);
            }
        }
    }
}
