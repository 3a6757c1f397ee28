//! Stock ledger rows

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// Reason recorded on the ledger row written when an item is created
pub const OPENING_REASON: &str = "Initial stock";

/// Stock transaction type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    In,
    Out,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::In => "in",
            TransactionKind::Out => "out",
            TransactionKind::Adjustment => "adjustment",
        }
    }

    /// Check that the sign of `delta` matches the transaction type.
    /// `in` must add stock, `out` must remove it, `adjustment` may do
    /// either. Zero is never a valid change.
    pub fn check_delta(&self, delta: i32) -> DomainResult<()> {
        let ok = match self {
            TransactionKind::In => delta > 0,
            TransactionKind::Out => delta < 0,
            TransactionKind::Adjustment => delta != 0,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(
                "delta",
                format!("Change of {} is not valid for a '{}' transaction", delta, self),
            ))
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "in" => Ok(TransactionKind::In),
            "out" => Ok(TransactionKind::Out),
            "adjustment" => Ok(TransactionKind::Adjustment),
            other => Err(DomainError::validation(
                "type",
                format!("Unknown transaction type: {}", other),
            )),
        }
    }
}

/// Immutable ledger row. `item_id` is kept after the item is deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockTransaction {
    pub id: Uuid,
    pub item_id: Uuid,
    pub change_amount: i32,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub reason: Option<String>,
    pub cost_price: Option<Decimal>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Requested quantity change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityChange {
    /// Add a signed delta
    By(i32),
    /// Move to an absolute quantity; the delta is computed under lock
    SetTo(i32),
}

/// A validated stock movement handed to storage
#[derive(Debug, Clone)]
pub struct StockChange {
    pub change: QuantityChange,
    pub kind: TransactionKind,
    pub reason: Option<String>,
    pub cost_price: Option<Decimal>,
    pub actor_id: Uuid,
    pub allow_negative: bool,
}
