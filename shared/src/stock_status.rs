//! Stock health derived from quantity and per-item thresholds

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StockStatus {
    Ok,
    Low,
    Critical,
}

impl StockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Ok => "ok",
            StockStatus::Low => "low",
            StockStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a quantity. A threshold of 0 disables its tier.
pub fn evaluate(quantity: i32, low_threshold: i32, critical_threshold: i32) -> StockStatus {
    match quantity {
        q if critical_threshold > 0 && q <= critical_threshold => StockStatus::Critical,
        q if low_threshold > 0 && q <= low_threshold => StockStatus::Low,
        _ => StockStatus::Ok,
    }
}

impl crate::models::InventoryItem {
    pub fn stock_status(&self) -> StockStatus {
        evaluate(
            self.quantity,
            self.low_stock_threshold,
            self.critical_stock_threshold,
        )
    }
}
