//! Shared warehouse domain: models and the pure rules of the engine
//!
//! This crate contains types and logic shared between the backend and the
//! browser (via WASM): SKU composition, taxonomy merge and ordering, ledger
//! arithmetic, lifecycle transitions and stock status.

pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod sku;
pub mod stock_status;
pub mod taxonomy;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use stock_status::{evaluate as evaluate_stock_status, StockStatus};
pub use types::*;
pub use validation::*;
