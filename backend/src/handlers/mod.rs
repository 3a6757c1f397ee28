//! HTTP handlers

pub mod auth;
pub mod health;
pub mod items;
pub mod sku;
pub mod taxonomy;

pub use auth::*;
pub use health::*;
pub use items::*;
pub use sku::*;
pub use taxonomy::*;
