//! Domain models for the warehouse engine

mod attribute;
mod category;
mod item;
mod transaction;
mod user;

pub use attribute::*;
pub use category::*;
pub use item::*;
pub use transaction::*;
pub use user::*;
