//! Domain errors raised by the pure warehouse rules
//!
//! The backend maps these onto its HTTP-facing error type.

use thiserror::Error;

use crate::models::ItemState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    /// Applying `delta` to `current` would leave the item below zero
    #[error("Quantity {current} cannot change by {delta}")]
    InvalidQuantity { current: i32, delta: i32 },

    #[error("Cannot {action} an item that is {from}")]
    InvalidStateTransition { from: ItemState, action: &'static str },
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
