//! Shared error types

use thiserror::Error;

/// Core errors shared between server and client
#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
