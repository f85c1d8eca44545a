//! Error types shared across ShopLedger crates

use thiserror::Error;

/// Rejected input when parsing a shared domain value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShopError {
    #[error("Validation error: {0}")]
    Validation(String),
}
