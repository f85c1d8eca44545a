//! ShopLedger Shared Types and Utilities
//!
//! Domain enums, persisted ledger entities and database helpers shared by the
//! billing core and the API service.

pub mod db;
pub mod error;
pub mod types;

pub use db::*;
pub use error::*;
pub use types::*;
