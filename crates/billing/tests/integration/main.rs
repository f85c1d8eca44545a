//! Integration tests for the billing core
//!
//! Run against the in-memory ledger; the payment processor is mocked with
//! mockito where a test needs it.
//!
//! ```bash
//! cargo test -p shopledger-billing --test integration
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod payouts;
mod reconciliation;
mod referrals;
mod subscriptions;
mod usage;
