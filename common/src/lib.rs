//! Cashdesk Common Types
//!
//! Shared types used across the cashdesk ledger: identifiers, currency and
//! minor-unit money, the ledger error type, and timestamps.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
