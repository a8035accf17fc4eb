//! Identifier types for ledger entities.
//!
//! All identifiers wrap a UUID v7 so they sort in creation order.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new time-ordered identifier.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from string.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// A system user (cashier) who owns balances.
    UserId
);
uuid_id!(
    /// The company a user works for.
    CompanyId
);
uuid_id!(
    /// One (user, currency) balance row.
    BalanceId
);
uuid_id!(
    /// One balance record (audit entry).
    RecordId
);
uuid_id!(
    /// Groups the legs of a manual two-leg posting.
    TransactionId
);
uuid_id!(
    /// A currency exchange.
    ExchangeId
);
uuid_id!(
    /// A third party with a running debt balance.
    DebtorId
);
uuid_id!(
    /// One debt installment.
    DebtId
);
