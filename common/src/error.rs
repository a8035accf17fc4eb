//! Error types for ledger operations.

use crate::{BalanceId, Currency, RecordId, UserId};
use std::fmt;
use thiserror::Error;

/// Kind of entity referenced by an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Balance,
    BalanceRecord,
    Exchange,
    Debtor,
    Debt,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Balance => "balance",
            EntityKind::BalanceRecord => "balance record",
            EntityKind::Exchange => "exchange",
            EntityKind::Debtor => "debtor",
            EntityKind::Debt => "debt",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for ledger operations.
///
/// Every variant aborts the unit of work it was raised in; nothing is
/// partially applied.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// A debit would take a balance below zero.
    #[error("Insufficient funds on balance {balance_id}: required {required}, available {available}")]
    InsufficientFunds {
        balance_id: BalanceId,
        available: i64,
        required: i64,
    },

    /// The user holds no balance in the requested currency.
    #[error("No {currency} balance for user {user_id}")]
    CurrencyNotFound { user_id: UserId, currency: Currency },

    /// Debt currency differs from the debtor's currency.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: EntityKind, id: String },

    /// A type tag outside the entity's enumeration.
    #[error("Unknown {entity} type: {value}")]
    UnknownType { entity: &'static str, value: String },

    /// A balance for the (user, currency) pair already exists.
    #[error("User {user_id} already has a {currency} balance")]
    BalanceExists { user_id: UserId, currency: Currency },

    /// Amount must be strictly positive.
    #[error("Invalid amount {amount}: must be positive")]
    InvalidAmount { amount: i64 },

    /// Request violates a configured limit or shape.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        field: Option<String>,
    },

    /// Record belongs to an exchange or debt and changes only through it.
    #[error("Balance record {0} is owned by its source and cannot be changed directly")]
    SourceOwned(RecordId),

    /// Running totals would overflow.
    #[error("Amount overflow on {0}")]
    AmountOverflow(String),

    /// Row changed under a concurrent unit of work.
    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: EntityKind, id: String },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        LedgerError::EntityNotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_request(message: impl Into<String>, field: impl Into<String>) -> Self {
        LedgerError::InvalidRequest {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn conflict(entity: EntityKind, id: impl ToString) -> Self {
        LedgerError::ConcurrentModification {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// The engine never retries; this is advice for the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrentModification { .. } | LedgerError::Database(_)
        )
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::CurrencyNotFound { .. } => "CURRENCY_NOT_FOUND",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            LedgerError::UnknownType { .. } => "UNKNOWN_TYPE",
            LedgerError::BalanceExists { .. } => "BALANCE_EXISTS",
            LedgerError::InvalidAmount { .. } => "INVALID_AMOUNT",
            LedgerError::InvalidRequest { .. } => "INVALID_REQUEST",
            LedgerError::SourceOwned(_) => "SOURCE_OWNED",
            LedgerError::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            LedgerError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
