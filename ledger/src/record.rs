//! Balance records: the audit trail of every balance mutation.

use std::fmt;
use std::str::FromStr;

use cashdesk_common::{
    BalanceId, CompanyId, Currency, DebtId, ExchangeId, LedgerError, Money, RecordId, Timestamp,
    TransactionId, UserId,
};
use serde::{Deserialize, Serialize};

use crate::balance::{Balance, Direction};

/// Type tag of a balance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    /// Money debited from the balance.
    Sell,
    /// Money credited to the balance.
    Buy,
}

impl RecordKind {
    pub fn direction(self) -> Direction {
        match self {
            RecordKind::Sell => Direction::Debit,
            RecordKind::Buy => Direction::Credit,
        }
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Debit => RecordKind::Sell,
            Direction::Credit => RecordKind::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Sell => "SELL",
            RecordKind::Buy => "BUY",
        }
    }

    /// Legacy integer code (1 = SELL, 2 = BUY).
    pub fn code(self) -> i16 {
        match self {
            RecordKind::Sell => 1,
            RecordKind::Buy => 2,
        }
    }
}

impl TryFrom<i16> for RecordKind {
    type Error = LedgerError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(RecordKind::Sell),
            2 => Ok(RecordKind::Buy),
            other => Err(LedgerError::UnknownType {
                entity: "balance record",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for RecordKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SELL" => Ok(RecordKind::Sell),
            "BUY" => Ok(RecordKind::Buy),
            other => Err(LedgerError::UnknownType {
                entity: "balance record",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a balance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RecordSource {
    /// Single manual posting.
    Manual,
    /// One leg of a manual two-leg posting.
    Transaction(TransactionId),
    Exchange(ExchangeId),
    Debt(DebtId),
}

impl RecordSource {
    /// Records owned by an exchange or debt change only through their owner.
    pub fn is_owned(&self) -> bool {
        matches!(self, RecordSource::Exchange(_) | RecordSource::Debt(_))
    }

    pub fn exchange_id(&self) -> Option<ExchangeId> {
        match self {
            RecordSource::Exchange(id) => Some(*id),
            _ => None,
        }
    }

    pub fn debt_id(&self) -> Option<DebtId> {
        match self {
            RecordSource::Debt(id) => Some(*id),
            _ => None,
        }
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            RecordSource::Transaction(id) => Some(*id),
            _ => None,
        }
    }
}

/// One posting against a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub id: RecordId,
    pub balance_id: BalanceId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub kind: RecordKind,
    /// Posted magnitude in minor units; direction is carried by `kind`.
    pub amount: i64,
    pub currency: Currency,
    pub source: RecordSource,
    pub details: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BalanceRecord {
    /// Create a record for a leg just applied to `balance`.
    pub fn posted(
        balance: &Balance,
        direction: Direction,
        amount: i64,
        source: RecordSource,
        details: Option<String>,
    ) -> Self {
        let now = cashdesk_common::now();
        Self {
            id: RecordId::new(),
            balance_id: balance.id,
            user_id: balance.user_id,
            company_id: balance.company_id,
            kind: RecordKind::from_direction(direction),
            amount,
            currency: balance.currency.clone(),
            source,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    pub fn money(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }

    /// Point the record at a re-posted leg.
    pub fn repost(&mut self, balance: &Balance, direction: Direction, amount: i64) {
        self.balance_id = balance.id;
        self.currency = balance.currency.clone();
        self.kind = RecordKind::from_direction(direction);
        self.amount = amount;
        self.updated_at = cashdesk_common::now();
    }
}

/// Two-leg manual posting without a parent exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualExchange {
    pub user_id: UserId,
    pub received: Money,
    pub sold: Money,
    pub details: Option<String>,
}

/// Sum of record amounts of one kind.
pub fn total(records: &[BalanceRecord], kind: RecordKind) -> Result<i64, LedgerError> {
    records
        .iter()
        .filter(|r| r.kind == kind)
        .try_fold(0i64, |sum, r| {
            sum.checked_add(r.amount).ok_or_else(|| {
                LedgerError::AmountOverflow(format!("{} records of balance {}", kind, r.balance_id))
            })
        })
}
