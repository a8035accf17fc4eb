//! Debtors and their debt installments.

use std::fmt;
use std::str::FromStr;

use cashdesk_common::{
    CompanyId, Currency, DebtId, DebtorId, LedgerError, Money, Result, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use crate::balance::Direction;
use crate::record::BalanceRecord;

/// Whether the user lends money out or borrows it in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtKind {
    /// Money leaves the user's balance; stored negative.
    Lend,
    /// Money enters the user's balance; stored positive.
    Borrow,
}

impl DebtKind {
    pub fn direction(self) -> Direction {
        match self {
            DebtKind::Lend => Direction::Debit,
            DebtKind::Borrow => Direction::Credit,
        }
    }

    /// Apply the storage sign convention to a positive magnitude.
    pub fn signed(self, amount: i64) -> i64 {
        match self {
            DebtKind::Lend => -amount,
            DebtKind::Borrow => amount,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DebtKind::Lend => "LEND",
            DebtKind::Borrow => "BORROW",
        }
    }

    /// Legacy integer code (1 = SELL/lend, 2 = BUY/borrow).
    pub fn code(self) -> i16 {
        match self {
            DebtKind::Lend => 1,
            DebtKind::Borrow => 2,
        }
    }
}

impl TryFrom<i16> for DebtKind {
    type Error = LedgerError;

    fn try_from(code: i16) -> Result<Self> {
        match code {
            1 => Ok(DebtKind::Lend),
            2 => Ok(DebtKind::Borrow),
            other => Err(LedgerError::UnknownType {
                entity: "debt",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for DebtKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LEND" => Ok(DebtKind::Lend),
            "BORROW" => Ok(DebtKind::Borrow),
            other => Err(LedgerError::UnknownType {
                entity: "debt",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DebtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a debt row within its debtor relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtStatus {
    /// Row created when the relationship started.
    Opening,
    /// Later settlement against the debtor.
    Installment,
}

impl DebtStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DebtStatus::Opening => "OPENING",
            DebtStatus::Installment => "INSTALLMENT",
        }
    }
}

impl FromStr for DebtStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPENING" => Ok(DebtStatus::Opening),
            "INSTALLMENT" => Ok(DebtStatus::Installment),
            other => Err(LedgerError::UnknownType {
                entity: "debt status",
                value: other.to_string(),
            }),
        }
    }
}

/// A third party with a running net balance in one currency.
///
/// Negative balance: the debtor owes the user. Positive: the user owes the debtor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debtor {
    pub id: DebtorId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub name: String,
    pub phone: Option<String>,
    pub currency: Currency,
    pub balance: i64,
    /// Optimistic concurrency token, bumped by every store update.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Debtor {
    pub fn new(
        user_id: UserId,
        company_id: CompanyId,
        name: impl Into<String>,
        phone: Option<String>,
        currency: Currency,
    ) -> Self {
        let now = cashdesk_common::now();
        Self {
            id: DebtorId::new(),
            user_id,
            company_id,
            name: name.into(),
            phone,
            currency,
            balance: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a signed amount to the running balance.
    pub fn adjust(&mut self, delta: i64) -> Result<()> {
        self.balance = self
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::AmountOverflow(format!("debtor {}", self.id)))?;
        self.updated_at = cashdesk_common::now();
        Ok(())
    }

    pub fn ensure_currency(&self, currency: &Currency) -> Result<()> {
        if &self.currency != currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: currency.clone(),
            });
        }
        Ok(())
    }
}

/// One debt event against a debtor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Debt {
    pub id: DebtId,
    pub debtor_id: DebtorId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub kind: DebtKind,
    pub status: DebtStatus,
    /// Nominal amount in the debtor's currency, signed by `kind`.
    pub debted: Money,
    /// Currency legs actually settled against user balances, signed by `kind`.
    pub received: Vec<Money>,
    pub details: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Debt {
    /// Build a debt from positive magnitudes, applying the sign convention.
    pub fn new(
        debtor: &Debtor,
        kind: DebtKind,
        status: DebtStatus,
        debted: &Money,
        received: &[Money],
        details: Option<String>,
    ) -> Self {
        let now = cashdesk_common::now();
        Self {
            id: DebtId::new(),
            debtor_id: debtor.id,
            user_id: debtor.user_id,
            company_id: debtor.company_id,
            kind,
            status,
            debted: sign_money(kind, debted),
            received: received.iter().map(|m| sign_money(kind, m)).collect(),
            details,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace amounts from positive magnitudes.
    pub fn reset(&mut self, kind: DebtKind, debted: &Money, received: &[Money]) {
        self.kind = kind;
        self.debted = sign_money(kind, debted);
        self.received = received.iter().map(|m| sign_money(kind, m)).collect();
        self.updated_at = cashdesk_common::now();
    }
}

fn sign_money(kind: DebtKind, money: &Money) -> Money {
    Money::new(kind.signed(money.amount), money.currency.clone())
}

/// Request to start a debt relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDebt {
    pub user_id: UserId,
    pub debtor_name: String,
    pub debtor_phone: Option<String>,
    pub kind: DebtKind,
    /// Positive nominal amount; its currency becomes the debtor's currency.
    pub debted: Money,
    /// Positive currency legs moved against the user's balances.
    pub received: Vec<Money>,
    pub details: Option<String>,
}

/// Request to settle (or extend) an existing debt relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtInstallment {
    pub debtor_id: DebtorId,
    pub kind: DebtKind,
    pub debted: Money,
    pub received: Vec<Money>,
    pub details: Option<String>,
}

/// New amounts for an existing debt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtAmounts {
    pub kind: DebtKind,
    pub debted: Money,
    pub received: Vec<Money>,
}

/// Outcome of a debt operation.
#[derive(Debug, Clone)]
pub struct DebtPosting {
    pub debtor: Debtor,
    pub debt: Debt,
    pub records: Vec<BalanceRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debtor() -> Debtor {
        Debtor::new(UserId::new(), CompanyId::new(), "Aziz", None, Currency::usd())
    }

    #[test]
    fn test_lend_is_stored_negative() {
        let debtor = debtor();
        let debt = Debt::new(
            &debtor,
            DebtKind::Lend,
            DebtStatus::Opening,
            &Money::new(10_000, Currency::usd()),
            &[
                Money::new(6_000, Currency::usd()),
                Money::new(50_000_000, Currency::uzs()),
            ],
            None,
        );

        assert_eq!(debt.debted.amount, -10_000);
        assert!(debt.received.iter().all(|leg| leg.amount < 0));
        assert_eq!(debt.received[1], Money::new(-50_000_000, Currency::uzs()));
    }

    #[test]
    fn test_borrow_is_stored_positive() {
        let debtor = debtor();
        let mut debt = Debt::new(
            &debtor,
            DebtKind::Borrow,
            DebtStatus::Installment,
            &Money::new(500, Currency::usd()),
            &[Money::new(500, Currency::usd())],
            None,
        );
        assert_eq!(debt.debted.amount, 500);

        debt.reset(DebtKind::Lend, &Money::new(200, Currency::usd()), &[]);
        assert_eq!(debt.debted.amount, -200);
        assert!(debt.received.is_empty());
    }

    #[test]
    fn test_debtor_currency_guard() {
        let debtor = debtor();
        assert!(debtor.ensure_currency(&Currency::usd()).is_ok());
        let err = debtor.ensure_currency(&Currency::rub()).unwrap_err();
        assert_eq!(err.error_code(), "CURRENCY_MISMATCH");
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(DebtKind::try_from(1).unwrap(), DebtKind::Lend);
        assert!(DebtKind::try_from(0).is_err());
        assert_eq!("BORROW".parse::<DebtKind>().unwrap(), DebtKind::Borrow);
        assert_eq!(
            "INSTALLMENT".parse::<DebtStatus>().unwrap(),
            DebtStatus::Installment
        );
    }
}
