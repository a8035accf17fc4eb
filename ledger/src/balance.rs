//! Per-(user, currency) running balances and the leg primitive.

use cashdesk_common::{
    BalanceId, CompanyId, Currency, LedgerError, Result, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

/// Direction of one leg against a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Money leaves the balance.
    Debit,
    /// Money enters the balance.
    Credit,
}

/// A user's balance in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub currency: Currency,
    /// Current funds in minor units.
    pub balance: i64,
    /// Cumulative outgoing amount.
    pub in_out_lay: i64,
    /// Cumulative incoming amount.
    pub out_in_lay: i64,
    /// Optimistic concurrency token, bumped by every store update.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Balance {
    /// Create a new zero balance.
    pub fn zero(user_id: UserId, company_id: CompanyId, currency: Currency) -> Self {
        let now = cashdesk_common::now();
        Self {
            id: BalanceId::new(),
            user_id,
            company_id,
            currency,
            balance: 0,
            in_out_lay: 0,
            out_in_lay: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the balance covers a debit of `amount`.
    pub fn has_sufficient_funds(&self, amount: i64) -> bool {
        self.balance >= amount
    }

    /// Apply one leg.
    ///
    /// Debit: `balance -= amount`, `in_out_lay += amount`, requires funds.
    /// Credit: `balance += amount`, `out_in_lay += amount`.
    pub fn apply(&mut self, direction: Direction, amount: i64) -> Result<()> {
        check_positive(amount)?;
        match direction {
            Direction::Debit => {
                self.ensure_funds(amount)?;
                self.balance = self.checked(self.balance.checked_sub(amount))?;
                self.in_out_lay = self.checked(self.in_out_lay.checked_add(amount))?;
            }
            Direction::Credit => {
                self.balance = self.checked(self.balance.checked_add(amount))?;
                self.out_in_lay = self.checked(self.out_in_lay.checked_add(amount))?;
            }
        }
        self.updated_at = cashdesk_common::now();
        Ok(())
    }

    /// Undo one leg previously applied with the same direction and amount.
    ///
    /// Reversing a credit takes the money back out and so requires funds.
    pub fn reverse(&mut self, direction: Direction, amount: i64) -> Result<()> {
        check_positive(amount)?;
        match direction {
            Direction::Debit => {
                self.balance = self.checked(self.balance.checked_add(amount))?;
                self.in_out_lay = self.checked(self.in_out_lay.checked_sub(amount))?;
            }
            Direction::Credit => {
                self.ensure_funds(amount)?;
                self.balance = self.checked(self.balance.checked_sub(amount))?;
                self.out_in_lay = self.checked(self.out_in_lay.checked_sub(amount))?;
            }
        }
        self.updated_at = cashdesk_common::now();
        Ok(())
    }

    fn ensure_funds(&self, amount: i64) -> Result<()> {
        if !self.has_sufficient_funds(amount) {
            return Err(LedgerError::InsufficientFunds {
                balance_id: self.id,
                available: self.balance,
                required: amount,
            });
        }
        Ok(())
    }

    fn checked(&self, value: Option<i64>) -> Result<i64> {
        value.ok_or_else(|| LedgerError::AmountOverflow(format!("balance {}", self.id)))
    }
}

pub(crate) fn check_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount { amount });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(amount: i64) -> Balance {
        let mut balance = Balance::zero(UserId::new(), CompanyId::new(), Currency::usd());
        balance.apply(Direction::Credit, amount).unwrap();
        balance
    }

    #[test]
    fn test_apply_and_reverse() {
        let mut balance = funded(1_000);
        assert_eq!(balance.out_in_lay, 1_000);

        balance.apply(Direction::Debit, 400).unwrap();
        assert_eq!(balance.balance, 600);
        assert_eq!(balance.in_out_lay, 400);

        balance.reverse(Direction::Debit, 400).unwrap();
        assert_eq!(balance.balance, 1_000);
        assert_eq!(balance.in_out_lay, 0);

        balance.reverse(Direction::Credit, 1_000).unwrap();
        assert_eq!(balance.balance, 0);
        assert_eq!(balance.out_in_lay, 0);
    }

    #[test]
    fn test_debit_requires_funds() {
        let mut balance = funded(100);
        let err = balance.apply(Direction::Debit, 150).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                available: 100,
                required: 150,
                ..
            }
        ));
        assert_eq!(balance.balance, 100);
        assert_eq!(balance.in_out_lay, 0);
    }

    #[test]
    fn test_credit_reversal_requires_funds() {
        let mut balance = funded(500);
        balance.apply(Direction::Debit, 300).unwrap();
        let err = balance.reverse(Direction::Credit, 500).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_FUNDS");
        assert_eq!(balance.balance, 200);
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        let mut balance = funded(100);
        assert!(matches!(
            balance.apply(Direction::Credit, 0),
            Err(LedgerError::InvalidAmount { amount: 0 })
        ));
        assert!(balance.reverse(Direction::Debit, -5).is_err());
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut balance = funded(i64::MAX);
        let err = balance.apply(Direction::Credit, 1).unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OVERFLOW");
        assert_eq!(balance.balance, i64::MAX);
    }
}
