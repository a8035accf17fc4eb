//! Store traits and the unit of work the engine runs inside.
//!
//! Every store operation is issued through a [`UnitOfWork`], so all reads and
//! writes of one engine call commit or roll back together.

use async_trait::async_trait;

use cashdesk_common::{
    BalanceId, CompanyId, Currency, DebtId, DebtorId, ExchangeId, RecordId, Result, UserId,
};

use crate::balance::Balance;
use crate::debt::{Debt, Debtor};
use crate::exchange::Exchange;
use crate::record::BalanceRecord;
use crate::user::User;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Per-(user, currency) running balances.
#[async_trait]
pub trait BalanceStore: Send {
    async fn create_balance(&mut self, balance: &Balance) -> Result<()>;

    async fn balance_by_id(&mut self, id: BalanceId) -> Result<Option<Balance>>;

    async fn balance_for(
        &mut self,
        user_id: UserId,
        currency: &Currency,
    ) -> Result<Option<Balance>>;

    async fn balances_for_user(&mut self, user_id: UserId) -> Result<Vec<Balance>>;

    async fn balances_for_company(&mut self, company_id: CompanyId) -> Result<Vec<Balance>>;

    async fn all_balances(&mut self) -> Result<Vec<Balance>>;

    /// Persist new totals if `balance.version` is still current.
    ///
    /// Returns the stored row with its bumped version, or
    /// `ConcurrentModification` if another unit of work got there first.
    async fn update_balance(&mut self, balance: &Balance) -> Result<Balance>;
}

/// Append-only audit log of postings.
#[async_trait]
pub trait BalanceRecordStore: Send {
    async fn create_record(&mut self, record: &BalanceRecord) -> Result<()>;

    async fn record_by_id(&mut self, id: RecordId) -> Result<Option<BalanceRecord>>;

    async fn update_record(&mut self, record: &BalanceRecord) -> Result<()>;

    async fn delete_record(&mut self, id: RecordId) -> Result<()>;

    async fn records_for_balance(&mut self, balance_id: BalanceId) -> Result<Vec<BalanceRecord>>;

    async fn records_for_exchange(&mut self, exchange_id: ExchangeId)
        -> Result<Vec<BalanceRecord>>;

    async fn records_for_debt(&mut self, debt_id: DebtId) -> Result<Vec<BalanceRecord>>;

    async fn delete_records_for_exchange(&mut self, exchange_id: ExchangeId) -> Result<u64>;

    async fn delete_records_for_debt(&mut self, debt_id: DebtId) -> Result<u64>;
}

#[async_trait]
pub trait ExchangeStore: Send {
    async fn create_exchange(&mut self, exchange: &Exchange) -> Result<()>;

    async fn exchange_by_id(&mut self, id: ExchangeId) -> Result<Option<Exchange>>;

    async fn update_exchange(&mut self, exchange: &Exchange) -> Result<()>;

    async fn delete_exchange(&mut self, id: ExchangeId) -> Result<()>;
}

#[async_trait]
pub trait DebtorStore: Send {
    async fn create_debtor(&mut self, debtor: &Debtor) -> Result<()>;

    async fn debtor_by_id(&mut self, id: DebtorId) -> Result<Option<Debtor>>;

    async fn debtors_for_user(&mut self, user_id: UserId) -> Result<Vec<Debtor>>;

    /// Same optimistic contract as [`BalanceStore::update_balance`].
    async fn update_debtor(&mut self, debtor: &Debtor) -> Result<Debtor>;
}

#[async_trait]
pub trait DebtStore: Send {
    async fn create_debt(&mut self, debt: &Debt) -> Result<()>;

    async fn debt_by_id(&mut self, id: DebtId) -> Result<Option<Debt>>;

    async fn debts_for_debtor(&mut self, debtor_id: DebtorId) -> Result<Vec<Debt>>;

    async fn update_debt(&mut self, debt: &Debt) -> Result<()>;

    async fn delete_debt(&mut self, id: DebtId) -> Result<()>;
}

/// Read-only access to users, owned by the surrounding application.
#[async_trait]
pub trait UserStore: Send {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>>;
}

/// One atomic group of store operations.
#[async_trait]
pub trait UnitOfWork:
    BalanceStore + BalanceRecordStore + ExchangeStore + DebtorStore + DebtStore + UserStore + Sized
{
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Source of units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Unit: UnitOfWork;

    async fn begin(&self) -> Result<Self::Unit>;
}
