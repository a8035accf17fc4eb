//! Cashdesk Ledger Engine
//!
//! Per-user, per-currency cash balances moved by exchanges, debts and manual
//! postings. Every mutation appends balance records and runs inside one unit
//! of work, so balances never go negative and never drift from their records.

pub mod balance;
pub mod config;
pub mod debt;
pub mod engine;
pub mod exchange;
pub mod record;
pub mod store;
pub mod user;

pub use balance::{Balance, Direction};
pub use config::LedgerConfig;
pub use debt::{
    Debt, DebtAmounts, DebtInstallment, DebtKind, DebtPosting, DebtStatus, Debtor, NewDebt,
};
pub use engine::{Discrepancy, IntegrityReport, LedgerEngine};
pub use exchange::{Exchange, ExchangeAmounts, NewExchange};
pub use record::{BalanceRecord, ManualExchange, RecordKind, RecordSource};
pub use store::{LedgerStore, MemoryStore, PgStore, UnitOfWork};
pub use user::User;
