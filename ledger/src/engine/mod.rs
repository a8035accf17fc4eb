//! Core ledger engine implementation.
//!
//! Every mutating operation runs in one unit of work: it reads balances,
//! checks sufficiency, writes new totals and their balance records, and then
//! commits or rolls back as a whole.

use tracing::{error, info, instrument, warn};

use cashdesk_common::{
    BalanceId, CompanyId, Currency, EntityKind, LedgerError, Money, Result, UserId,
};

use crate::balance::{check_positive, Balance, Direction};
use crate::config::LedgerConfig;
use crate::record::{BalanceRecord, RecordSource};
use crate::store::{BalanceRecordStore, BalanceStore, LedgerStore, UnitOfWork};
use crate::user::User;

mod debt;
mod exchange;
mod reconcile;
mod records;

pub use reconcile::{Discrepancy, IntegrityReport};

/// The ledger engine moves money between balances with a full audit trail.
pub struct LedgerEngine<S: LedgerStore> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Create a new ledger engine.
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open a zero balance for a user in a currency.
    #[instrument(skip_all, fields(user_id = %user_id, currency = %currency))]
    pub async fn open_balance(&self, user_id: UserId, currency: Currency) -> Result<Balance> {
        if !currency.is_valid() {
            return Err(LedgerError::invalid_request(
                format!("'{currency}' is not a currency code"),
                "currency",
            ));
        }

        let mut unit = self.store.begin().await?;
        let result = async {
            let user = resolve_user(&mut unit, user_id).await?;
            let balance = Balance::zero(user.id, user.company_id, currency);
            unit.create_balance(&balance).await?;
            Ok::<_, LedgerError>(balance)
        }
        .await;
        let balance = finish(unit, "open_balance", result).await?;

        info!(balance_id = %balance.id, "Balance opened");
        Ok(balance)
    }

    /// Get a user's balance in one currency.
    pub async fn balance(&self, user_id: UserId, currency: &Currency) -> Result<Balance> {
        let mut unit = self.store.begin().await?;
        let result = load_balance(&mut unit, user_id, currency).await;
        unit.rollback().await?;
        result
    }

    pub async fn balance_by_id(&self, id: BalanceId) -> Result<Balance> {
        let mut unit = self.store.begin().await?;
        let result = unit.balance_by_id(id).await;
        unit.rollback().await?;
        result?.ok_or_else(|| LedgerError::not_found(EntityKind::Balance, id))
    }

    pub async fn balances_for_user(&self, user_id: UserId) -> Result<Vec<Balance>> {
        let mut unit = self.store.begin().await?;
        let result = unit.balances_for_user(user_id).await;
        unit.rollback().await?;
        result
    }

    pub async fn balances_for_company(&self, company_id: CompanyId) -> Result<Vec<Balance>> {
        let mut unit = self.store.begin().await?;
        let result = unit.balances_for_company(company_id).await;
        unit.rollback().await?;
        result
    }

    /// Get the audit trail of one balance.
    pub async fn records_for_balance(&self, balance_id: BalanceId) -> Result<Vec<BalanceRecord>> {
        let mut unit = self.store.begin().await?;
        let result = unit.records_for_balance(balance_id).await;
        unit.rollback().await?;
        result
    }

    fn check_details(&self, details: &Option<String>) -> Result<()> {
        if let Some(details) = details {
            if details.chars().count() > self.config.max_details_len {
                return Err(LedgerError::invalid_request(
                    format!(
                        "details longer than {} characters",
                        self.config.max_details_len
                    ),
                    "details",
                ));
            }
        }
        Ok(())
    }
}

/// Commit on success, roll back on failure.
async fn finish<U: UnitOfWork, T>(unit: U, operation: &'static str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            if let Err(err) = unit.commit().await {
                warn!(
                    operation,
                    code = err.error_code(),
                    error = %err,
                    "Commit failed"
                );
                return Err(err);
            }
            Ok(value)
        }
        Err(err) => {
            warn!(
                operation,
                code = err.error_code(),
                error = %err,
                "Rolling back unit of work"
            );
            if let Err(rollback_err) = unit.rollback().await {
                error!(operation, error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

fn check_leg(leg: &Money) -> Result<()> {
    check_positive(leg.amount)
}

async fn resolve_user<U: UnitOfWork>(unit: &mut U, user_id: UserId) -> Result<User> {
    unit.user_by_id(user_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::User, user_id))
}

async fn load_balance<U: UnitOfWork>(
    unit: &mut U,
    user_id: UserId,
    currency: &Currency,
) -> Result<Balance> {
    unit.balance_for(user_id, currency)
        .await?
        .ok_or_else(|| LedgerError::CurrencyNotFound {
            user_id,
            currency: currency.clone(),
        })
}

/// Apply one leg to the user's balance in the leg's currency and persist it.
async fn apply_leg<U: UnitOfWork>(
    unit: &mut U,
    user_id: UserId,
    leg: &Money,
    direction: Direction,
) -> Result<Balance> {
    let mut balance = load_balance(unit, user_id, &leg.currency).await?;
    balance.apply(direction, leg.amount)?;
    unit.update_balance(&balance).await
}

/// Apply one leg and append its balance record.
async fn post_leg<U: UnitOfWork>(
    unit: &mut U,
    user_id: UserId,
    leg: &Money,
    direction: Direction,
    source: RecordSource,
    details: Option<String>,
) -> Result<BalanceRecord> {
    let balance = apply_leg(unit, user_id, leg, direction).await?;
    let record = BalanceRecord::posted(&balance, direction, leg.amount, source, details);
    unit.create_record(&record).await?;
    Ok(record)
}

/// Undo the balance effect of a record. The record itself is left alone.
async fn reverse_record<U: UnitOfWork>(unit: &mut U, record: &BalanceRecord) -> Result<Balance> {
    let mut balance = unit
        .balance_by_id(record.balance_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Balance, record.balance_id))?;
    balance.reverse(record.direction(), record.amount)?;
    unit.update_balance(&balance).await
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::record::RecordKind;
    use crate::store::MemoryStore;

    pub(crate) struct Fixture {
        pub engine: LedgerEngine<MemoryStore>,
        pub user: User,
    }

    pub(crate) fn fixture() -> Fixture {
        fixture_with(LedgerConfig::default())
    }

    pub(crate) fn fixture_with(config: LedgerConfig) -> Fixture {
        let store = MemoryStore::new();
        let user = User::new(CompanyId::new());
        store.insert_user(user.clone());
        Fixture {
            engine: LedgerEngine::new(store, config),
            user,
        }
    }

    impl Fixture {
        /// Open a balance and deposit `amount` into it.
        pub(crate) async fn fund(&self, currency: Currency, amount: i64) -> Balance {
            let balance = self
                .engine
                .open_balance(self.user.id, currency.clone())
                .await
                .unwrap();
            if amount > 0 {
                self.engine
                    .post_balance_record(
                        self.user.id,
                        RecordKind::Buy,
                        Money::new(amount, currency),
                        Some("opening deposit".to_string()),
                    )
                    .await
                    .unwrap();
            }
            balance
        }

        pub(crate) async fn amount(&self, currency: &Currency) -> i64 {
            self.engine
                .balance(self.user.id, currency)
                .await
                .unwrap()
                .balance
        }

        pub(crate) async fn record_count(&self, balance_id: BalanceId) -> usize {
            self.engine
                .records_for_balance(balance_id)
                .await
                .unwrap()
                .len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::fixture;
    use super::*;

    #[tokio::test]
    async fn test_open_balance() {
        let fx = fixture();
        let balance = fx
            .engine
            .open_balance(fx.user.id, Currency::usd())
            .await
            .unwrap();

        assert_eq!(balance.balance, 0);
        assert_eq!(balance.company_id, fx.user.company_id);

        let err = fx
            .engine
            .open_balance(fx.user.id, Currency::usd())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::BalanceExists { .. }));

        let listed = fx
            .engine
            .balances_for_company(fx.user.company_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_open_balance_rejects_unknown_user_and_bad_code() {
        let fx = fixture();
        let err = fx
            .engine
            .open_balance(UserId::new(), Currency::usd())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::EntityNotFound {
                entity: EntityKind::User,
                ..
            }
        ));

        let err = fx
            .engine
            .open_balance(fx.user.id, Currency::new("dollars"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_missing_balance_is_currency_not_found() {
        let fx = fixture();
        let err = fx
            .engine
            .balance(fx.user.id, &Currency::rub())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::CurrencyNotFound { .. }));
    }
}
