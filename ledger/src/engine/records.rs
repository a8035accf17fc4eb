//! Manual postings and direct record maintenance.

use tracing::{info, instrument};

use cashdesk_common::{EntityKind, LedgerError, Money, RecordId, Result, TransactionId, UserId};

use super::{apply_leg, check_leg, finish, post_leg, resolve_user, reverse_record, LedgerEngine};
use crate::balance::{Balance, Direction};
use crate::record::{BalanceRecord, ManualExchange, RecordKind, RecordSource};
use crate::store::{BalanceRecordStore, LedgerStore, UnitOfWork};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Two-leg posting without a parent exchange. Returns the Sell and Buy records.
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn perform_balance_record(
        &self,
        request: ManualExchange,
    ) -> Result<Vec<BalanceRecord>> {
        check_leg(&request.sold)?;
        check_leg(&request.received)?;
        self.check_details(&request.details)?;

        let mut unit = self.store.begin().await?;
        let result = perform_in(&mut unit, request).await;
        let records = finish(unit, "perform_balance_record", result).await?;

        info!(legs = records.len(), "Manual exchange posted");
        Ok(records)
    }

    /// Single-leg manual posting, e.g. a cash deposit or withdrawal.
    #[instrument(skip_all, fields(user_id = %user_id, kind = %kind, money = %money))]
    pub async fn post_balance_record(
        &self,
        user_id: UserId,
        kind: RecordKind,
        money: Money,
        details: Option<String>,
    ) -> Result<BalanceRecord> {
        check_leg(&money)?;
        self.check_details(&details)?;

        let mut unit = self.store.begin().await?;
        let result = async {
            let user = resolve_user(&mut unit, user_id).await?;
            post_leg(
                &mut unit,
                user.id,
                &money,
                kind.direction(),
                RecordSource::Manual,
                details,
            )
            .await
        }
        .await;
        let record = finish(unit, "post_balance_record", result).await?;

        info!(record_id = %record.id, "Balance record posted");
        Ok(record)
    }

    /// Undo a manual record and delete it. Returns the adjusted balance.
    #[instrument(skip_all, fields(record_id = %id))]
    pub async fn rollback_record(&self, id: RecordId) -> Result<Balance> {
        let mut unit = self.store.begin().await?;
        let result = async {
            let record = load_manual_record(&mut unit, id).await?;
            let balance = reverse_record(&mut unit, &record).await?;
            unit.delete_record(id).await?;
            Ok::<_, LedgerError>(balance)
        }
        .await;
        let balance = finish(unit, "rollback_record", result).await?;

        info!(balance_id = %balance.id, balance = balance.balance, "Balance record rolled back");
        Ok(balance)
    }

    /// Re-post a manual record with a new kind and amount.
    #[instrument(skip_all, fields(record_id = %id, kind = %kind, money = %money))]
    pub async fn update_record(
        &self,
        id: RecordId,
        kind: RecordKind,
        money: Money,
    ) -> Result<BalanceRecord> {
        check_leg(&money)?;

        let mut unit = self.store.begin().await?;
        let result = update_record_in(&mut unit, id, kind, money).await;
        let record = finish(unit, "update_record", result).await?;

        info!(balance_id = %record.balance_id, "Balance record updated");
        Ok(record)
    }

    pub async fn record(&self, id: RecordId) -> Result<BalanceRecord> {
        let mut unit = self.store.begin().await?;
        let result = unit.record_by_id(id).await;
        unit.rollback().await?;
        result?.ok_or_else(|| LedgerError::not_found(EntityKind::BalanceRecord, id))
    }
}

async fn perform_in<U: UnitOfWork>(
    unit: &mut U,
    request: ManualExchange,
) -> Result<Vec<BalanceRecord>> {
    let user = resolve_user(unit, request.user_id).await?;
    let source = RecordSource::Transaction(TransactionId::new());

    let sell = post_leg(
        unit,
        user.id,
        &request.sold,
        Direction::Debit,
        source,
        request.details.clone(),
    )
    .await?;
    let buy = post_leg(
        unit,
        user.id,
        &request.received,
        Direction::Credit,
        source,
        request.details,
    )
    .await?;

    Ok(vec![sell, buy])
}

async fn update_record_in<U: UnitOfWork>(
    unit: &mut U,
    id: RecordId,
    kind: RecordKind,
    money: Money,
) -> Result<BalanceRecord> {
    let mut record = load_manual_record(unit, id).await?;

    reverse_record(unit, &record).await?;
    let direction = kind.direction();
    let balance = apply_leg(unit, record.user_id, &money, direction).await?;
    record.repost(&balance, direction, money.amount);
    unit.update_record(&record).await?;

    Ok(record)
}

/// Load a record that may be changed directly.
async fn load_manual_record<U: UnitOfWork>(unit: &mut U, id: RecordId) -> Result<BalanceRecord> {
    let record = unit
        .record_by_id(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::BalanceRecord, id))?;
    if record.source.is_owned() {
        return Err(LedgerError::SourceOwned(id));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::fixture;
    use super::*;
    use crate::exchange::NewExchange;
    use cashdesk_common::Currency;

    #[tokio::test]
    async fn test_perform_balance_record_shares_transaction() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        fx.fund(Currency::rub(), 0).await;

        let records = fx
            .engine
            .perform_balance_record(ManualExchange {
                user_id: fx.user.id,
                received: Money::new(9_000, Currency::rub()),
                sold: Money::new(100, Currency::usd()),
                details: None,
            })
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, RecordKind::Sell);
        assert_eq!(records[1].kind, RecordKind::Buy);
        assert_eq!(records[0].source, records[1].source);
        assert!(records[0].source.transaction_id().is_some());
        assert_eq!(fx.amount(&Currency::usd()).await, 900);
        assert_eq!(fx.amount(&Currency::rub()).await, 9_000);
    }

    #[tokio::test]
    async fn test_rollback_sell_record_credits_back() {
        let fx = fixture();
        let balance = fx.fund(Currency::usd(), 1_000).await;
        let record = fx
            .engine
            .post_balance_record(
                fx.user.id,
                RecordKind::Sell,
                Money::new(250, Currency::usd()),
                None,
            )
            .await
            .unwrap();
        assert_eq!(fx.amount(&Currency::usd()).await, 750);

        let restored = fx.engine.rollback_record(record.id).await.unwrap();

        assert_eq!(restored.balance, 1_000);
        assert_eq!(restored.in_out_lay, 0);
        assert_eq!(fx.record_count(balance.id).await, 1);
        let err = fx.engine.record(record.id).await.unwrap_err();
        assert_eq!(err.error_code(), "ENTITY_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_rollback_buy_record_requires_funds() {
        let fx = fixture();
        fx.fund(Currency::usd(), 0).await;
        let deposit = fx
            .engine
            .post_balance_record(
                fx.user.id,
                RecordKind::Buy,
                Money::new(500, Currency::usd()),
                None,
            )
            .await
            .unwrap();
        fx.engine
            .post_balance_record(
                fx.user.id,
                RecordKind::Sell,
                Money::new(200, Currency::usd()),
                None,
            )
            .await
            .unwrap();

        let err = fx.engine.rollback_record(deposit.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(fx.amount(&Currency::usd()).await, 300);
        assert!(fx.engine.record(deposit.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_owned_records_are_protected() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        fx.fund(Currency::uzs(), 0).await;
        let exchange = fx
            .engine
            .create_exchange(NewExchange {
                user_id: fx.user.id,
                received: Money::new(1_250_000, Currency::uzs()),
                sold: Money::new(100, Currency::usd()),
                details: None,
            })
            .await
            .unwrap();
        let record = fx.engine.records_for_exchange(exchange.id).await.unwrap()[0].clone();

        let err = fx.engine.rollback_record(record.id).await.unwrap_err();
        assert!(matches!(err, LedgerError::SourceOwned(id) if id == record.id));

        let err = fx
            .engine
            .update_record(record.id, RecordKind::Sell, Money::new(1, Currency::usd()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "SOURCE_OWNED");
        assert_eq!(fx.amount(&Currency::usd()).await, 900);
    }

    #[tokio::test]
    async fn test_update_record_moves_between_balances() {
        let fx = fixture();
        let usd = fx.fund(Currency::usd(), 0).await;
        let eur = fx.fund(Currency::eur(), 0).await;
        let record = fx
            .engine
            .post_balance_record(
                fx.user.id,
                RecordKind::Buy,
                Money::new(1_000, Currency::usd()),
                None,
            )
            .await
            .unwrap();

        let updated = fx
            .engine
            .update_record(record.id, RecordKind::Buy, Money::new(400, Currency::eur()))
            .await
            .unwrap();

        assert_eq!(updated.id, record.id);
        assert_eq!(updated.balance_id, eur.id);
        assert_eq!(fx.amount(&Currency::usd()).await, 0);
        assert_eq!(fx.amount(&Currency::eur()).await, 400);
        assert_eq!(fx.record_count(usd.id).await, 0);
        assert_eq!(fx.record_count(eur.id).await, 1);
        assert!(fx.engine.verify_integrity().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_update_record_fails_closed() {
        let fx = fixture();
        fx.fund(Currency::usd(), 100).await;
        let record = fx
            .engine
            .post_balance_record(
                fx.user.id,
                RecordKind::Sell,
                Money::new(50, Currency::usd()),
                None,
            )
            .await
            .unwrap();

        let err = fx
            .engine
            .update_record(record.id, RecordKind::Sell, Money::new(150, Currency::usd()))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(fx.amount(&Currency::usd()).await, 50);
        assert_eq!(fx.engine.record(record.id).await.unwrap().amount, 50);
    }

    #[tokio::test]
    async fn test_unknown_record() {
        let fx = fixture();
        let err = fx.engine.rollback_record(RecordId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::EntityNotFound {
                entity: EntityKind::BalanceRecord,
                ..
            }
        ));
    }
}
