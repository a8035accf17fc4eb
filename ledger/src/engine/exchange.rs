//! Exchange flow: sell one currency, receive another.

use tracing::{info, instrument};

use cashdesk_common::{EntityKind, ExchangeId, LedgerError, Result};

use super::{apply_leg, check_leg, finish, post_leg, resolve_user, reverse_record, LedgerEngine};
use crate::balance::Direction;
use crate::exchange::{Exchange, ExchangeAmounts, NewExchange};
use crate::record::{BalanceRecord, RecordKind, RecordSource};
use crate::store::{BalanceRecordStore, ExchangeStore, LedgerStore, UnitOfWork};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Record an exchange, debiting `sold` and crediting `received`.
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    pub async fn create_exchange(&self, request: NewExchange) -> Result<Exchange> {
        check_leg(&request.sold)?;
        check_leg(&request.received)?;
        self.check_details(&request.details)?;

        let mut unit = self.store.begin().await?;
        let result = create_exchange_in(&mut unit, request).await;
        let exchange = finish(unit, "create_exchange", result).await?;

        info!(
            exchange_id = %exchange.id,
            sold = %exchange.sold,
            received = %exchange.received,
            "Exchange created"
        );
        Ok(exchange)
    }

    /// Re-post both legs of an exchange with new amounts.
    #[instrument(skip_all, fields(exchange_id = %id))]
    pub async fn update_exchange(&self, id: ExchangeId, amounts: ExchangeAmounts) -> Result<Exchange> {
        check_leg(&amounts.sold)?;
        check_leg(&amounts.received)?;

        let mut unit = self.store.begin().await?;
        let result = update_exchange_in(&mut unit, id, amounts).await;
        let exchange = finish(unit, "update_exchange", result).await?;

        info!(
            sold = %exchange.sold,
            received = %exchange.received,
            "Exchange updated"
        );
        Ok(exchange)
    }

    /// Reverse both legs and remove the exchange with its records.
    #[instrument(skip_all, fields(exchange_id = %id))]
    pub async fn delete_exchange(&self, id: ExchangeId) -> Result<Exchange> {
        let mut unit = self.store.begin().await?;
        let result = delete_exchange_in(&mut unit, id).await;
        let exchange = finish(unit, "delete_exchange", result).await?;

        info!("Exchange deleted");
        Ok(exchange)
    }

    pub async fn exchange(&self, id: ExchangeId) -> Result<Exchange> {
        let mut unit = self.store.begin().await?;
        let result = unit.exchange_by_id(id).await;
        unit.rollback().await?;
        result?.ok_or_else(|| LedgerError::not_found(EntityKind::Exchange, id))
    }

    pub async fn records_for_exchange(&self, id: ExchangeId) -> Result<Vec<BalanceRecord>> {
        let mut unit = self.store.begin().await?;
        let result = unit.records_for_exchange(id).await;
        unit.rollback().await?;
        result
    }
}

async fn create_exchange_in<U: UnitOfWork>(unit: &mut U, request: NewExchange) -> Result<Exchange> {
    let user = resolve_user(unit, request.user_id).await?;
    let exchange = Exchange::new(
        user.id,
        user.company_id,
        request.received,
        request.sold,
        request.details,
    );
    unit.create_exchange(&exchange).await?;

    let source = RecordSource::Exchange(exchange.id);
    post_leg(
        unit,
        user.id,
        &exchange.sold,
        Direction::Debit,
        source,
        exchange.details.clone(),
    )
    .await?;
    post_leg(
        unit,
        user.id,
        &exchange.received,
        Direction::Credit,
        source,
        exchange.details.clone(),
    )
    .await?;

    Ok(exchange)
}

async fn update_exchange_in<U: UnitOfWork>(
    unit: &mut U,
    id: ExchangeId,
    amounts: ExchangeAmounts,
) -> Result<Exchange> {
    let mut exchange = load_exchange(unit, id).await?;

    for mut record in unit.records_for_exchange(id).await? {
        let leg = match record.kind {
            RecordKind::Sell => &amounts.sold,
            RecordKind::Buy => &amounts.received,
        };
        let direction = record.direction();

        reverse_record(unit, &record).await?;
        let balance = apply_leg(unit, exchange.user_id, leg, direction).await?;
        record.repost(&balance, direction, leg.amount);
        unit.update_record(&record).await?;
    }

    exchange.received = amounts.received;
    exchange.sold = amounts.sold;
    exchange.updated_at = cashdesk_common::now();
    unit.update_exchange(&exchange).await?;

    Ok(exchange)
}

async fn delete_exchange_in<U: UnitOfWork>(unit: &mut U, id: ExchangeId) -> Result<Exchange> {
    let exchange = load_exchange(unit, id).await?;

    for record in unit.records_for_exchange(id).await? {
        reverse_record(unit, &record).await?;
    }
    unit.delete_records_for_exchange(id).await?;
    unit.delete_exchange(id).await?;

    Ok(exchange)
}

async fn load_exchange<U: UnitOfWork>(unit: &mut U, id: ExchangeId) -> Result<Exchange> {
    unit.exchange_by_id(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Exchange, id))
}
