//! Debt flow: lending to and borrowing from debtors.
//!
//! A debt carries a nominal amount in the debtor's currency and any number of
//! currency legs actually moved against the user's balances. Lend legs debit
//! the user, borrow legs credit them.

use tracing::{info, instrument};

use cashdesk_common::{DebtId, DebtorId, EntityKind, LedgerError, Money, Result, UserId};

use super::{check_leg, finish, post_leg, resolve_user, reverse_record, LedgerEngine};
use crate::debt::{
    Debt, DebtAmounts, DebtInstallment, DebtPosting, DebtStatus, Debtor, NewDebt,
};
use crate::record::{BalanceRecord, RecordSource};
use crate::store::{BalanceRecordStore, DebtStore, DebtorStore, LedgerStore, UnitOfWork};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Open a debt relationship with a new debtor.
    #[instrument(skip_all, fields(user_id = %request.user_id, kind = %request.kind))]
    pub async fn create_debt(&self, request: NewDebt) -> Result<DebtPosting> {
        if request.debtor_name.trim().is_empty() {
            return Err(LedgerError::invalid_request(
                "debtor name is required",
                "debtor_name",
            ));
        }
        self.check_debt_input(&request.debted, &request.received, &request.details)?;

        let mut unit = self.store.begin().await?;
        let result = create_debt_in(&mut unit, request).await;
        let posting = finish(unit, "create_debt", result).await?;

        info!(
            debtor_id = %posting.debtor.id,
            debt_id = %posting.debt.id,
            debtor_balance = posting.debtor.balance,
            legs = posting.records.len(),
            "Debt created"
        );
        Ok(posting)
    }

    /// Post an installment against an existing debtor.
    #[instrument(skip_all, fields(debtor_id = %request.debtor_id, kind = %request.kind))]
    pub async fn settle_debt(&self, request: DebtInstallment) -> Result<DebtPosting> {
        self.check_debt_input(&request.debted, &request.received, &request.details)?;

        let mut unit = self.store.begin().await?;
        let result = settle_debt_in(&mut unit, request).await;
        let posting = finish(unit, "settle_debt", result).await?;

        info!(
            debt_id = %posting.debt.id,
            debtor_balance = posting.debtor.balance,
            legs = posting.records.len(),
            "Debt installment posted"
        );
        Ok(posting)
    }

    /// Replace the amounts and legs of a debt.
    #[instrument(skip_all, fields(debt_id = %id, kind = %amounts.kind))]
    pub async fn update_debt(&self, id: DebtId, amounts: DebtAmounts) -> Result<DebtPosting> {
        self.check_debt_input(&amounts.debted, &amounts.received, &None)?;

        let mut unit = self.store.begin().await?;
        let result = update_debt_in(&mut unit, id, amounts).await;
        let posting = finish(unit, "update_debt", result).await?;

        info!(
            debtor_balance = posting.debtor.balance,
            legs = posting.records.len(),
            "Debt updated"
        );
        Ok(posting)
    }

    /// Reverse a debt's legs and remove it. Returns the adjusted debtor.
    #[instrument(skip_all, fields(debt_id = %id))]
    pub async fn delete_debt(&self, id: DebtId) -> Result<Debtor> {
        let mut unit = self.store.begin().await?;
        let result = delete_debt_in(&mut unit, id).await;
        let debtor = finish(unit, "delete_debt", result).await?;

        info!(
            debtor_id = %debtor.id,
            debtor_balance = debtor.balance,
            "Debt deleted"
        );
        Ok(debtor)
    }

    pub async fn debtor(&self, id: DebtorId) -> Result<Debtor> {
        let mut unit = self.store.begin().await?;
        let result = unit.debtor_by_id(id).await;
        unit.rollback().await?;
        result?.ok_or_else(|| LedgerError::not_found(EntityKind::Debtor, id))
    }

    pub async fn debt(&self, id: DebtId) -> Result<Debt> {
        let mut unit = self.store.begin().await?;
        let result = unit.debt_by_id(id).await;
        unit.rollback().await?;
        result?.ok_or_else(|| LedgerError::not_found(EntityKind::Debt, id))
    }

    pub async fn debtors_for_user(&self, user_id: UserId) -> Result<Vec<Debtor>> {
        let mut unit = self.store.begin().await?;
        let result = unit.debtors_for_user(user_id).await;
        unit.rollback().await?;
        result
    }

    pub async fn debts_for_debtor(&self, debtor_id: DebtorId) -> Result<Vec<Debt>> {
        let mut unit = self.store.begin().await?;
        let result = unit.debts_for_debtor(debtor_id).await;
        unit.rollback().await?;
        result
    }

    pub async fn records_for_debt(&self, id: DebtId) -> Result<Vec<BalanceRecord>> {
        let mut unit = self.store.begin().await?;
        let result = unit.records_for_debt(id).await;
        unit.rollback().await?;
        result
    }

    fn check_debt_input(
        &self,
        debted: &Money,
        received: &[Money],
        details: &Option<String>,
    ) -> Result<()> {
        check_leg(debted)?;
        if received.len() > self.config.max_debt_legs {
            return Err(LedgerError::invalid_request(
                format!(
                    "a debt carries at most {} legs, got {}",
                    self.config.max_debt_legs,
                    received.len()
                ),
                "received",
            ));
        }
        for leg in received {
            check_leg(leg)?;
        }
        self.check_details(details)
    }
}

async fn create_debt_in<U: UnitOfWork>(unit: &mut U, request: NewDebt) -> Result<DebtPosting> {
    let user = resolve_user(unit, request.user_id).await?;

    let mut debtor = Debtor::new(
        user.id,
        user.company_id,
        request.debtor_name.trim(),
        request.debtor_phone,
        request.debted.currency.clone(),
    );
    debtor.adjust(request.kind.signed(request.debted.amount))?;
    unit.create_debtor(&debtor).await?;

    let debt = Debt::new(
        &debtor,
        request.kind,
        DebtStatus::Opening,
        &request.debted,
        &request.received,
        request.details,
    );
    unit.create_debt(&debt).await?;
    let records = post_debt_legs(unit, &debt, &request.received).await?;

    Ok(DebtPosting {
        debtor,
        debt,
        records,
    })
}

async fn settle_debt_in<U: UnitOfWork>(
    unit: &mut U,
    request: DebtInstallment,
) -> Result<DebtPosting> {
    let mut debtor = load_debtor(unit, request.debtor_id).await?;
    debtor.ensure_currency(&request.debted.currency)?;

    let debt = Debt::new(
        &debtor,
        request.kind,
        DebtStatus::Installment,
        &request.debted,
        &request.received,
        request.details,
    );
    unit.create_debt(&debt).await?;
    let records = post_debt_legs(unit, &debt, &request.received).await?;

    debtor.adjust(debt.debted.amount)?;
    let debtor = unit.update_debtor(&debtor).await?;

    Ok(DebtPosting {
        debtor,
        debt,
        records,
    })
}

async fn update_debt_in<U: UnitOfWork>(
    unit: &mut U,
    id: DebtId,
    amounts: DebtAmounts,
) -> Result<DebtPosting> {
    let mut debt = load_debt(unit, id).await?;
    let mut debtor = load_debtor(unit, debt.debtor_id).await?;
    debtor.ensure_currency(&amounts.debted.currency)?;

    unpost_debt(unit, &debt, &mut debtor).await?;

    debt.reset(amounts.kind, &amounts.debted, &amounts.received);
    let records = post_debt_legs(unit, &debt, &amounts.received).await?;
    debtor.adjust(debt.debted.amount)?;

    let debtor = unit.update_debtor(&debtor).await?;
    unit.update_debt(&debt).await?;

    Ok(DebtPosting {
        debtor,
        debt,
        records,
    })
}

async fn delete_debt_in<U: UnitOfWork>(unit: &mut U, id: DebtId) -> Result<Debtor> {
    let debt = load_debt(unit, id).await?;
    let mut debtor = load_debtor(unit, debt.debtor_id).await?;

    unpost_debt(unit, &debt, &mut debtor).await?;
    let debtor = unit.update_debtor(&debtor).await?;
    unit.delete_debt(id).await?;

    Ok(debtor)
}

/// Post each leg in the debt's direction, tagged with the debt.
async fn post_debt_legs<U: UnitOfWork>(
    unit: &mut U,
    debt: &Debt,
    legs: &[Money],
) -> Result<Vec<BalanceRecord>> {
    let direction = debt.kind.direction();
    let mut records = Vec::with_capacity(legs.len());
    for leg in legs {
        let record = post_leg(
            unit,
            debt.user_id,
            leg,
            direction,
            RecordSource::Debt(debt.id),
            debt.details.clone(),
        )
        .await?;
        records.push(record);
    }
    Ok(records)
}

/// Undo a debt's legs and its effect on the debtor, dropping its records.
async fn unpost_debt<U: UnitOfWork>(unit: &mut U, debt: &Debt, debtor: &mut Debtor) -> Result<()> {
    for record in unit.records_for_debt(debt.id).await? {
        reverse_record(unit, &record).await?;
    }
    unit.delete_records_for_debt(debt.id).await?;
    debtor.adjust(-debt.debted.amount)
}

async fn load_debtor<U: UnitOfWork>(unit: &mut U, id: DebtorId) -> Result<Debtor> {
    unit.debtor_by_id(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Debtor, id))
}

async fn load_debt<U: UnitOfWork>(unit: &mut U, id: DebtId) -> Result<Debt> {
    unit.debt_by_id(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(EntityKind::Debt, id))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{fixture, fixture_with};
    use super::*;
    use crate::config::LedgerConfig;
    use crate::debt::DebtKind;
    use crate::record::RecordKind;
    use cashdesk_common::Currency;

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::usd())
    }

    fn lend(user_id: UserId, debted: i64, legs: Vec<Money>) -> NewDebt {
        NewDebt {
            user_id,
            debtor_name: "Aziz".to_string(),
            debtor_phone: Some("+998 90 000 00 00".to_string()),
            kind: DebtKind::Lend,
            debted: usd(debted),
            received: legs,
            details: None,
        }
    }

    #[tokio::test]
    async fn test_lend_debits_balance_and_seeds_debtor() {
        let fx = fixture();
        let usd_balance = fx.fund(Currency::usd(), 1_000).await;

        let posting = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        assert_eq!(fx.amount(&Currency::usd()).await, 700);
        assert_eq!(posting.debtor.balance, -300);
        assert_eq!(posting.debt.debted.amount, -300);
        assert_eq!(posting.debt.received, vec![usd(-300)]);
        assert_eq!(posting.debt.status, DebtStatus::Opening);

        assert_eq!(posting.records.len(), 1);
        let record = &posting.records[0];
        assert_eq!(record.kind, RecordKind::Sell);
        assert_eq!(record.amount, 300);
        assert_eq!(record.balance_id, usd_balance.id);
        assert_eq!(record.source, RecordSource::Debt(posting.debt.id));

        let stored = fx.engine.debtor(posting.debtor.id).await.unwrap();
        assert_eq!(stored.balance, -300);
        assert_eq!(stored.currency, Currency::usd());
    }

    #[tokio::test]
    async fn test_lend_across_currencies() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        fx.fund(Currency::uzs(), 2_000_000).await;

        let posting = fx
            .engine
            .create_debt(lend(
                fx.user.id,
                100,
                vec![usd(60), Money::new(500_000, Currency::uzs())],
            ))
            .await
            .unwrap();

        assert_eq!(fx.amount(&Currency::usd()).await, 940);
        assert_eq!(fx.amount(&Currency::uzs()).await, 1_500_000);
        assert_eq!(posting.debtor.balance, -100);
        assert_eq!(posting.records.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_lend_leaves_no_debtor() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        fx.fund(Currency::uzs(), 100).await;

        let err = fx
            .engine
            .create_debt(lend(
                fx.user.id,
                100,
                vec![usd(60), Money::new(500_000, Currency::uzs())],
            ))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(fx.amount(&Currency::usd()).await, 1_000);
        assert!(fx
            .engine
            .debtors_for_user(fx.user.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_debt_without_legs_moves_no_cash() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;

        let posting = fx
            .engine
            .create_debt(lend(fx.user.id, 250, vec![]))
            .await
            .unwrap();

        assert_eq!(fx.amount(&Currency::usd()).await, 1_000);
        assert_eq!(posting.debtor.balance, -250);
        assert!(posting.records.is_empty());
    }

    #[tokio::test]
    async fn test_settle_debt_repays_debtor() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let settled = fx
            .engine
            .settle_debt(DebtInstallment {
                debtor_id: opened.debtor.id,
                kind: DebtKind::Borrow,
                debted: usd(300),
                received: vec![usd(300)],
                details: Some("repaid in cash".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(fx.amount(&Currency::usd()).await, 1_000);
        assert_eq!(settled.debtor.balance, 0);
        assert_eq!(settled.debt.status, DebtStatus::Installment);
        assert_eq!(settled.records[0].kind, RecordKind::Buy);

        let debts = fx.engine.debts_for_debtor(opened.debtor.id).await.unwrap();
        assert_eq!(debts.len(), 2);
    }

    #[tokio::test]
    async fn test_settle_debt_rejects_other_currency() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        fx.fund(Currency::rub(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let err = fx
            .engine
            .settle_debt(DebtInstallment {
                debtor_id: opened.debtor.id,
                kind: DebtKind::Borrow,
                debted: Money::new(300, Currency::rub()),
                received: vec![Money::new(300, Currency::rub())],
                details: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
        assert_eq!(fx.amount(&Currency::rub()).await, 1_000);
        let debtor = fx.engine.debtor(opened.debtor.id).await.unwrap();
        assert_eq!(debtor.balance, -300);
        let debts = fx.engine.debts_for_debtor(opened.debtor.id).await.unwrap();
        assert_eq!(debts.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_unknown_debtor() {
        let fx = fixture();
        let err = fx
            .engine
            .settle_debt(DebtInstallment {
                debtor_id: DebtorId::new(),
                kind: DebtKind::Borrow,
                debted: usd(1),
                received: vec![],
                details: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::EntityNotFound {
                entity: EntityKind::Debtor,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_debt_reposts_legs() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let updated = fx
            .engine
            .update_debt(
                opened.debt.id,
                DebtAmounts {
                    kind: DebtKind::Lend,
                    debted: usd(200),
                    received: vec![usd(200)],
                },
            )
            .await
            .unwrap();

        assert_eq!(fx.amount(&Currency::usd()).await, 800);
        assert_eq!(updated.debtor.balance, -200);
        assert_eq!(updated.debt.debted.amount, -200);

        let records = fx.engine.records_for_debt(opened.debt.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 200);
    }

    #[tokio::test]
    async fn test_update_debt_can_flip_kind() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let updated = fx
            .engine
            .update_debt(
                opened.debt.id,
                DebtAmounts {
                    kind: DebtKind::Borrow,
                    debted: usd(100),
                    received: vec![usd(100)],
                },
            )
            .await
            .unwrap();

        assert_eq!(fx.amount(&Currency::usd()).await, 1_100);
        assert_eq!(updated.debtor.balance, 100);
        assert_eq!(updated.records[0].kind, RecordKind::Buy);
    }

    #[tokio::test]
    async fn test_delete_debt_restores_balance_and_debtor() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let debtor = fx.engine.delete_debt(opened.debt.id).await.unwrap();

        assert_eq!(debtor.balance, 0);
        assert_eq!(fx.amount(&Currency::usd()).await, 1_000);
        assert!(fx
            .engine
            .records_for_debt(opened.debt.id)
            .await
            .unwrap()
            .is_empty());
        let err = fx.engine.debt(opened.debt.id).await.unwrap_err();
        assert_eq!(err.error_code(), "ENTITY_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_borrow_after_spending_fails_closed() {
        let fx = fixture();
        fx.fund(Currency::usd(), 0).await;
        let borrowed = fx
            .engine
            .create_debt(NewDebt {
                kind: DebtKind::Borrow,
                ..lend(fx.user.id, 500, vec![usd(500)])
            })
            .await
            .unwrap();
        fx.engine
            .post_balance_record(fx.user.id, RecordKind::Sell, usd(400), None)
            .await
            .unwrap();

        let err = fx.engine.delete_debt(borrowed.debt.id).await.unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(fx.amount(&Currency::usd()).await, 100);
        let debtor = fx.engine.debtor(borrowed.debtor.id).await.unwrap();
        assert_eq!(debtor.balance, 500);
        assert!(fx.engine.debt(borrowed.debt.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_lend_installment_cannot_overdraw() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let err = fx
            .engine
            .settle_debt(DebtInstallment {
                debtor_id: opened.debtor.id,
                kind: DebtKind::Lend,
                debted: usd(800),
                received: vec![usd(800)],
                details: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientFunds {
                available: 700,
                required: 800,
                ..
            }
        ));
        assert_eq!(fx.amount(&Currency::usd()).await, 700);
        let debtor = fx.engine.debtor(opened.debtor.id).await.unwrap();
        assert_eq!(debtor.balance, -300);
        let debts = fx.engine.debts_for_debtor(opened.debtor.id).await.unwrap();
        assert_eq!(debts.len(), 1);
    }

    #[tokio::test]
    async fn test_update_debt_rejects_other_currency() {
        let fx = fixture();
        fx.fund(Currency::usd(), 1_000).await;
        fx.fund(Currency::rub(), 1_000).await;
        let opened = fx
            .engine
            .create_debt(lend(fx.user.id, 300, vec![usd(300)]))
            .await
            .unwrap();

        let err = fx
            .engine
            .update_debt(
                opened.debt.id,
                DebtAmounts {
                    kind: DebtKind::Lend,
                    debted: Money::new(200, Currency::rub()),
                    received: vec![Money::new(200, Currency::rub())],
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::CurrencyMismatch { .. }));
        assert_eq!(fx.amount(&Currency::usd()).await, 700);
        assert_eq!(fx.amount(&Currency::rub()).await, 1_000);
        let debt = fx.engine.debt(opened.debt.id).await.unwrap();
        assert_eq!(debt.debted, usd(-300));
        let records = fx.engine.records_for_debt(opened.debt.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 300);
    }

    #[tokio::test]
    async fn test_update_borrow_after_spending_fails_closed() {
        let fx = fixture();
        fx.fund(Currency::usd(), 0).await;
        let borrowed = fx
            .engine
            .create_debt(NewDebt {
                kind: DebtKind::Borrow,
                ..lend(fx.user.id, 500, vec![usd(500)])
            })
            .await
            .unwrap();
        fx.engine
            .post_balance_record(fx.user.id, RecordKind::Sell, usd(400), None)
            .await
            .unwrap();

        let err = fx
            .engine
            .update_debt(
                borrowed.debt.id,
                DebtAmounts {
                    kind: DebtKind::Borrow,
                    debted: usd(200),
                    received: vec![usd(200)],
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(fx.amount(&Currency::usd()).await, 100);
        let debtor = fx.engine.debtor(borrowed.debtor.id).await.unwrap();
        assert_eq!(debtor.balance, 500);
        let records = fx.engine.records_for_debt(borrowed.debt.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount, 500);
    }

    #[tokio::test]
    async fn test_debt_limits() {
        let fx = fixture_with(LedgerConfig {
            max_debt_legs: 2,
            ..LedgerConfig::default()
        });
        fx.fund(Currency::usd(), 1_000).await;

        let err = fx
            .engine
            .create_debt(lend(fx.user.id, 3, vec![usd(1), usd(1), usd(1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidRequest { field: Some(ref f), .. } if f == "received"
        ));

        let err = fx
            .engine
            .create_debt(lend(fx.user.id, 3, vec![usd(-3)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { amount: -3 }));

        let err = fx
            .engine
            .create_debt(NewDebt {
                debtor_name: "  ".to_string(),
                ..lend(fx.user.id, 3, vec![])
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }
}
