//! Integrity check of running totals against the record log.

use serde::Serialize;
use tracing::{info, instrument, warn};

use cashdesk_common::{BalanceId, Currency, Result, UserId};

use super::LedgerEngine;
use crate::balance::Balance;
use crate::record::{self, BalanceRecord, RecordKind};
use crate::store::{LedgerStore, UnitOfWork};

/// A running total that disagrees with what its records imply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub balance_id: BalanceId,
    pub user_id: UserId,
    pub currency: Currency,
    /// Which column is off: `in_out_lay`, `out_in_lay` or `balance`.
    pub field: &'static str,
    pub expected: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub balances_checked: usize,
    pub records_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    fn check(&mut self, balance: &Balance, records: &[BalanceRecord]) -> Result<()> {
        let sold = record::total(records, RecordKind::Sell)?;
        let bought = record::total(records, RecordKind::Buy)?;

        let checks = [
            ("in_out_lay", sold, balance.in_out_lay),
            ("out_in_lay", bought, balance.out_in_lay),
            (
                "balance",
                balance.out_in_lay.saturating_sub(balance.in_out_lay),
                balance.balance,
            ),
        ];
        for (field, expected, actual) in checks {
            if expected != actual {
                self.discrepancies.push(Discrepancy {
                    balance_id: balance.id,
                    user_id: balance.user_id,
                    currency: balance.currency.clone(),
                    field,
                    expected,
                    actual,
                });
            }
        }

        self.balances_checked += 1;
        self.records_checked += records.len();
        Ok(())
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Recompute every balance's lay totals from its records.
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        let mut unit = self.store.begin().await?;
        let result = verify_in(&mut unit).await;
        unit.rollback().await?;
        let report = result?;

        for d in &report.discrepancies {
            warn!(
                balance_id = %d.balance_id,
                currency = %d.currency,
                field = d.field,
                expected = d.expected,
                actual = d.actual,
                "Balance does not match its records"
            );
        }
        info!(
            balances = report.balances_checked,
            records = report.records_checked,
            discrepancies = report.discrepancies.len(),
            "Integrity check complete"
        );
        Ok(report)
    }
}

async fn verify_in<U: UnitOfWork>(unit: &mut U) -> Result<IntegrityReport> {
    let mut report = IntegrityReport::default();
    for balance in unit.all_balances().await? {
        let records = unit.records_for_balance(balance.id).await?;
        report.check(&balance, &records)?;
    }
    Ok(report)
}
