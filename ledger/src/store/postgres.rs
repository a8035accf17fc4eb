//! Postgres store: one sqlx transaction per unit of work.

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use cashdesk_common::{
    BalanceId, CompanyId, Currency, DebtId, DebtorId, EntityKind, ExchangeId, LedgerError, Money,
    RecordId, Result, TransactionId, UserId,
};

use crate::balance::Balance;
use crate::debt::{Debt, Debtor};
use crate::exchange::Exchange;
use crate::record::{BalanceRecord, RecordSource};
use crate::store::{
    BalanceRecordStore, BalanceStore, DebtStore, DebtorStore, ExchangeStore, LedgerStore,
    UnitOfWork, UserStore,
};
use crate::user::User;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const BALANCE_COLUMNS: &str = "id, user_id, company_id, currency, balance, in_out_lay, \
     out_in_lay, version, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, balance_id, user_id, company_id, kind, amount, currency, \
     source_type, transaction_id, exchange_id, debt_id, details, created_at, updated_at";

const EXCHANGE_COLUMNS: &str = "id, user_id, company_id, received_amount, received_currency, \
     sold_amount, sold_currency, details, created_at, updated_at";

const DEBTOR_COLUMNS: &str =
    "id, user_id, company_id, name, phone, currency, balance, version, created_at, updated_at";

const DEBT_COLUMNS: &str = "id, debtor_id, user_id, company_id, kind, status, debted_amount, \
     debted_currency, received, details, created_at, updated_at";

fn db_err(err: sqlx::Error) -> LedgerError {
    LedgerError::Database(err.to_string())
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(db_err)
}

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        info!("Ledger schema up to date");
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    type Unit = PgUnit;

    async fn begin(&self) -> Result<PgUnit> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(PgUnit { tx })
    }
}

/// Unit of work over one Postgres transaction.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

fn balance_from_row(row: &PgRow) -> Result<Balance> {
    Ok(Balance {
        id: BalanceId::from_uuid(col(row, "id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        company_id: CompanyId::from_uuid(col(row, "company_id")?),
        currency: Currency::new(col::<String>(row, "currency")?),
        balance: col(row, "balance")?,
        in_out_lay: col(row, "in_out_lay")?,
        out_in_lay: col(row, "out_in_lay")?,
        version: col(row, "version")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<BalanceRecord> {
    let source_type: String = col(row, "source_type")?;
    let source = match source_type.as_str() {
        "MANUAL" => RecordSource::Manual,
        "TRANSACTION" => RecordSource::Transaction(TransactionId::from_uuid(
            source_ref(row, "transaction_id")?,
        )),
        "EXCHANGE" => {
            RecordSource::Exchange(ExchangeId::from_uuid(source_ref(row, "exchange_id")?))
        }
        "DEBT" => RecordSource::Debt(DebtId::from_uuid(source_ref(row, "debt_id")?)),
        other => {
            return Err(LedgerError::UnknownType {
                entity: "balance record source",
                value: other.to_string(),
            })
        }
    };

    Ok(BalanceRecord {
        id: RecordId::from_uuid(col(row, "id")?),
        balance_id: BalanceId::from_uuid(col(row, "balance_id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        company_id: CompanyId::from_uuid(col(row, "company_id")?),
        kind: col::<String>(row, "kind")?.parse()?,
        amount: col(row, "amount")?,
        currency: Currency::new(col::<String>(row, "currency")?),
        source,
        details: col(row, "details")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn source_ref(row: &PgRow, column: &str) -> Result<Uuid> {
    col::<Option<Uuid>>(row, column)?.ok_or_else(|| {
        LedgerError::Database(format!("balance record source column {column} is null"))
    })
}

fn source_columns(
    source: &RecordSource,
) -> (&'static str, Option<Uuid>, Option<Uuid>, Option<Uuid>) {
    match source {
        RecordSource::Manual => ("MANUAL", None, None, None),
        RecordSource::Transaction(id) => ("TRANSACTION", Some(*id.as_uuid()), None, None),
        RecordSource::Exchange(id) => ("EXCHANGE", None, Some(*id.as_uuid()), None),
        RecordSource::Debt(id) => ("DEBT", None, None, Some(*id.as_uuid())),
    }
}

fn exchange_from_row(row: &PgRow) -> Result<Exchange> {
    Ok(Exchange {
        id: ExchangeId::from_uuid(col(row, "id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        company_id: CompanyId::from_uuid(col(row, "company_id")?),
        received: Money::new(
            col(row, "received_amount")?,
            Currency::new(col::<String>(row, "received_currency")?),
        ),
        sold: Money::new(
            col(row, "sold_amount")?,
            Currency::new(col::<String>(row, "sold_currency")?),
        ),
        details: col(row, "details")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn debtor_from_row(row: &PgRow) -> Result<Debtor> {
    Ok(Debtor {
        id: DebtorId::from_uuid(col(row, "id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        company_id: CompanyId::from_uuid(col(row, "company_id")?),
        name: col(row, "name")?,
        phone: col(row, "phone")?,
        currency: Currency::new(col::<String>(row, "currency")?),
        balance: col(row, "balance")?,
        version: col(row, "version")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn debt_from_row(row: &PgRow) -> Result<Debt> {
    let received: Json<Vec<Money>> = col(row, "received")?;
    Ok(Debt {
        id: DebtId::from_uuid(col(row, "id")?),
        debtor_id: DebtorId::from_uuid(col(row, "debtor_id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        company_id: CompanyId::from_uuid(col(row, "company_id")?),
        kind: col::<String>(row, "kind")?.parse()?,
        status: col::<String>(row, "status")?.parse()?,
        debted: Money::new(
            col(row, "debted_amount")?,
            Currency::new(col::<String>(row, "debted_currency")?),
        ),
        received: received.0,
        details: col(row, "details")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

impl PgUnit {
    async fn fetch_all<T>(
        &mut self,
        sql: &str,
        id: Uuid,
        map: fn(&PgRow) -> Result<T>,
    ) -> Result<Vec<T>> {
        let rows = sqlx::query(sql)
            .bind(id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter().map(map).collect()
    }

    async fn fetch_one_by_id<T>(
        &mut self,
        sql: &str,
        id: Uuid,
        map: fn(&PgRow) -> Result<T>,
    ) -> Result<Option<T>> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(map).transpose()
    }

    async fn execute_by_id(&mut self, sql: &str, id: Uuid) -> Result<u64> {
        let result = sqlx::query(sql)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_record(&mut self, record: &BalanceRecord) -> Result<()> {
        let (source_type, transaction_id, exchange_id, debt_id) = source_columns(&record.source);
        let sql = format!(
            "INSERT INTO balance_records ({RECORD_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(*record.id.as_uuid())
            .bind(*record.balance_id.as_uuid())
            .bind(*record.user_id.as_uuid())
            .bind(*record.company_id.as_uuid())
            .bind(record.kind.as_str())
            .bind(record.amount)
            .bind(record.currency.code())
            .bind(source_type)
            .bind(transaction_id)
            .bind(exchange_id)
            .bind(debt_id)
            .bind(record.details.as_deref())
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn require_one(affected: u64, entity: EntityKind, id: impl ToString) -> Result<()> {
    if affected == 0 {
        return Err(LedgerError::not_found(entity, id));
    }
    Ok(())
}

#[async_trait]
impl BalanceStore for PgUnit {
    async fn create_balance(&mut self, balance: &Balance) -> Result<()> {
        let sql = format!(
            "INSERT INTO balances ({BALANCE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        let result = sqlx::query(&sql)
            .bind(*balance.id.as_uuid())
            .bind(*balance.user_id.as_uuid())
            .bind(*balance.company_id.as_uuid())
            .bind(balance.currency.code())
            .bind(balance.balance)
            .bind(balance.in_out_lay)
            .bind(balance.out_in_lay)
            .bind(balance.version)
            .bind(balance.created_at)
            .bind(balance.updated_at)
            .execute(&mut *self.tx)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(LedgerError::BalanceExists {
                    user_id: balance.user_id,
                    currency: balance.currency.clone(),
                })
            }
            Err(err) => Err(db_err(err)),
        }
    }

    async fn balance_by_id(&mut self, id: BalanceId) -> Result<Option<Balance>> {
        let sql = format!("SELECT {BALANCE_COLUMNS} FROM balances WHERE id = $1");
        self.fetch_one_by_id(&sql, *id.as_uuid(), balance_from_row)
            .await
    }

    async fn balance_for(
        &mut self,
        user_id: UserId,
        currency: &Currency,
    ) -> Result<Option<Balance>> {
        let sql =
            format!("SELECT {BALANCE_COLUMNS} FROM balances WHERE user_id = $1 AND currency = $2");
        let row = sqlx::query(&sql)
            .bind(*user_id.as_uuid())
            .bind(currency.code())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.as_ref().map(balance_from_row).transpose()
    }

    async fn balances_for_user(&mut self, user_id: UserId) -> Result<Vec<Balance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM balances WHERE user_id = $1 ORDER BY currency"
        );
        self.fetch_all(&sql, *user_id.as_uuid(), balance_from_row)
            .await
    }

    async fn balances_for_company(&mut self, company_id: CompanyId) -> Result<Vec<Balance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM balances WHERE company_id = $1 \
             ORDER BY user_id, currency"
        );
        self.fetch_all(&sql, *company_id.as_uuid(), balance_from_row)
            .await
    }

    async fn all_balances(&mut self) -> Result<Vec<Balance>> {
        let sql = format!("SELECT {BALANCE_COLUMNS} FROM balances ORDER BY user_id, currency");
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db_err)?;
        rows.iter().map(balance_from_row).collect()
    }

    async fn update_balance(&mut self, balance: &Balance) -> Result<Balance> {
        let sql = format!(
            "UPDATE balances \
             SET balance = $2, in_out_lay = $3, out_in_lay = $4, updated_at = $5, \
                 version = version + 1 \
             WHERE id = $1 AND version = $6 \
             RETURNING {BALANCE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(*balance.id.as_uuid())
            .bind(balance.balance)
            .bind(balance.in_out_lay)
            .bind(balance.out_in_lay)
            .bind(balance.updated_at)
            .bind(balance.version)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => balance_from_row(&row),
            None => Err(LedgerError::conflict(EntityKind::Balance, balance.id)),
        }
    }
}

#[async_trait]
impl BalanceRecordStore for PgUnit {
    async fn create_record(&mut self, record: &BalanceRecord) -> Result<()> {
        self.insert_record(record).await
    }

    async fn record_by_id(&mut self, id: RecordId) -> Result<Option<BalanceRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM balance_records WHERE id = $1");
        self.fetch_one_by_id(&sql, *id.as_uuid(), record_from_row)
            .await
    }

    async fn update_record(&mut self, record: &BalanceRecord) -> Result<()> {
        let result = sqlx::query(
            "UPDATE balance_records \
             SET balance_id = $2, kind = $3, amount = $4, currency = $5, details = $6, \
                 updated_at = $7 \
             WHERE id = $1",
        )
        .bind(*record.id.as_uuid())
        .bind(*record.balance_id.as_uuid())
        .bind(record.kind.as_str())
        .bind(record.amount)
        .bind(record.currency.code())
        .bind(record.details.as_deref())
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        require_one(result.rows_affected(), EntityKind::BalanceRecord, record.id)
    }

    async fn delete_record(&mut self, id: RecordId) -> Result<()> {
        let affected = self
            .execute_by_id("DELETE FROM balance_records WHERE id = $1", *id.as_uuid())
            .await?;
        require_one(affected, EntityKind::BalanceRecord, id)
    }

    async fn records_for_balance(&mut self, balance_id: BalanceId) -> Result<Vec<BalanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM balance_records WHERE balance_id = $1 \
             ORDER BY created_at, id"
        );
        self.fetch_all(&sql, *balance_id.as_uuid(), record_from_row)
            .await
    }

    async fn records_for_exchange(
        &mut self,
        exchange_id: ExchangeId,
    ) -> Result<Vec<BalanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM balance_records WHERE exchange_id = $1 \
             ORDER BY created_at, id"
        );
        self.fetch_all(&sql, *exchange_id.as_uuid(), record_from_row)
            .await
    }

    async fn records_for_debt(&mut self, debt_id: DebtId) -> Result<Vec<BalanceRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM balance_records WHERE debt_id = $1 \
             ORDER BY created_at, id"
        );
        self.fetch_all(&sql, *debt_id.as_uuid(), record_from_row)
            .await
    }

    async fn delete_records_for_exchange(&mut self, exchange_id: ExchangeId) -> Result<u64> {
        self.execute_by_id(
            "DELETE FROM balance_records WHERE exchange_id = $1",
            *exchange_id.as_uuid(),
        )
        .await
    }

    async fn delete_records_for_debt(&mut self, debt_id: DebtId) -> Result<u64> {
        self.execute_by_id(
            "DELETE FROM balance_records WHERE debt_id = $1",
            *debt_id.as_uuid(),
        )
        .await
    }
}

#[async_trait]
impl ExchangeStore for PgUnit {
    async fn create_exchange(&mut self, exchange: &Exchange) -> Result<()> {
        let sql = format!(
            "INSERT INTO exchanges ({EXCHANGE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&sql)
            .bind(*exchange.id.as_uuid())
            .bind(*exchange.user_id.as_uuid())
            .bind(*exchange.company_id.as_uuid())
            .bind(exchange.received.amount)
            .bind(exchange.received.currency.code())
            .bind(exchange.sold.amount)
            .bind(exchange.sold.currency.code())
            .bind(exchange.details.as_deref())
            .bind(exchange.created_at)
            .bind(exchange.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn exchange_by_id(&mut self, id: ExchangeId) -> Result<Option<Exchange>> {
        let sql = format!("SELECT {EXCHANGE_COLUMNS} FROM exchanges WHERE id = $1");
        self.fetch_one_by_id(&sql, *id.as_uuid(), exchange_from_row)
            .await
    }

    async fn update_exchange(&mut self, exchange: &Exchange) -> Result<()> {
        let result = sqlx::query(
            "UPDATE exchanges \
             SET received_amount = $2, received_currency = $3, sold_amount = $4, \
                 sold_currency = $5, details = $6, updated_at = $7 \
             WHERE id = $1",
        )
        .bind(*exchange.id.as_uuid())
        .bind(exchange.received.amount)
        .bind(exchange.received.currency.code())
        .bind(exchange.sold.amount)
        .bind(exchange.sold.currency.code())
        .bind(exchange.details.as_deref())
        .bind(exchange.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        require_one(result.rows_affected(), EntityKind::Exchange, exchange.id)
    }

    async fn delete_exchange(&mut self, id: ExchangeId) -> Result<()> {
        let affected = self
            .execute_by_id("DELETE FROM exchanges WHERE id = $1", *id.as_uuid())
            .await?;
        require_one(affected, EntityKind::Exchange, id)
    }
}

#[async_trait]
impl DebtorStore for PgUnit {
    async fn create_debtor(&mut self, debtor: &Debtor) -> Result<()> {
        let sql = format!(
            "INSERT INTO debtors ({DEBTOR_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        sqlx::query(&sql)
            .bind(*debtor.id.as_uuid())
            .bind(*debtor.user_id.as_uuid())
            .bind(*debtor.company_id.as_uuid())
            .bind(&debtor.name)
            .bind(debtor.phone.as_deref())
            .bind(debtor.currency.code())
            .bind(debtor.balance)
            .bind(debtor.version)
            .bind(debtor.created_at)
            .bind(debtor.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn debtor_by_id(&mut self, id: DebtorId) -> Result<Option<Debtor>> {
        let sql = format!("SELECT {DEBTOR_COLUMNS} FROM debtors WHERE id = $1");
        self.fetch_one_by_id(&sql, *id.as_uuid(), debtor_from_row)
            .await
    }

    async fn debtors_for_user(&mut self, user_id: UserId) -> Result<Vec<Debtor>> {
        let sql = format!(
            "SELECT {DEBTOR_COLUMNS} FROM debtors WHERE user_id = $1 ORDER BY created_at, id"
        );
        self.fetch_all(&sql, *user_id.as_uuid(), debtor_from_row)
            .await
    }

    async fn update_debtor(&mut self, debtor: &Debtor) -> Result<Debtor> {
        let sql = format!(
            "UPDATE debtors \
             SET name = $2, phone = $3, balance = $4, updated_at = $5, version = version + 1 \
             WHERE id = $1 AND version = $6 \
             RETURNING {DEBTOR_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(*debtor.id.as_uuid())
            .bind(&debtor.name)
            .bind(debtor.phone.as_deref())
            .bind(debtor.balance)
            .bind(debtor.updated_at)
            .bind(debtor.version)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => debtor_from_row(&row),
            None => Err(LedgerError::conflict(EntityKind::Debtor, debtor.id)),
        }
    }
}

#[async_trait]
impl DebtStore for PgUnit {
    async fn create_debt(&mut self, debt: &Debt) -> Result<()> {
        let sql = format!(
            "INSERT INTO debts ({DEBT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        );
        sqlx::query(&sql)
            .bind(*debt.id.as_uuid())
            .bind(*debt.debtor_id.as_uuid())
            .bind(*debt.user_id.as_uuid())
            .bind(*debt.company_id.as_uuid())
            .bind(debt.kind.as_str())
            .bind(debt.status.as_str())
            .bind(debt.debted.amount)
            .bind(debt.debted.currency.code())
            .bind(Json(&debt.received))
            .bind(debt.details.as_deref())
            .bind(debt.created_at)
            .bind(debt.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn debt_by_id(&mut self, id: DebtId) -> Result<Option<Debt>> {
        let sql = format!("SELECT {DEBT_COLUMNS} FROM debts WHERE id = $1");
        self.fetch_one_by_id(&sql, *id.as_uuid(), debt_from_row)
            .await
    }

    async fn debts_for_debtor(&mut self, debtor_id: DebtorId) -> Result<Vec<Debt>> {
        let sql = format!(
            "SELECT {DEBT_COLUMNS} FROM debts WHERE debtor_id = $1 ORDER BY created_at, id"
        );
        self.fetch_all(&sql, *debtor_id.as_uuid(), debt_from_row)
            .await
    }

    async fn update_debt(&mut self, debt: &Debt) -> Result<()> {
        let result = sqlx::query(
            "UPDATE debts \
             SET kind = $2, status = $3, debted_amount = $4, debted_currency = $5, \
                 received = $6, details = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(*debt.id.as_uuid())
        .bind(debt.kind.as_str())
        .bind(debt.status.as_str())
        .bind(debt.debted.amount)
        .bind(debt.debted.currency.code())
        .bind(Json(&debt.received))
        .bind(debt.details.as_deref())
        .bind(debt.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        require_one(result.rows_affected(), EntityKind::Debt, debt.id)
    }

    async fn delete_debt(&mut self, id: DebtId) -> Result<()> {
        let affected = self
            .execute_by_id("DELETE FROM debts WHERE id = $1", *id.as_uuid())
            .await?;
        require_one(affected, EntityKind::Debt, id)
    }
}

#[async_trait]
impl UserStore for PgUnit {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, company_id FROM users WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;

        row.map(|row| -> Result<User> {
            Ok(User {
                id: UserId::from_uuid(col(&row, "id")?),
                company_id: CompanyId::from_uuid(col(&row, "company_id")?),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(db_err)?;
        debug!("Postgres unit committed");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(db_err)?;
        debug!("Postgres unit rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_columns() {
        let exchange_id = ExchangeId::new();
        let (kind, tx, ex, debt) = source_columns(&RecordSource::Exchange(exchange_id));
        assert_eq!(kind, "EXCHANGE");
        assert!(tx.is_none() && debt.is_none());
        assert_eq!(ex, Some(*exchange_id.as_uuid()));

        let (kind, tx, ex, debt) = source_columns(&RecordSource::Manual);
        assert_eq!(kind, "MANUAL");
        assert!(tx.is_none() && ex.is_none() && debt.is_none());
    }

    #[test]
    fn test_migrations_are_embedded() {
        assert!(MIGRATOR.iter().count() >= 1);
    }
}
