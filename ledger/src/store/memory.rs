//! In-memory store for tests and embedded use.
//!
//! A unit of work runs against a private snapshot of the shared state. On
//! commit, the versions of touched balances and debtors are checked against
//! the shared state and the write set is applied under one lock.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use cashdesk_common::{
    BalanceId, CompanyId, Currency, DebtId, DebtorId, EntityKind, ExchangeId, LedgerError,
    RecordId, Result, UserId,
};

use crate::balance::Balance;
use crate::debt::{Debt, Debtor};
use crate::exchange::Exchange;
use crate::record::BalanceRecord;
use crate::store::{
    BalanceRecordStore, BalanceStore, DebtStore, DebtorStore, ExchangeStore, LedgerStore,
    UnitOfWork, UserStore,
};
use crate::user::User;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    balances: HashMap<BalanceId, Balance>,
    records: HashMap<RecordId, BalanceRecord>,
    exchanges: HashMap<ExchangeId, Exchange>,
    debtors: HashMap<DebtorId, Debtor>,
    debts: HashMap<DebtId, Debt>,
}

/// Keys written by a unit of work; absent from the snapshot means deleted.
#[derive(Debug, Default)]
struct WriteSet {
    balances: HashSet<BalanceId>,
    records: HashSet<RecordId>,
    exchanges: HashSet<ExchangeId>,
    debtors: HashSet<DebtorId>,
    debts: HashSet<DebtId>,
    /// Version each touched balance had in the snapshot; `None` if created here.
    balance_versions: HashMap<BalanceId, Option<i64>>,
    debtor_versions: HashMap<DebtorId, Option<i64>>,
}

/// Shared in-memory ledger state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user; users are owned outside the ledger.
    pub fn insert_user(&self, user: User) {
        self.state.lock().users.insert(user.id, user);
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> Result<MemoryUnit> {
        let snapshot = self.state.lock().clone();
        Ok(MemoryUnit {
            shared: self.state.clone(),
            working: snapshot,
            writes: WriteSet::default(),
        })
    }
}

/// Unit of work over a snapshot of [`MemoryStore`].
pub struct MemoryUnit {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    writes: WriteSet,
}

fn sorted<T: Clone, K: Ord>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    items.sort_by_key(|item| key(item));
    items
}

fn apply_writes<K: Eq + Hash + Copy, V: Clone>(
    shared: &mut HashMap<K, V>,
    working: &HashMap<K, V>,
    keys: &HashSet<K>,
) {
    for key in keys {
        match working.get(key) {
            Some(value) => {
                shared.insert(*key, value.clone());
            }
            None => {
                shared.remove(key);
            }
        }
    }
}

#[async_trait]
impl BalanceStore for MemoryUnit {
    async fn create_balance(&mut self, balance: &Balance) -> Result<()> {
        let exists = self
            .working
            .balances
            .values()
            .any(|b| b.user_id == balance.user_id && b.currency == balance.currency);
        if exists {
            return Err(LedgerError::BalanceExists {
                user_id: balance.user_id,
                currency: balance.currency.clone(),
            });
        }
        self.working.balances.insert(balance.id, balance.clone());
        self.writes.balances.insert(balance.id);
        self.writes.balance_versions.entry(balance.id).or_insert(None);
        Ok(())
    }

    async fn balance_by_id(&mut self, id: BalanceId) -> Result<Option<Balance>> {
        Ok(self.working.balances.get(&id).cloned())
    }

    async fn balance_for(
        &mut self,
        user_id: UserId,
        currency: &Currency,
    ) -> Result<Option<Balance>> {
        Ok(self
            .working
            .balances
            .values()
            .find(|b| b.user_id == user_id && &b.currency == currency)
            .cloned())
    }

    async fn balances_for_user(&mut self, user_id: UserId) -> Result<Vec<Balance>> {
        Ok(sorted(
            self.working
                .balances
                .values()
                .filter(|b| b.user_id == user_id)
                .cloned(),
            |b| b.currency.clone(),
        ))
    }

    async fn balances_for_company(&mut self, company_id: CompanyId) -> Result<Vec<Balance>> {
        Ok(sorted(
            self.working
                .balances
                .values()
                .filter(|b| b.company_id == company_id)
                .cloned(),
            |b| (b.user_id, b.currency.clone()),
        ))
    }

    async fn all_balances(&mut self) -> Result<Vec<Balance>> {
        Ok(sorted(self.working.balances.values().cloned(), |b| {
            (b.user_id, b.currency.clone())
        }))
    }

    async fn update_balance(&mut self, balance: &Balance) -> Result<Balance> {
        let current = self
            .working
            .balances
            .get(&balance.id)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Balance, balance.id))?;
        if current.version != balance.version {
            return Err(LedgerError::conflict(EntityKind::Balance, balance.id));
        }
        let base_version = current.version;

        let mut stored = balance.clone();
        stored.version += 1;
        self.working.balances.insert(stored.id, stored.clone());
        self.writes.balances.insert(stored.id);
        self.writes
            .balance_versions
            .entry(stored.id)
            .or_insert(Some(base_version));
        Ok(stored)
    }
}

#[async_trait]
impl BalanceRecordStore for MemoryUnit {
    async fn create_record(&mut self, record: &BalanceRecord) -> Result<()> {
        self.working.records.insert(record.id, record.clone());
        self.writes.records.insert(record.id);
        Ok(())
    }

    async fn record_by_id(&mut self, id: RecordId) -> Result<Option<BalanceRecord>> {
        Ok(self.working.records.get(&id).cloned())
    }

    async fn update_record(&mut self, record: &BalanceRecord) -> Result<()> {
        if !self.working.records.contains_key(&record.id) {
            return Err(LedgerError::not_found(EntityKind::BalanceRecord, record.id));
        }
        self.working.records.insert(record.id, record.clone());
        self.writes.records.insert(record.id);
        Ok(())
    }

    async fn delete_record(&mut self, id: RecordId) -> Result<()> {
        if self.working.records.remove(&id).is_none() {
            return Err(LedgerError::not_found(EntityKind::BalanceRecord, id));
        }
        self.writes.records.insert(id);
        Ok(())
    }

    async fn records_for_balance(&mut self, balance_id: BalanceId) -> Result<Vec<BalanceRecord>> {
        Ok(self.records_where(|r| r.balance_id == balance_id))
    }

    async fn records_for_exchange(
        &mut self,
        exchange_id: ExchangeId,
    ) -> Result<Vec<BalanceRecord>> {
        Ok(self.records_where(|r| r.source.exchange_id() == Some(exchange_id)))
    }

    async fn records_for_debt(&mut self, debt_id: DebtId) -> Result<Vec<BalanceRecord>> {
        Ok(self.records_where(|r| r.source.debt_id() == Some(debt_id)))
    }

    async fn delete_records_for_exchange(&mut self, exchange_id: ExchangeId) -> Result<u64> {
        Ok(self.delete_records_where(|r| r.source.exchange_id() == Some(exchange_id)))
    }

    async fn delete_records_for_debt(&mut self, debt_id: DebtId) -> Result<u64> {
        Ok(self.delete_records_where(|r| r.source.debt_id() == Some(debt_id)))
    }
}

impl MemoryUnit {
    fn records_where(&self, predicate: impl Fn(&BalanceRecord) -> bool) -> Vec<BalanceRecord> {
        sorted(
            self.working
                .records
                .values()
                .filter(|r| predicate(r))
                .cloned(),
            |r| (r.created_at, r.id),
        )
    }

    fn delete_records_where(&mut self, predicate: impl Fn(&BalanceRecord) -> bool) -> u64 {
        let ids: Vec<RecordId> = self
            .working
            .records
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.id)
            .collect();
        for id in &ids {
            self.working.records.remove(id);
            self.writes.records.insert(*id);
        }
        ids.len() as u64
    }
}

#[async_trait]
impl ExchangeStore for MemoryUnit {
    async fn create_exchange(&mut self, exchange: &Exchange) -> Result<()> {
        self.working.exchanges.insert(exchange.id, exchange.clone());
        self.writes.exchanges.insert(exchange.id);
        Ok(())
    }

    async fn exchange_by_id(&mut self, id: ExchangeId) -> Result<Option<Exchange>> {
        Ok(self.working.exchanges.get(&id).cloned())
    }

    async fn update_exchange(&mut self, exchange: &Exchange) -> Result<()> {
        if !self.working.exchanges.contains_key(&exchange.id) {
            return Err(LedgerError::not_found(EntityKind::Exchange, exchange.id));
        }
        self.working.exchanges.insert(exchange.id, exchange.clone());
        self.writes.exchanges.insert(exchange.id);
        Ok(())
    }

    async fn delete_exchange(&mut self, id: ExchangeId) -> Result<()> {
        if self.working.exchanges.remove(&id).is_none() {
            return Err(LedgerError::not_found(EntityKind::Exchange, id));
        }
        self.writes.exchanges.insert(id);
        Ok(())
    }
}

#[async_trait]
impl DebtorStore for MemoryUnit {
    async fn create_debtor(&mut self, debtor: &Debtor) -> Result<()> {
        self.working.debtors.insert(debtor.id, debtor.clone());
        self.writes.debtors.insert(debtor.id);
        self.writes.debtor_versions.entry(debtor.id).or_insert(None);
        Ok(())
    }

    async fn debtor_by_id(&mut self, id: DebtorId) -> Result<Option<Debtor>> {
        Ok(self.working.debtors.get(&id).cloned())
    }

    async fn debtors_for_user(&mut self, user_id: UserId) -> Result<Vec<Debtor>> {
        Ok(sorted(
            self.working
                .debtors
                .values()
                .filter(|d| d.user_id == user_id)
                .cloned(),
            |d| (d.created_at, d.id),
        ))
    }

    async fn update_debtor(&mut self, debtor: &Debtor) -> Result<Debtor> {
        let current = self
            .working
            .debtors
            .get(&debtor.id)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Debtor, debtor.id))?;
        if current.version != debtor.version {
            return Err(LedgerError::conflict(EntityKind::Debtor, debtor.id));
        }
        let base_version = current.version;

        let mut stored = debtor.clone();
        stored.version += 1;
        self.working.debtors.insert(stored.id, stored.clone());
        self.writes.debtors.insert(stored.id);
        self.writes
            .debtor_versions
            .entry(stored.id)
            .or_insert(Some(base_version));
        Ok(stored)
    }
}

#[async_trait]
impl DebtStore for MemoryUnit {
    async fn create_debt(&mut self, debt: &Debt) -> Result<()> {
        self.working.debts.insert(debt.id, debt.clone());
        self.writes.debts.insert(debt.id);
        Ok(())
    }

    async fn debt_by_id(&mut self, id: DebtId) -> Result<Option<Debt>> {
        Ok(self.working.debts.get(&id).cloned())
    }

    async fn debts_for_debtor(&mut self, debtor_id: DebtorId) -> Result<Vec<Debt>> {
        Ok(sorted(
            self.working
                .debts
                .values()
                .filter(|d| d.debtor_id == debtor_id)
                .cloned(),
            |d| (d.created_at, d.id),
        ))
    }

    async fn update_debt(&mut self, debt: &Debt) -> Result<()> {
        if !self.working.debts.contains_key(&debt.id) {
            return Err(LedgerError::not_found(EntityKind::Debt, debt.id));
        }
        self.working.debts.insert(debt.id, debt.clone());
        self.writes.debts.insert(debt.id);
        Ok(())
    }

    async fn delete_debt(&mut self, id: DebtId) -> Result<()> {
        if self.working.debts.remove(&id).is_none() {
            return Err(LedgerError::not_found(EntityKind::Debt, id));
        }
        self.writes.debts.insert(id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUnit {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn commit(self) -> Result<()> {
        let MemoryUnit {
            shared,
            working,
            writes,
        } = self;
        let mut shared = shared.lock();

        for (id, base) in &writes.balance_versions {
            match base {
                Some(version) => {
                    let current = shared.balances.get(id).map(|b| b.version);
                    if current != Some(*version) {
                        return Err(LedgerError::conflict(EntityKind::Balance, id));
                    }
                }
                None => {
                    if let Some(created) = working.balances.get(id) {
                        let taken = shared.balances.values().any(|b| {
                            b.id != created.id
                                && b.user_id == created.user_id
                                && b.currency == created.currency
                        });
                        if taken {
                            return Err(LedgerError::BalanceExists {
                                user_id: created.user_id,
                                currency: created.currency.clone(),
                            });
                        }
                    }
                }
            }
        }

        for (id, base) in &writes.debtor_versions {
            if let Some(version) = base {
                let current = shared.debtors.get(id).map(|d| d.version);
                if current != Some(*version) {
                    return Err(LedgerError::conflict(EntityKind::Debtor, id));
                }
            }
        }

        apply_writes(&mut shared.balances, &working.balances, &writes.balances);
        apply_writes(&mut shared.records, &working.records, &writes.records);
        apply_writes(&mut shared.exchanges, &working.exchanges, &writes.exchanges);
        apply_writes(&mut shared.debtors, &working.debtors, &writes.debtors);
        apply_writes(&mut shared.debts, &working.debts, &writes.debts);

        debug!(
            balances = writes.balances.len(),
            records = writes.records.len(),
            "Memory unit committed"
        );
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        debug!("Memory unit rolled back");
        Ok(())
    }
}
