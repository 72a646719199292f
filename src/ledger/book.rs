use super::{LedgerError, Lot, LotQueue, Precision, QueueSnapshot, TakeFailure, Taken};
use crate::domain::{Account, Asset, Decimal};
use std::collections::BTreeMap;

/// One queue per asset. Used both for an account's primary holdings and for
/// each of its isolated sub-ledgers.
#[derive(Debug, Clone, Default)]
pub struct Holdings {
    queues: BTreeMap<Asset, LotQueue>,
}

impl Holdings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, asset: &Asset, lot: Lot) {
        self.queues
            .entry(asset.clone())
            .or_insert_with(|| LotQueue::new(asset.clone()))
            .add(lot);
    }

    /// Take `amount` of `asset`. Fails with `NoEntry` if the asset never had a
    /// lot added here, unless the amount is not positive.
    pub fn take(
        &mut self,
        asset: &Asset,
        amount: Decimal,
        precision: Precision,
    ) -> Result<Taken, TakeFailure> {
        if !amount.is_positive() {
            return Ok(Taken::default());
        }

        match self.queues.get_mut(asset) {
            Some(queue) => queue.take(amount, precision),
            None => Err(TakeFailure {
                error: LedgerError::NoEntry {
                    asset: asset.clone(),
                },
                partial: Taken::default(),
            }),
        }
    }

    pub fn has_units(&self, asset: &Asset) -> bool {
        self.queues.get(asset).is_some_and(LotQueue::has_units)
    }

    pub fn total_left(&self, asset: &Asset) -> Decimal {
        self.queues
            .get(asset)
            .map(LotQueue::total_left)
            .unwrap_or_default()
    }

    /// Snapshot of one queue; an unknown asset reads as empty.
    pub fn read(&self, asset: &Asset) -> QueueSnapshot {
        self.queues
            .get(asset)
            .map(LotQueue::read)
            .unwrap_or_else(|| QueueSnapshot::empty(asset.clone()))
    }

    /// Snapshots of every queue, ordered by asset.
    pub fn snapshot(&self) -> Vec<QueueSnapshot> {
        self.queues.values().map(LotQueue::read).collect()
    }
}

/// Primary holdings plus named sub-ledgers of one account.
#[derive(Debug, Clone, Default)]
pub struct AccountLedgers {
    pub primary: Holdings,
    pub sub: BTreeMap<String, Holdings>,
}

/// account -> ledgers. Everything is created lazily on first access.
#[derive(Debug, Clone, Default)]
pub struct AccountBook {
    accounts: BTreeMap<Account, AccountLedgers>,
}

impl AccountBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable handle on the primary holdings (`sub = None`) or a named
    /// sub-ledger of `account`. Idempotent.
    pub fn ledger(&mut self, account: &Account, sub: Option<&str>) -> &mut Holdings {
        let ledgers = self.accounts.entry(account.clone()).or_default();
        match sub {
            None => &mut ledgers.primary,
            Some(name) => ledgers.sub.entry(name.to_string()).or_default(),
        }
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.keys()
    }

    pub fn get(&self, account: &Account) -> Option<&AccountLedgers> {
        self.accounts.get(account)
    }

    /// Read-only snapshot of one queue. Does not create anything.
    pub fn read(&self, account: &Account, sub: Option<&str>, asset: &Asset) -> QueueSnapshot {
        let holdings = self.accounts.get(account).and_then(|l| match sub {
            None => Some(&l.primary),
            Some(name) => l.sub.get(name),
        });
        match holdings {
            Some(h) => h.read(asset),
            None => QueueSnapshot::empty(asset.clone()),
        }
    }
}
