use super::{LedgerError, Lot, Precision, TakeFailure};
use crate::domain::{Asset, Decimal};
use serde::{Deserialize, Serialize};

/// Lots consumed by one take, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taken {
    pub lots: Vec<Lot>,
    /// Sum of `units_left` over `lots`.
    pub total: Decimal,
}

impl Taken {
    fn push(&mut self, lot: Lot) {
        self.total += lot.units_left;
        self.lots.push(lot);
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// Owned, point-in-time copy of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub asset: Asset,
    pub total_left: Decimal,
    pub lots: Vec<Lot>,
}

impl QueueSnapshot {
    pub fn empty(asset: Asset) -> Self {
        Self {
            asset,
            total_left: Decimal::zero(),
            lots: Vec::new(),
        }
    }
}

/// FIFO queue of lots for one asset in one ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotQueue {
    asset: Asset,
    lots: Vec<Lot>,
}

impl LotQueue {
    pub fn new(asset: Asset) -> Self {
        Self {
            asset,
            lots: Vec::new(),
        }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Insert a lot keeping ascending `acquired_at` order.
    ///
    /// The sort is stable, so lots acquired at the same instant keep their
    /// insertion order.
    pub fn add(&mut self, lot: Lot) {
        self.lots.push(lot);
        self.lots.sort_by_key(|l| l.acquired_at);
    }

    /// Consume `amount` units, oldest available lot first.
    ///
    /// Zero lots stay in the queue as inert records. If the queue runs dry the
    /// lots consumed so far are returned inside the failure.
    pub fn take(&mut self, amount: Decimal, precision: Precision) -> Result<Taken, TakeFailure> {
        let mut taken = Taken::default();
        let mut rest = precision.apply(amount);

        if !rest.is_positive() {
            return Ok(taken);
        }

        loop {
            let Some(lot) = self.lots.iter_mut().find(|l| l.is_available()) else {
                return Err(TakeFailure {
                    error: LedgerError::Insufficient {
                        asset: self.asset.clone(),
                        required: amount,
                        missing: rest,
                    },
                    partial: taken,
                });
            };

            if rest <= lot.units_left {
                let mut part = lot.clone();
                part.units_left = rest;
                taken.push(part);

                lot.units_left =
                    precision
                        .apply(lot.units_left - rest)
                        .clamp_between(Decimal::zero(), lot.units);
                return Ok(taken);
            }

            rest = precision.apply(rest - lot.units_left);
            taken.push(lot.clone());
            lot.units_left = Decimal::zero();

            if !rest.is_positive() {
                return Ok(taken);
            }
        }
    }

    /// True iff at least one lot has units left.
    pub fn has_units(&self) -> bool {
        self.lots.iter().any(Lot::is_available)
    }

    pub fn total_left(&self) -> Decimal {
        self.lots.iter().map(|l| l.units_left).sum()
    }

    /// Copy of the queue; never hands out the live lots.
    pub fn read(&self) -> QueueSnapshot {
        QueueSnapshot {
            asset: self.asset.clone(),
            total_left: self.total_left(),
            lots: self.lots.clone(),
        }
    }
}
