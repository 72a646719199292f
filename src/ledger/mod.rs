//! FIFO lot accounting: lots, per-asset queues and per-account books.

use crate::domain::{Asset, Decimal};
use thiserror::Error;

pub mod book;
pub mod lot;
pub mod queue;

pub use book::{AccountBook, AccountLedgers, Holdings};
pub use lot::Lot;
pub use queue::{LotQueue, QueueSnapshot, Taken};

/// Recoverable ledger conditions. They never abort a run; the engine renders
/// them as annotations on the record of the event that hit them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("no entry for {asset} in ledger")]
    NoEntry { asset: Asset },
    #[error(
        "insufficient {asset}: required {required}, available {}, missing {missing}",
        available(.required, .missing)
    )]
    Insufficient {
        asset: Asset,
        required: Decimal,
        missing: Decimal,
    },
    #[error("deposit of {amount} {asset} has no matching withdrawal and no cost basis")]
    Unmatched { asset: Asset, amount: Decimal },
}

fn available(required: &Decimal, missing: &Decimal) -> Decimal {
    *required - *missing
}

/// A take that could not be fully satisfied. `partial` holds whatever was
/// consumed before the ledger ran dry; those units are gone from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeFailure {
    pub error: LedgerError,
    pub partial: Taken,
}

/// How amounts of an asset are normalised while consuming lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// Fiat: 4 decimal places, anything below `epsilon` is dust.
    Fiat { epsilon: Decimal },
    /// Round to the given number of decimal places.
    Decimals(u32),
}

impl Precision {
    pub const FIAT_DECIMALS: u32 = 4;

    pub fn apply(&self, value: Decimal) -> Decimal {
        match self {
            Precision::Fiat { epsilon } => {
                let rounded = value.round_dp(Self::FIAT_DECIMALS);
                if rounded < *epsilon {
                    Decimal::zero()
                } else {
                    rounded
                }
            }
            Precision::Decimals(dp) => value.round_dp(*dp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn fiat_precision_rounds_and_drops_dust() {
        let p = Precision::Fiat { epsilon: d("0.0001") };
        assert_eq!(p.apply(d("790.00004")), d("790"));
        assert_eq!(p.apply(d("0.00009")), Decimal::zero());
        assert_eq!(p.apply(d("0.0001")), d("0.0001"));
        assert_eq!(p.apply(d("0.00004")), Decimal::zero());
        assert_eq!(p.apply(d("0.0002")), d("0.0002"));
        assert_eq!(p.apply(d("-3")), Decimal::zero());
    }

    #[test]
    fn decimal_precision_rounds() {
        assert_eq!(Precision::Decimals(8).apply(d("7.979999999")), d("7.98"));
        assert_eq!(Precision::Decimals(2).apply(d("1.005")), d("1.01"));
    }

    #[test]
    fn insufficient_message_reports_available() {
        let err = LedgerError::Insufficient {
            asset: Asset::new("EUR"),
            required: d("100"),
            missing: d("50"),
        };
        assert_eq!(
            err.to_string(),
            "insufficient EUR: required 100, available 50, missing 50"
        );
    }
}
