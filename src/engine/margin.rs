//! Direction tracking for margin positions.

use crate::domain::{Account, Action, Asset};
use std::collections::HashMap;

/// Name of the sub-ledger holding a margin instrument.
pub fn sub_ledger_name(base: &Asset, quote: &Asset) -> String {
    format!("margin:{}-{}", base, quote)
}

/// What a margin trade does to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginStep {
    OpenLong,
    IncreaseLong,
    CloseLong,
    OpenShort,
    IncreaseShort,
    CloseShort,
}

/// Per (account, instrument) short flags.
///
/// A flag is set when a sell opens a position on a flat sub-ledger. By
/// default it is never cleared, so a later buy on the flat instrument is
/// still booked under the short flag. `reset_on_flat` re-derives the flag
/// from every opening trade instead.
#[derive(Debug, Default)]
pub struct MarginFlags {
    is_short: HashMap<(Account, String), bool>,
    reset_on_flat: bool,
}

impl MarginFlags {
    pub fn new(reset_on_flat: bool) -> Self {
        Self {
            is_short: HashMap::new(),
            reset_on_flat,
        }
    }

    pub fn is_short(&self, account: &Account, instrument: &str) -> bool {
        self.is_short
            .get(&(account.clone(), instrument.to_string()))
            .copied()
            .unwrap_or(false)
    }

    /// Classify a trade and update the flag for an opening trade.
    ///
    /// `holds_units` tells whether the sub-ledger currently has units of the
    /// instrument's base asset. Unknown actions yield `None`.
    pub fn step(
        &mut self,
        account: &Account,
        instrument: &str,
        action: Action,
        holds_units: bool,
    ) -> Option<MarginStep> {
        let key = (account.clone(), instrument.to_string());
        let short = self.is_short.get(&key).copied().unwrap_or(false);

        let step = match (action, holds_units) {
            (Action::Unknown, _) => return None,
            (Action::Buy, true) if short => MarginStep::CloseShort,
            (Action::Buy, true) => MarginStep::IncreaseLong,
            (Action::Sell, true) if short => MarginStep::IncreaseShort,
            (Action::Sell, true) => MarginStep::CloseLong,
            (Action::Sell, false) => {
                self.is_short.insert(key, true);
                MarginStep::OpenShort
            }
            (Action::Buy, false) => {
                if self.reset_on_flat {
                    self.is_short.insert(key, false);
                }
                MarginStep::OpenLong
            }
        };
        Some(step)
    }
}
