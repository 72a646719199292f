//! Pairing withdrawals with the deposits they turn into elsewhere, so the
//! receiving account inherits the original cost basis.

use crate::config::LedgerConfig;
use crate::domain::{Account, Asset, ConsumedLots, Decimal, Deposit, TimeMs};
use crate::ledger::{LedgerError, Lot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileTolerances {
    /// Maximum distance between withdrawal and deposit timestamps.
    pub window_ms: u64,
    /// Maximum relative amount difference, in percent of the withdrawn total.
    pub relative_pct: Decimal,
}

impl Default for ReconcileTolerances {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            relative_pct: Decimal::from(10),
        }
    }
}

impl From<&LedgerConfig> for ReconcileTolerances {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            window_ms: config.reconcile_window_ms,
            relative_pct: config.reconcile_tolerance_pct,
        }
    }
}

/// A withdrawal still waiting for its deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWithdrawal {
    pub record_id: String,
    pub ts: TimeMs,
    pub account: Account,
    pub destination: Account,
    pub asset: Asset,
    pub amount: Decimal,
    /// Lots consumed from `asset`.
    pub lots: Vec<Lot>,
    /// Lots consumed to pay a fee charged in another currency.
    pub fee_lots: Vec<ConsumedLots>,
}

impl PendingWithdrawal {
    /// Units actually taken from the ledger.
    pub fn total(&self) -> Decimal {
        self.lots.iter().map(|l| l.units_left).sum()
    }

    /// Cost basis of the fee lots, in the reference currency.
    pub fn fee_cost_ref(&self) -> Decimal {
        self.fee_lots
            .iter()
            .flat_map(|group| group.lots.iter())
            .map(Lot::cost_left_ref)
            .sum()
    }

    /// The consumed lots as they arrive at the destination. Fee lot cost is
    /// spread evenly over the transferred units.
    pub fn transferred_lots(&self) -> Vec<Lot> {
        let extra_unit_fee = self.fee_cost_ref().safe_div(self.total());
        self.lots
            .iter()
            .map(|lot| {
                let mut moved = lot.transferred();
                moved.unit_fee_cost_ref = moved.unit_fee_cost_ref + extra_unit_fee;
                moved
            })
            .collect()
    }
}

/// What a deposit turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositResolution {
    /// Paired with a pending withdrawal; lots carry its cost basis.
    Matched {
        withdrawal: PendingWithdrawal,
        lots: Vec<Lot>,
        warning: Option<String>,
    },
    /// Reference-currency deposit without a withdrawal, booked at cost 1.
    Synthesized { lot: Lot, warning: String },
    /// No cost basis evidence; nothing is booked.
    Unmatched { error: LedgerError },
}

#[derive(Debug, Default)]
pub struct ReconciliationTracker {
    tolerances: ReconcileTolerances,
    pending: Vec<PendingWithdrawal>,
}

impl ReconciliationTracker {
    pub fn new(tolerances: ReconcileTolerances) -> Self {
        Self {
            tolerances,
            pending: Vec::new(),
        }
    }

    pub fn record_withdrawal(&mut self, withdrawal: PendingWithdrawal) {
        self.pending.push(withdrawal);
    }

    fn is_match(&self, w: &PendingWithdrawal, deposit: &Deposit) -> bool {
        if w.destination != deposit.account || w.asset != deposit.asset {
            return false;
        }
        if w.ts.distance_ms(deposit.ts) > self.tolerances.window_ms {
            return false;
        }

        let total = w.total();
        if !total.is_positive() {
            return false;
        }

        let delta_pct = (total - deposit.amount).abs().safe_div(total) * Decimal::hundred();
        delta_pct < self.tolerances.relative_pct
    }

    /// First pending withdrawal that explains `deposit`, removed from the set.
    pub fn match_deposit(&mut self, deposit: &Deposit) -> Option<PendingWithdrawal> {
        let idx = self.pending.iter().position(|w| self.is_match(w, deposit))?;
        Some(self.pending.swap_remove(idx))
    }

    pub fn resolve_deposit(&mut self, deposit: &Deposit, reference: &Asset) -> DepositResolution {
        if let Some(withdrawal) = self.match_deposit(deposit) {
            let total = withdrawal.total();
            let warning = (total != deposit.amount).then(|| {
                format!(
                    "deposit of {} {} differs from matched withdrawal of {} (record {})",
                    deposit.amount, deposit.asset, total, withdrawal.record_id
                )
            });
            tracing::debug!(
                deposit_account = %deposit.account,
                withdrawal = %withdrawal.record_id,
                asset = %deposit.asset,
                "deposit matched pending withdrawal"
            );
            let lots = withdrawal.transferred_lots();
            return DepositResolution::Matched {
                withdrawal,
                lots,
                warning,
            };
        }

        if &deposit.asset == reference {
            let lot = Lot::acquired(
                deposit.amount,
                deposit.amount,
                deposit.fee_ref.abs(),
                deposit.ts,
            );
            return DepositResolution::Synthesized {
                lot,
                warning: format!(
                    "no matching withdrawal for {} {}, assuming a bank transfer at cost 1",
                    deposit.amount, deposit.asset
                ),
            };
        }

        DepositResolution::Unmatched {
            error: LedgerError::Unmatched {
                asset: deposit.asset.clone(),
                amount: deposit.amount,
            },
        }
    }

    pub fn pending(&self) -> &[PendingWithdrawal] {
        &self.pending
    }

    pub fn into_pending(self) -> Vec<PendingWithdrawal> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn pending(id: &str, ts: i64, dest: &str, asset: &str, units: &str) -> PendingWithdrawal {
        let lot = Lot::acquired(d(units), d(units) * d("300"), d(units), TimeMs::new(1));
        PendingWithdrawal {
            record_id: id.to_string(),
            ts: TimeMs::new(ts),
            account: Account::new("A"),
            destination: Account::new(dest),
            asset: Asset::new(asset),
            amount: d(units),
            lots: vec![lot],
            fee_lots: Vec::new(),
        }
    }

    fn deposit(ts: i64, account: &str, asset: &str, amount: &str) -> Deposit {
        Deposit {
            ts: TimeMs::new(ts),
            account: Account::new(account),
            asset: Asset::new(asset),
            amount: d(amount),
            fee: Decimal::zero(),
            fee_ref: Decimal::zero(),
            source: String::new(),
            tx_id: String::new(),
        }
    }

    fn tracker() -> ReconciliationTracker {
        ReconciliationTracker::new(ReconcileTolerances::default())
    }

    #[test]
    fn matches_within_window_and_tolerance() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", 1_000, "B", "BTC", "10"));

        let m = t.match_deposit(&deposit(1_000 + 5 * 60 * 1000, "B", "BTC", "9.5"));
        assert_eq!(m.map(|w| w.record_id), Some("w1".to_string()));
        assert!(t.pending().is_empty());
    }

    #[test]
    fn window_is_inclusive() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", 0, "B", "BTC", "1"));
        assert!(t.match_deposit(&deposit(900_001, "B", "BTC", "1")).is_none());
        assert!(t.match_deposit(&deposit(900_000, "B", "BTC", "1")).is_some());
    }

    #[test]
    fn extreme_timestamps_fall_outside_window() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", i64::MIN, "B", "BTC", "1"));
        assert!(t.match_deposit(&deposit(i64::MAX, "B", "BTC", "1")).is_none());
        assert_eq!(t.pending().len(), 1);
    }

    #[test]
    fn tolerance_is_strict_and_relative_to_withdrawal() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", 0, "B", "BTC", "10"));
        // |10 - 9| / 10 = 10% is not below the tolerance.
        assert!(t.match_deposit(&deposit(0, "B", "BTC", "9")).is_none());
        assert!(t.match_deposit(&deposit(0, "B", "BTC", "10.99")).is_some());
    }

    #[test]
    fn destination_and_asset_must_agree() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", 0, "B", "BTC", "1"));
        assert!(t.match_deposit(&deposit(0, "C", "BTC", "1")).is_none());
        assert!(t.match_deposit(&deposit(0, "B", "ETH", "1")).is_none());
        assert_eq!(t.pending().len(), 1);
    }

    #[test]
    fn first_match_wins_and_swap_remove_keeps_the_rest() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", 0, "B", "BTC", "1"));
        t.record_withdrawal(pending("w2", 0, "B", "BTC", "1"));
        t.record_withdrawal(pending("w3", 0, "C", "ETH", "1"));

        let first = t.match_deposit(&deposit(0, "B", "BTC", "1")).unwrap();
        assert_eq!(first.record_id, "w1");
        let ids: Vec<&str> = t.pending().iter().map(|w| w.record_id.as_str()).collect();
        assert_eq!(ids, vec!["w3", "w2"]);
    }

    #[test]
    fn empty_withdrawal_never_matches() {
        let mut t = tracker();
        let mut w = pending("w1", 0, "B", "BTC", "1");
        w.lots.clear();
        t.record_withdrawal(w);
        assert!(t.match_deposit(&deposit(0, "B", "BTC", "0")).is_none());
    }

    #[test]
    fn matched_deposit_inherits_cost_basis_and_fee_lots() {
        let mut t = tracker();
        let mut w = pending("w1", 0, "B", "BTC", "2");
        w.fee_lots.push(ConsumedLots::new(
            Asset::new("EUR"),
            vec![Lot::at_unit_cost(d("4"), d("1"), TimeMs::new(0))],
        ));
        t.record_withdrawal(w);

        match t.resolve_deposit(&deposit(60_000, "B", "BTC", "2"), &Asset::new("EUR")) {
            DepositResolution::Matched { lots, warning, .. } => {
                assert!(warning.is_none());
                assert_eq!(lots.len(), 1);
                assert_eq!(lots[0].units, d("2"));
                assert_eq!(lots[0].unit_cost_ref, d("300"));
                // Own fee of 1 per unit plus 4 EUR of withdrawal fee over 2 units.
                assert_eq!(lots[0].unit_fee_cost_ref, d("3"));
                assert_eq!(lots[0].acquired_at, TimeMs::new(1));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn amount_mismatch_is_a_warning() {
        let mut t = tracker();
        t.record_withdrawal(pending("w1", 0, "B", "BTC", "10"));
        match t.resolve_deposit(&deposit(0, "B", "BTC", "9.99"), &Asset::new("EUR")) {
            DepositResolution::Matched { warning, .. } => {
                assert!(warning.unwrap().contains("differs"));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn reference_deposit_is_synthesized_at_cost_one() {
        let mut t = tracker();
        let mut dep = deposit(0, "A", "EUR", "5000");
        dep.fee_ref = d("-5");
        match t.resolve_deposit(&dep, &Asset::new("EUR")) {
            DepositResolution::Synthesized { lot, warning } => {
                assert_eq!(lot.units_left, d("5000"));
                assert_eq!(lot.unit_cost_ref, d("1"));
                assert_eq!(lot.fee_total_ref(), d("5"));
                assert!(warning.contains("bank transfer"));
            }
            other => panic!("expected synthesized lot, got {:?}", other),
        }
    }

    #[test]
    fn other_deposit_without_withdrawal_is_unmatched() {
        let mut t = tracker();
        match t.resolve_deposit(&deposit(0, "A", "BTC", "1"), &Asset::new("EUR")) {
            DepositResolution::Unmatched { error } => assert_eq!(
                error,
                LedgerError::Unmatched {
                    asset: Asset::new("BTC"),
                    amount: d("1"),
                }
            ),
            other => panic!("expected unmatched, got {:?}", other),
        }
    }
}
