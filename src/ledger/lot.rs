use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};

/// One acquisition batch of an asset.
///
/// Per-unit cost and fee are fixed at acquisition, so consuming part of a lot
/// never needs to re-prorate anything: only `units_left` moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    /// Quantity originally acquired.
    pub units: Decimal,
    /// Quantity not yet consumed, `0 <= units_left <= units`.
    pub units_left: Decimal,
    /// Acquisition cost per unit in the reference currency.
    pub unit_cost_ref: Decimal,
    /// Acquisition fee per unit in the reference currency.
    pub unit_fee_cost_ref: Decimal,
    pub acquired_at: TimeMs,
}

impl Lot {
    /// Build a lot from an acquisition of `amount` units that cost `value_ref`
    /// plus `fee_ref` in total.
    pub fn acquired(amount: Decimal, value_ref: Decimal, fee_ref: Decimal, at: TimeMs) -> Self {
        Self {
            units: amount,
            units_left: amount,
            unit_cost_ref: value_ref.safe_div(amount),
            unit_fee_cost_ref: fee_ref.safe_div(amount),
            acquired_at: at,
        }
    }

    /// Build a lot with an explicit per-unit cost.
    pub fn at_unit_cost(amount: Decimal, unit_cost_ref: Decimal, at: TimeMs) -> Self {
        Self {
            units: amount,
            units_left: amount,
            unit_cost_ref,
            unit_fee_cost_ref: Decimal::zero(),
            acquired_at: at,
        }
    }

    /// The batch as it arrives in another account: the consumed quantity
    /// becomes a full lot, cost basis and acquisition time are kept.
    pub fn transferred(&self) -> Self {
        Self {
            units: self.units_left,
            units_left: self.units_left,
            unit_cost_ref: self.unit_cost_ref,
            unit_fee_cost_ref: self.unit_fee_cost_ref,
            acquired_at: self.acquired_at,
        }
    }

    pub fn is_available(&self) -> bool {
        self.units_left.is_positive()
    }

    /// Total acquisition fee of the whole batch.
    pub fn fee_total_ref(&self) -> Decimal {
        self.unit_fee_cost_ref * self.units
    }

    /// Cost basis (including acquisition fee) of the units still left.
    pub fn cost_left_ref(&self) -> Decimal {
        (self.unit_cost_ref + self.unit_fee_cost_ref) * self.units_left
    }
}

impl std::fmt::Display for Lot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {} ({} left) x {} (fee total: {})",
            self.acquired_at,
            self.units,
            self.units_left,
            self.unit_cost_ref,
            self.fee_total_ref()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn acquired_spreads_value_and_fee_per_unit() {
        let lot = Lot::acquired(d("4000"), d("5000"), d("2.5"), TimeMs::new(1));
        assert_eq!(lot.unit_cost_ref, d("1.25"));
        assert_eq!(lot.unit_fee_cost_ref, d("0.000625"));
        assert_eq!(lot.fee_total_ref(), d("2.5"));
        assert_eq!(lot.units_left, lot.units);
    }

    #[test]
    fn acquired_with_zero_amount_has_zero_unit_cost() {
        let lot = Lot::acquired(Decimal::zero(), d("10"), d("1"), TimeMs::new(1));
        assert_eq!(lot.unit_cost_ref, Decimal::zero());
        assert_eq!(lot.unit_fee_cost_ref, Decimal::zero());
        assert!(!lot.is_available());
    }

    #[test]
    fn transferred_keeps_basis_and_time() {
        let mut lot = Lot::acquired(d("10"), d("3000"), d("10"), TimeMs::new(7));
        lot.units_left = d("2");
        let moved = lot.transferred();
        assert_eq!(moved.units, d("2"));
        assert_eq!(moved.units_left, d("2"));
        assert_eq!(moved.unit_cost_ref, d("300"));
        assert_eq!(moved.unit_fee_cost_ref, d("1"));
        assert_eq!(moved.acquired_at, TimeMs::new(7));
        assert_eq!(moved.cost_left_ref(), d("602"));
    }
}
