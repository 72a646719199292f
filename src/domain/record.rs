//! Output records: one per processed event.

use crate::domain::{Account, Action, Asset, Decimal, FeeLeg, TimeMs};
use crate::ledger::{Lot, QueueSnapshot};
use serde::{Deserialize, Serialize};

/// Warning and error annotations attached to a record.
///
/// Several conditions can hit the same event; messages are joined with "; ".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Notes {
    pub fn warn(&mut self, msg: impl Into<String>) {
        append(&mut self.warning, msg.into());
    }

    pub fn fail(&mut self, msg: impl Into<String>) {
        append(&mut self.error, msg.into());
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

fn append(slot: &mut Option<String>, msg: String) {
    match slot {
        Some(existing) => {
            existing.push_str("; ");
            existing.push_str(&msg);
        }
        None => *slot = Some(msg),
    }
}

/// Lots consumed from one asset's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumedLots {
    pub asset: Asset,
    pub lots: Vec<Lot>,
}

impl ConsumedLots {
    pub fn new(asset: Asset, lots: Vec<Lot>) -> Self {
        Self { asset, lots }
    }

    pub fn total(&self) -> Decimal {
        self.lots.iter().map(|l| l.units_left).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub id: String,
    pub ts: TimeMs,
    pub account: Account,
    pub asset: Asset,
    pub amount: Decimal,
    pub fee: Decimal,
    pub fee_ref: Decimal,
    pub source: String,
    /// Lots added to the account.
    pub entries: Vec<Lot>,
    /// Record id of the withdrawal this deposit was paired with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_withdrawal: Option<String>,
    pub ledger_before: QueueSnapshot,
    pub ledger_after: QueueSnapshot,
    #[serde(flatten)]
    pub notes: Notes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRecord {
    pub id: String,
    pub ts: TimeMs,
    pub account: Account,
    pub asset: Asset,
    pub amount: Decimal,
    pub fee: Decimal,
    pub fee_ref: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_currency: Option<Asset>,
    pub destination: Account,
    /// Consumed lots: the withdrawn asset first, then the fee currency.
    pub entries: Vec<ConsumedLots>,
    pub ledger_before: QueueSnapshot,
    pub ledger_after: QueueSnapshot,
    #[serde(flatten)]
    pub notes: Notes,
}

/// Realized figures of a disposal, all in the reference currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub cost_ref: Decimal,
    pub proceeds_ref: Decimal,
    pub pnl_ref: Decimal,
    pub fee_paid_ref: Decimal,
}

/// A trade expressed as a directional flow from one asset into another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub id: String,
    pub ts: TimeMs,
    pub account: Account,
    pub action: Action,

    pub from_asset: Asset,
    pub from_decimals: u32,
    pub from_amount: Decimal,
    pub from_amount_net: Decimal,
    pub from_amount_ref: Decimal,
    pub from_amount_net_ref: Decimal,
    pub from_fee: FeeLeg,

    pub to_asset: Asset,
    pub to_decimals: u32,
    pub to_amount: Decimal,
    pub to_amount_net: Decimal,
    pub to_amount_ref: Decimal,
    pub to_amount_net_ref: Decimal,
    pub to_fee: FeeLeg,

    /// Units of `from_asset` paid per unit of `to_asset`.
    pub price: Decimal,
    pub price_ref: Decimal,
    /// Total fee of both legs in the reference currency.
    pub fee_ref: Decimal,

    pub is_margin_trade: bool,
    pub is_derivative: bool,
    pub is_physical: bool,
    /// Sub-ledger the trade was booked against, for margin trades.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_ledger: Option<String>,

    /// Consumed lots. The first group is the position the trade disposes of
    /// (empty when nothing is disposed), fee currencies follow.
    pub entries: Vec<ConsumedLots>,
    pub ledger_before: Vec<QueueSnapshot>,
    pub ledger_after: Vec<QueueSnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(flatten)]
    pub notes: Notes,
}

/// One emitted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReportRecord {
    Deposit(DepositRecord),
    Withdrawal(WithdrawalRecord),
    Conversion(Conversion),
}

impl ReportRecord {
    pub fn id(&self) -> &str {
        match self {
            ReportRecord::Deposit(r) => &r.id,
            ReportRecord::Withdrawal(r) => &r.id,
            ReportRecord::Conversion(r) => &r.id,
        }
    }

    pub fn ts(&self) -> TimeMs {
        match self {
            ReportRecord::Deposit(r) => r.ts,
            ReportRecord::Withdrawal(r) => r.ts,
            ReportRecord::Conversion(r) => r.ts,
        }
    }

    pub fn account(&self) -> &Account {
        match self {
            ReportRecord::Deposit(r) => &r.account,
            ReportRecord::Withdrawal(r) => &r.account,
            ReportRecord::Conversion(r) => &r.account,
        }
    }

    pub fn notes(&self) -> &Notes {
        match self {
            ReportRecord::Deposit(r) => &r.notes,
            ReportRecord::Withdrawal(r) => &r.notes,
            ReportRecord::Conversion(r) => &r.notes,
        }
    }

    pub fn notes_mut(&mut self) -> &mut Notes {
        match self {
            ReportRecord::Deposit(r) => &mut r.notes,
            ReportRecord::Withdrawal(r) => &mut r.notes,
            ReportRecord::Conversion(r) => &mut r.notes,
        }
    }

    pub fn as_conversion(&self) -> Option<&Conversion> {
        match self {
            ReportRecord::Conversion(c) => Some(c),
            _ => None,
        }
    }
}
