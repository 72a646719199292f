//! Input events streamed into the ledger engine.

use crate::domain::decimal::lenient;
use crate::domain::{Account, Action, Asset, Decimal, TimeMs};
use serde::{Deserialize, Serialize};

/// A transfer of an asset into an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub ts: TimeMs,
    pub account: Account,
    pub asset: Asset,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub fee: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub fee_ref: Decimal,
    /// Where the funds came from, as reported by the feed (informational).
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub tx_id: String,
}

/// A transfer of an asset out of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub ts: TimeMs,
    pub account: Account,
    pub asset: Asset,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub fee: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub fee_ref: Decimal,
    /// Set when the fee is charged in another currency than `asset`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_currency: Option<Asset>,
    /// Account expected to receive the funds. Empty when unknown.
    #[serde(default)]
    pub destination: Account,
    #[serde(default)]
    pub tx_id: String,
}

/// One fee leg of a trade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeLeg {
    #[serde(default)]
    pub currency: Asset,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub amount_ref: Decimal,
    #[serde(default)]
    pub decimals: u32,
}

impl FeeLeg {
    /// A leg is charged when it names a currency and carries a non-zero amount.
    pub fn is_charged(&self) -> bool {
        !self.currency.is_empty() && !self.amount.is_zero()
    }
}

/// An asset-pair trade. Amounts follow exchange conventions: `amount` is in
/// the base asset, `value` in the quote asset, `price` is quote per base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub ts: TimeMs,
    pub account: Account,
    pub action: Action,
    pub base_asset: Asset,
    pub quote_asset: Asset,
    #[serde(default)]
    pub base_decimals: u32,
    #[serde(default)]
    pub quote_decimals: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub price: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub price_ref: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub value: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub value_ref: Decimal,
    #[serde(default, deserialize_with = "lenient")]
    pub quote_price_ref: Decimal,
    #[serde(default)]
    pub fee: FeeLeg,
    #[serde(default)]
    pub quote_fee: FeeLeg,
    #[serde(default)]
    pub is_margin_trade: bool,
    #[serde(default)]
    pub is_derivative: bool,
    #[serde(default)]
    pub is_physical: bool,
    #[serde(default)]
    pub tx_id: String,
}

/// Any event the engine accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Deposit(Deposit),
    Withdrawal(Withdrawal),
    Trade(Trade),
}

impl Event {
    pub fn ts(&self) -> TimeMs {
        match self {
            Event::Deposit(d) => d.ts,
            Event::Withdrawal(w) => w.ts,
            Event::Trade(t) => t.ts,
        }
    }

    pub fn account(&self) -> &Account {
        match self {
            Event::Deposit(d) => &d.account,
            Event::Withdrawal(w) => &w.account,
            Event::Trade(t) => &t.account,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Deposit(_) => "deposit",
            Event::Withdrawal(_) => "withdrawal",
            Event::Trade(_) => "trade",
        }
    }

    /// Stable identifier for the record produced from this event.
    ///
    /// Priority: `tx_id` (if present) > hash of deterministic fields.
    pub fn record_id(&self) -> String {
        match self {
            Event::Deposit(d) => compute_record_id(
                &d.tx_id,
                &[
                    "deposit",
                    d.account.as_str(),
                    d.asset.as_str(),
                    &d.amount.to_canonical_string(),
                ],
                d.ts,
            ),
            Event::Withdrawal(w) => compute_record_id(
                &w.tx_id,
                &[
                    "withdrawal",
                    w.account.as_str(),
                    w.asset.as_str(),
                    &w.amount.to_canonical_string(),
                    w.destination.as_str(),
                ],
                w.ts,
            ),
            Event::Trade(t) => compute_record_id(
                &t.tx_id,
                &[
                    "trade",
                    t.account.as_str(),
                    &t.action.to_string(),
                    t.base_asset.as_str(),
                    t.quote_asset.as_str(),
                    &t.amount.to_canonical_string(),
                    &t.value.to_canonical_string(),
                ],
                t.ts,
            ),
        }
    }
}

/// Truncating a SHA-256 digest to 128 bits leaves ~2^64 collision resistance,
/// far above the number of events a single report run handles.
fn compute_record_id(tx_id: &str, fields: &[&str], ts: TimeMs) -> String {
    let tx_id = tx_id.trim();
    if !tx_id.is_empty() {
        return tx_id.to_string();
    }

    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u32).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update(ts.as_ms().to_le_bytes());

    let hash = hasher.finalize();
    format!("hash:{}", hex::encode(&hash[..16]))
}

/// Sort events by timestamp, keeping input order for equal timestamps.
pub fn sort_events_stable(events: &mut [Event]) {
    events.sort_by_key(|e| e.ts());
}
