//! Deterministic FIFO ledger engine.
//!
//! Events are applied one at a time in timestamp order. Every event mutates
//! the account books and yields at most one record; ledger shortfalls and
//! unexplained deposits are recorded as annotations and never stop a run.

use crate::config::LedgerConfig;
use crate::domain::{
    Account, Asset, ConsumedLots, Conversion, ConversionResult, Decimal, Deposit, DepositRecord,
    Event, FeeLeg, Notes, ReportRecord, TimeMs, Trade, Withdrawal, WithdrawalRecord,
};
use crate::ledger::{AccountBook, LedgerError, Lot, TakeFailure, Taken};

pub mod margin;
pub mod reconcile;
pub mod resolver;

pub use margin::{sub_ledger_name, MarginFlags, MarginStep};
pub use reconcile::{DepositResolution, PendingWithdrawal, ReconcileTolerances, ReconciliationTracker};
pub use resolver::TradeResolver;

/// Everything a finished run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub records: Vec<ReportRecord>,
    /// Withdrawals no deposit claimed. Informational.
    pub unmatched_withdrawals: Vec<PendingWithdrawal>,
}

pub struct Engine {
    config: LedgerConfig,
    resolver: TradeResolver,
    book: AccountBook,
    tracker: ReconciliationTracker,
    margin: MarginFlags,
    last_ts: Option<TimeMs>,

    // Outputs accumulated during processing.
    records: Vec<ReportRecord>,
}

/// Split a take outcome into the lots obtained and the error, if any.
fn settle(outcome: Result<Taken, TakeFailure>) -> (Vec<Lot>, Option<LedgerError>) {
    match outcome {
        Ok(taken) => (taken.lots, None),
        Err(failure) => (failure.partial.lots, Some(failure.error)),
    }
}

/// Cost basis of disposed lots, rounded per term and on accumulation.
fn realized_cost(lots: &[Lot]) -> Decimal {
    lots.iter().fold(Decimal::zero(), |acc, lot| {
        (acc + ((lot.unit_cost_ref + lot.unit_fee_cost_ref) * lot.units_left).round_ref())
            .round_ref()
    })
}

/// Result of disposing of held units: lots paid for, proceeds received.
fn disposal_result(lots: &[Lot], conv: &Conversion) -> ConversionResult {
    let cost_ref = realized_cost(lots);
    let proceeds_ref = (conv.from_amount_ref - conv.fee_ref).round_ref();
    ConversionResult {
        cost_ref,
        proceeds_ref,
        pnl_ref: (proceeds_ref - cost_ref).round_ref(),
        fee_paid_ref: conv.fee_ref,
    }
}

/// Economic result of buying back a short: the lots record what the short
/// sale received and the opening fees, the trade is what the buy-back cost.
fn short_close_result(lots: &[Lot], conv: &Conversion) -> ConversionResult {
    let received: Decimal = lots
        .iter()
        .map(|l| (l.unit_cost_ref * l.units_left).round_ref())
        .sum();
    let opening_fees: Decimal = lots
        .iter()
        .map(|l| (l.unit_fee_cost_ref * l.units_left).round_ref())
        .sum();
    let proceeds_ref = (received - opening_fees).round_ref();
    let cost_ref = (conv.from_amount_ref + conv.fee_ref).round_ref();
    ConversionResult {
        cost_ref,
        proceeds_ref,
        pnl_ref: (proceeds_ref - cost_ref).round_ref(),
        fee_paid_ref: conv.fee_ref,
    }
}

impl Engine {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            resolver: TradeResolver::new(&config),
            tracker: ReconciliationTracker::new(ReconcileTolerances::from(&config)),
            margin: MarginFlags::new(config.margin_reset_on_flat),
            book: AccountBook::new(),
            last_ts: None,
            records: Vec::new(),
            config,
        }
    }

    /// Apply every event and return the outputs.
    pub fn run(config: LedgerConfig, events: impl IntoIterator<Item = Event>) -> EngineOutput {
        let mut engine = Self::new(config);
        for event in events {
            engine.apply(event);
        }
        engine.into_output()
    }

    pub fn book(&self) -> &AccountBook {
        &self.book
    }

    pub fn records(&self) -> &[ReportRecord] {
        &self.records
    }

    pub fn pending_withdrawals(&self) -> &[PendingWithdrawal] {
        self.tracker.pending()
    }

    /// Apply a single event and return the record it produced.
    pub fn apply(&mut self, event: Event) -> Option<&ReportRecord> {
        let ts = event.ts();
        let previous = self.last_ts;
        self.last_ts = Some(previous.map_or(ts, |p| p.max(ts)));

        let id = event.record_id();
        tracing::debug!(
            kind = event.kind(),
            account = %event.account(),
            ts = %ts,
            id = %id,
            "applying event"
        );

        let mut record = match event {
            Event::Deposit(deposit) => ReportRecord::Deposit(self.apply_deposit(deposit, id)),
            Event::Withdrawal(withdrawal) => {
                ReportRecord::Withdrawal(self.apply_withdrawal(withdrawal, id))
            }
            Event::Trade(trade) => ReportRecord::Conversion(self.apply_trade(trade, id)?),
        };

        if let Some(previous) = previous.filter(|p| ts < *p) {
            tracing::warn!(id = %record.id(), ts = %ts, previous = %previous, "event out of order");
            record.notes_mut().warn(format!(
                "event at {} applied after an event at {}",
                ts, previous
            ));
        }

        self.records.push(record);
        self.records.last()
    }

    pub fn into_output(self) -> EngineOutput {
        EngineOutput {
            records: self.records,
            unmatched_withdrawals: self.tracker.into_pending(),
        }
    }

    fn apply_deposit(&mut self, deposit: Deposit, id: String) -> DepositRecord {
        let before = self.book.read(&deposit.account, None, &deposit.asset);
        let mut notes = Notes::default();

        let resolution = self
            .tracker
            .resolve_deposit(&deposit, &self.config.reference_currency);
        let (entries, matched_withdrawal) = match resolution {
            DepositResolution::Matched {
                withdrawal,
                lots,
                warning,
            } => {
                if let Some(warning) = warning {
                    notes.warn(warning);
                }
                (lots, Some(withdrawal.record_id))
            }
            DepositResolution::Synthesized { lot, warning } => {
                notes.warn(warning);
                (vec![lot], None)
            }
            DepositResolution::Unmatched { error } => {
                tracing::warn!(id = %id, account = %deposit.account, error = %error, "unmatched deposit");
                notes.fail(error.to_string());
                (Vec::new(), None)
            }
        };

        let holdings = self.book.ledger(&deposit.account, None);
        for lot in &entries {
            holdings.add(&deposit.asset, lot.clone());
        }
        let after = self.book.read(&deposit.account, None, &deposit.asset);

        DepositRecord {
            id,
            ts: deposit.ts,
            account: deposit.account,
            asset: deposit.asset,
            amount: deposit.amount,
            fee: deposit.fee,
            fee_ref: deposit.fee_ref,
            source: deposit.source,
            entries,
            matched_withdrawal,
            ledger_before: before,
            ledger_after: after,
            notes,
        }
    }

    fn apply_withdrawal(&mut self, withdrawal: Withdrawal, id: String) -> WithdrawalRecord {
        let account = withdrawal.account.clone();
        let asset = withdrawal.asset.clone();
        let before = self.book.read(&account, None, &asset);
        let mut notes = Notes::default();

        let precision = self.config.precision_for(&asset, 0);
        let (lots, error) =
            settle(self.book.ledger(&account, None).take(&asset, withdrawal.amount, precision));
        if let Some(error) = error {
            tracing::warn!(id = %id, account = %account, error = %error, "withdrawal shortfall");
            notes.fail(error.to_string());
        }

        let mut entries = vec![ConsumedLots::new(asset.clone(), lots.clone())];
        let mut fee_lots = Vec::new();

        // A fee in the withdrawn asset is already part of `amount`.
        let fee_currency = withdrawal
            .fee_currency
            .clone()
            .filter(|c| !c.is_empty() && *c != asset);
        if let Some(fee_currency) = fee_currency {
            let precision = self.config.precision_for(&fee_currency, 0);
            let (lots, error) = settle(self.book.ledger(&account, None).take(
                &fee_currency,
                withdrawal.fee.abs(),
                precision,
            ));
            if let Some(error) = error {
                tracing::warn!(id = %id, account = %account, error = %error, "withdrawal fee shortfall");
                notes.warn(format!("fee: {}", error));
            }
            if !lots.is_empty() {
                let group = ConsumedLots::new(fee_currency.clone(), lots);
                entries.push(group.clone());
                fee_lots.push(group);
            }
        }

        let after = self.book.read(&account, None, &asset);

        self.tracker.record_withdrawal(PendingWithdrawal {
            record_id: id.clone(),
            ts: withdrawal.ts,
            account: account.clone(),
            destination: withdrawal.destination.clone(),
            asset: asset.clone(),
            amount: withdrawal.amount,
            lots,
            fee_lots,
        });

        WithdrawalRecord {
            id,
            ts: withdrawal.ts,
            account,
            asset,
            amount: withdrawal.amount,
            fee: withdrawal.fee,
            fee_ref: withdrawal.fee_ref,
            fee_currency: withdrawal.fee_currency,
            destination: withdrawal.destination,
            entries,
            ledger_before: before,
            ledger_after: after,
            notes,
        }
    }

    fn apply_trade(&mut self, trade: Trade, id: String) -> Option<Conversion> {
        let Some(mut conv) = self.resolver.resolve(&trade, id) else {
            tracing::warn!(account = %trade.account, ts = %trade.ts, "skipping trade with unknown action");
            return None;
        };

        if trade.is_margin_trade {
            self.apply_margin_trade(&trade, &mut conv);
        } else {
            self.apply_spot_trade(&mut conv);
        }
        Some(conv)
    }

    fn apply_spot_trade(&mut self, conv: &mut Conversion) {
        let account = conv.account.clone();
        let (to, from) = (conv.to_asset.clone(), conv.from_asset.clone());
        conv.ledger_before = vec![
            self.book.read(&account, None, &to),
            self.book.read(&account, None, &from),
        ];

        let from_precision = self.config.precision_for(&from, conv.from_decimals);
        let holdings = self.book.ledger(&account, None);
        holdings.add(
            &to,
            Lot::acquired(conv.to_amount, conv.from_amount_ref, conv.fee_ref, conv.ts),
        );
        let (lots, error) = settle(holdings.take(&from, conv.from_amount, from_precision));
        conv.entries.push(ConsumedLots::new(from.clone(), lots));

        self.take_fees(conv);

        conv.ledger_after = vec![
            self.book.read(&account, None, &to),
            self.book.read(&account, None, &from),
        ];

        match error {
            Some(error) => {
                tracing::warn!(id = %conv.id, account = %account, error = %error, "conversion shortfall");
                conv.notes.fail(error.to_string());
            }
            None => conv.result = Some(disposal_result(&conv.entries[0].lots, conv)),
        }
    }

    fn apply_margin_trade(&mut self, trade: &Trade, conv: &mut Conversion) {
        let account = conv.account.clone();
        let base = trade.base_asset.clone();
        let instrument = sub_ledger_name(&trade.base_asset, &trade.quote_asset);
        conv.sub_ledger = Some(instrument.clone());

        let precision = self.config.precision_for(&base, trade.base_decimals);
        let holds_units = self
            .book
            .ledger(&account, Some(&instrument))
            .has_units(&base);
        let Some(step) = self
            .margin
            .step(&account, &instrument, conv.action, holds_units)
        else {
            return;
        };
        tracing::debug!(id = %conv.id, instrument = %instrument, step = ?step, "margin trade");

        conv.ledger_before = vec![self.book.read(&account, Some(&instrument), &base)];
        let position = self.book.ledger(&account, Some(&instrument));

        let (lots, error) = match step {
            MarginStep::OpenLong | MarginStep::IncreaseLong => {
                position.add(
                    &base,
                    Lot::acquired(conv.to_amount, conv.from_amount_ref, conv.fee_ref, conv.ts),
                );
                (Vec::new(), None)
            }
            MarginStep::OpenShort | MarginStep::IncreaseShort => {
                position.add(
                    &base,
                    Lot::acquired(conv.from_amount, conv.from_amount_ref, conv.fee_ref, conv.ts),
                );
                (Vec::new(), None)
            }
            MarginStep::CloseLong => settle(position.take(&base, conv.from_amount, precision)),
            MarginStep::CloseShort => settle(position.take(&base, conv.to_amount, precision)),
        };
        conv.entries.push(ConsumedLots::new(base.clone(), lots));

        self.take_fees(conv);

        conv.ledger_after = vec![self.book.read(&account, Some(&instrument), &base)];

        if let Some(error) = error {
            tracing::warn!(id = %conv.id, account = %account, error = %error, "margin close shortfall");
            conv.notes.fail(error.to_string());
            return;
        }
        conv.result = match step {
            MarginStep::CloseLong => Some(disposal_result(&conv.entries[0].lots, conv)),
            MarginStep::CloseShort if self.config.margin_short_close_economic => {
                Some(short_close_result(&conv.entries[0].lots, conv))
            }
            MarginStep::CloseShort => Some(disposal_result(&conv.entries[0].lots, conv)),
            _ => None,
        };
    }

    /// Pay every charged fee leg out of the account's primary holdings.
    fn take_fees(&mut self, conv: &mut Conversion) {
        let legs: Vec<FeeLeg> = [&conv.to_fee, &conv.from_fee]
            .into_iter()
            .filter(|leg| leg.is_charged())
            .cloned()
            .collect();

        for leg in legs {
            let precision = self.config.precision_for(&leg.currency, leg.decimals);
            let (lots, error) = settle(self.book.ledger(&conv.account, None).take(
                &leg.currency,
                leg.amount,
                precision,
            ));
            if let Some(error) = error {
                tracing::warn!(id = %conv.id, account = %conv.account, error = %error, "fee shortfall");
                conv.notes.warn(format!("fee: {}", error));
            }
            if !lots.is_empty() {
                conv.entries.push(ConsumedLots::new(leg.currency, lots));
            }
        }
    }

    /// Units of `asset` currently held in the primary ledger of `account`.
    pub fn holdings(&self, account: &Account, asset: &Asset) -> Decimal {
        self.book.read(account, None, asset).total_left
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Action;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn deposit(ts: i64, account: &str, asset: &str, amount: &str) -> Event {
        Event::Deposit(Deposit {
            ts: TimeMs::new(ts),
            account: Account::new(account),
            asset: Asset::new(asset),
            amount: d(amount),
            fee: Decimal::zero(),
            fee_ref: Decimal::zero(),
            source: String::new(),
            tx_id: String::new(),
        })
    }

    fn buy_btc_for_eur(ts: i64, btc: &str, eur: &str) -> Event {
        Event::Trade(Trade {
            ts: TimeMs::new(ts),
            account: Account::new("A"),
            action: Action::Buy,
            base_asset: Asset::new("BTC"),
            quote_asset: Asset::new("EUR"),
            base_decimals: 8,
            quote_decimals: 2,
            amount: d(btc),
            price: d(eur).safe_div(d(btc)),
            price_ref: d(eur).safe_div(d(btc)),
            value: d(eur),
            value_ref: d(eur),
            quote_price_ref: d("1"),
            fee: FeeLeg::default(),
            quote_fee: FeeLeg::default(),
            is_margin_trade: false,
            is_derivative: false,
            is_physical: false,
            tx_id: String::new(),
        })
    }

    #[test]
    fn realized_cost_rounds_each_term() {
        let lots = vec![
            Lot::at_unit_cost(d("1"), d("0.33333"), TimeMs::new(1)),
            Lot::at_unit_cost(d("1"), d("0.33333"), TimeMs::new(2)),
        ];
        assert_eq!(realized_cost(&lots), d("0.6666"));
    }

    #[test]
    fn deposit_then_buy_moves_cost_basis() {
        let mut engine = Engine::new(LedgerConfig::default());
        engine.apply(deposit(1, "A", "EUR", "1000"));
        let record = engine.apply(buy_btc_for_eur(2, "0.5", "600")).cloned();

        let conv = record.and_then(|r| r.as_conversion().cloned()).unwrap();
        let result = conv.result.unwrap();
        assert_eq!(result.cost_ref, d("600"));
        assert_eq!(result.proceeds_ref, d("600"));
        assert_eq!(result.pnl_ref, Decimal::zero());
        assert_eq!(conv.entries[0].asset, Asset::new("EUR"));
        assert_eq!(conv.ledger_before[0].total_left, Decimal::zero());
        assert_eq!(conv.ledger_after[0].total_left, d("0.5"));

        let a = Account::new("A");
        assert_eq!(engine.holdings(&a, &Asset::new("EUR")), d("400"));
        assert_eq!(engine.holdings(&a, &Asset::new("BTC")), d("0.5"));
    }

    #[test]
    fn shortfall_suppresses_result_but_run_continues() {
        let mut engine = Engine::new(LedgerConfig::default());
        engine.apply(deposit(1, "A", "EUR", "100"));
        engine.apply(buy_btc_for_eur(2, "1", "150"));
        engine.apply(deposit(3, "A", "EUR", "50"));

        let records = engine.records();
        assert_eq!(records.len(), 3);
        let conv = records[1].as_conversion().unwrap();
        assert!(conv.result.is_none());
        assert_eq!(
            conv.notes.error.as_deref(),
            Some("insufficient EUR: required 150, available 100, missing 50")
        );
        assert_eq!(conv.entries[0].total(), d("100"));
        assert_eq!(engine.holdings(&Account::new("A"), &Asset::new("EUR")), d("50"));
    }

    #[test]
    fn unknown_trade_produces_no_record() {
        let mut engine = Engine::new(LedgerConfig::default());
        let mut trade = buy_btc_for_eur(1, "1", "1");
        if let Event::Trade(t) = &mut trade {
            t.action = Action::Unknown;
        }
        assert!(engine.apply(trade).is_none());
        assert!(engine.records().is_empty());
    }

    #[test]
    fn out_of_order_event_is_flagged() {
        let mut engine = Engine::new(LedgerConfig::default());
        engine.apply(deposit(2_000, "A", "EUR", "1"));
        let record = engine.apply(deposit(1_000, "A", "EUR", "1")).cloned().unwrap();
        assert!(record
            .notes()
            .warning
            .as_deref()
            .unwrap()
            .contains("applied after"));
    }

    #[test]
    fn unmatched_crypto_deposit_adds_nothing() {
        let output = Engine::run(LedgerConfig::default(), vec![deposit(1, "A", "BTC", "1")]);
        match &output.records[0] {
            ReportRecord::Deposit(r) => {
                assert!(r.entries.is_empty());
                assert!(r.notes.error.as_deref().unwrap().contains("no matching withdrawal"));
                assert_eq!(r.ledger_after.total_left, Decimal::zero());
            }
            other => panic!("expected deposit record, got {:?}", other),
        }
        assert!(output.unmatched_withdrawals.is_empty());
    }
}
