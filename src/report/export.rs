//! CSV export of realized conversions.

use crate::domain::ReportRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv write error: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer error: {0}")]
    Buffer(String),
}

const HEADER: [&str; 17] = [
    "ts",
    "id",
    "account",
    "action",
    "from_asset",
    "from_amount",
    "from_amount_ref",
    "to_asset",
    "to_amount",
    "price_ref",
    "fee_ref",
    "cost_ref",
    "proceeds_ref",
    "pnl_ref",
    "sub_ledger",
    "warning",
    "error",
];

/// One row per conversion, in record order. Result columns stay empty for
/// conversions that could not be valued.
pub fn conversions_csv(records: &[ReportRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;

    for conv in records.iter().filter_map(ReportRecord::as_conversion) {
        let (cost, proceeds, pnl) = match &conv.result {
            Some(r) => (
                r.cost_ref.to_string(),
                r.proceeds_ref.to_string(),
                r.pnl_ref.to_string(),
            ),
            None => (String::new(), String::new(), String::new()),
        };

        writer.write_record([
            conv.ts.to_string(),
            conv.id.clone(),
            conv.account.to_string(),
            conv.action.to_string(),
            conv.from_asset.to_string(),
            conv.from_amount.to_string(),
            conv.from_amount_ref.to_string(),
            conv.to_asset.to_string(),
            conv.to_amount.to_string(),
            conv.price_ref.to_string(),
            conv.fee_ref.to_string(),
            cost,
            proceeds,
            pnl,
            conv.sub_ledger.clone().unwrap_or_default(),
            conv.notes.warning.clone().unwrap_or_default(),
            conv.notes.error.clone().unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Buffer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::domain::{Account, Action, Asset, Decimal, Deposit, Event, FeeLeg, TimeMs, Trade};
    use crate::engine::Engine;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn records() -> Vec<ReportRecord> {
        let deposit = Event::Deposit(Deposit {
            ts: TimeMs::new(0),
            account: Account::new("A"),
            asset: Asset::new("EUR"),
            amount: d("100"),
            fee: Decimal::zero(),
            fee_ref: Decimal::zero(),
            source: String::new(),
            tx_id: "d1".to_string(),
        });
        let buy = |ts: i64, tx_id: &str, eur: &str| {
            Event::Trade(Trade {
                ts: TimeMs::new(ts),
                account: Account::new("A"),
                action: Action::Buy,
                base_asset: Asset::new("BTC"),
                quote_asset: Asset::new("EUR"),
                base_decimals: 8,
                quote_decimals: 2,
                amount: d("1"),
                price: d(eur),
                price_ref: d(eur),
                value: d(eur),
                value_ref: d(eur),
                quote_price_ref: d("1"),
                fee: FeeLeg::default(),
                quote_fee: FeeLeg::default(),
                is_margin_trade: false,
                is_derivative: false,
                is_physical: false,
                tx_id: tx_id.to_string(),
            })
        };
        Engine::run(
            LedgerConfig::default(),
            vec![deposit, buy(1, "t1", "60"), buy(2, "t2", "60")],
        )
        .records
    }

    #[test]
    fn writes_header_and_one_row_per_conversion() {
        let csv = conversions_csv(&records()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ts,id,account,action,from_asset"));
        assert!(lines[1].contains(",t1,A,BUY,EUR,60,60,BTC,1,60,0,60,60,0,,,"));
    }

    #[test]
    fn failed_conversion_has_empty_result_columns() {
        let csv = conversions_csv(&records()).unwrap();
        let row = csv.lines().nth(2).unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(row.as_bytes());
        let fields = reader.records().next().unwrap().unwrap();
        assert_eq!(&fields[1], "t2");
        assert_eq!(&fields[11], "");
        assert_eq!(&fields[13], "");
        assert_eq!(
            &fields[16],
            "insufficient EUR: required 60, available 40, missing 20"
        );
    }
}
