//! Report assembly: scoping engine output to what the caller asked for,
//! plain-text descriptions and summary figures.

use crate::domain::{Account, Conversion, Decimal, ReportRecord, TimeMs};
use crate::engine::{EngineOutput, PendingWithdrawal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub mod export;

pub use export::{conversions_csv, ExportError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub records: usize,
    pub conversions: usize,
    pub realized_pnl_ref: Decimal,
    pub fees_paid_ref: Decimal,
    /// Records carrying an error annotation.
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub run_id: Uuid,
    pub summary: ReportSummary,
    pub records: Vec<ReportRecord>,
    pub unmatched_withdrawals: Vec<PendingWithdrawal>,
    /// Human readable account history, one line per record.
    pub descriptions: BTreeMap<Account, Vec<String>>,
}

impl Report {
    /// Keep only records at or after `from` and, when `accounts` is given,
    /// belonging to one of them.
    pub fn scoped(
        run_id: Uuid,
        output: EngineOutput,
        from: TimeMs,
        accounts: Option<&[Account]>,
    ) -> Self {
        let in_scope =
            |ts: TimeMs, account: &Account| ts >= from && accounts.map_or(true, |a| a.contains(account));

        let records: Vec<ReportRecord> = output
            .records
            .into_iter()
            .filter(|r| in_scope(r.ts(), r.account()))
            .collect();
        let unmatched_withdrawals = output
            .unmatched_withdrawals
            .into_iter()
            .filter(|w| in_scope(w.ts, &w.account))
            .collect();

        let mut descriptions: BTreeMap<Account, Vec<String>> = BTreeMap::new();
        for record in &records {
            descriptions
                .entry(record.account().clone())
                .or_default()
                .push(describe(record));
        }

        Self {
            run_id,
            summary: summarize(&records),
            records,
            unmatched_withdrawals,
            descriptions,
        }
    }

    pub fn conversions(&self) -> impl Iterator<Item = &Conversion> {
        self.records.iter().filter_map(ReportRecord::as_conversion)
    }
}

fn summarize(records: &[ReportRecord]) -> ReportSummary {
    let mut summary = ReportSummary {
        records: records.len(),
        ..ReportSummary::default()
    };

    for record in records {
        let notes = record.notes();
        if notes.error.is_some() {
            summary.errors += 1;
        }
        if notes.warning.is_some() {
            summary.warnings += 1;
        }
        if let Some(conv) = record.as_conversion() {
            summary.conversions += 1;
            if let Some(result) = &conv.result {
                summary.realized_pnl_ref += result.pnl_ref;
                summary.fees_paid_ref += result.fee_paid_ref;
            }
        }
    }
    summary
}

/// One-line description of a record.
pub fn describe(record: &ReportRecord) -> String {
    match record {
        ReportRecord::Deposit(r) => match &r.matched_withdrawal {
            Some(w) => format!(
                "{}: Received {} {} (transfer {})",
                r.ts, r.amount, r.asset, w
            ),
            None => format!("{}: Deposited {} {}", r.ts, r.amount, r.asset),
        },
        ReportRecord::Withdrawal(r) => {
            let moved: Decimal = r.entries.first().map(|g| g.total()).unwrap_or_default();
            if r.destination.is_empty() {
                format!("{}: Withdrew {} {}", r.ts, moved, r.asset)
            } else {
                format!(
                    "{}: Moved {} {} from {} to {}",
                    r.ts, moved, r.asset, r.account, r.destination
                )
            }
        }
        ReportRecord::Conversion(c) => {
            let pnl = c
                .result
                .as_ref()
                .map(|r| r.pnl_ref.to_string())
                .unwrap_or_else(|| "n/a".to_string());
            format!(
                "{}: Convert {} {} worth {} to {}, generating a pnl of {}",
                c.ts, c.from_amount, c.from_asset, c.from_amount_ref, c.to_asset, pnl
            )
        }
    }
}
