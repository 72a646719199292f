use crate::config::LedgerConfig;
use crate::datasource::{EventSource, SourceError};
use crate::domain::{Account, TimeMs};
use crate::engine::Engine;
use crate::report::Report;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// What a caller wants reported.
///
/// `year` expands to that calendar year in UTC; explicit `from_ms`/`to_ms`
/// take precedence over it. Without any bound the whole history is reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub from_ms: Option<i64>,
    #[serde(default)]
    pub to_ms: Option<i64>,
    #[serde(default)]
    pub accounts: Option<Vec<Account>>,
}

/// Inclusive time range of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRange {
    pub from: TimeMs,
    pub to: TimeMs,
}

impl ReportRequest {
    pub fn for_year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn range(&self) -> Result<ReportRange, RunError> {
        let (year_from, year_to) = match self.year {
            Some(year) => year_bounds(year).ok_or(RunError::InvalidYear(year))?,
            None => (i64::MIN, i64::MAX),
        };

        let from = TimeMs::new(self.from_ms.unwrap_or(year_from));
        let to = TimeMs::new(self.to_ms.unwrap_or(year_to));
        if from > to {
            return Err(RunError::InvalidRange(format!(
                "from {} is after to {}",
                from.as_ms(),
                to.as_ms()
            )));
        }
        Ok(ReportRange { from, to })
    }
}

/// Jan 1 00:00:00.000 to Dec 31 23:59:59.999 UTC, in ms.
fn year_bounds(year: i32) -> Option<(i64, i64)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let next = NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?.and_hms_opt(0, 0, 0)?;
    Some((
        Utc.from_utc_datetime(&start).timestamp_millis(),
        Utc.from_utc_datetime(&next).timestamp_millis() - 1,
    ))
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid year: {0}")]
    InvalidYear(i32),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("event producer failed: {0}")]
    Producer(String),
}

/// Runs one report: the source streams events into a channel, a fresh
/// engine consumes them one at a time.
#[derive(Debug, Clone)]
pub struct ReportRunner {
    source: Arc<dyn EventSource>,
    config: LedgerConfig,
    channel_capacity: usize,
}

impl ReportRunner {
    pub fn new(source: Arc<dyn EventSource>, config: LedgerConfig) -> Self {
        Self {
            source,
            config,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Ledgers are always rebuilt from the start of history up to the end of
    /// the requested range; only the output is scoped.
    pub async fn run(&self, request: &ReportRequest) -> Result<Report, RunError> {
        let range = request.range()?;
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("report_run", run_id = %run_id);

        async move {
            let (tx, mut rx) = mpsc::channel(self.channel_capacity);
            let source = Arc::clone(&self.source);
            let producer = tokio::spawn(async move { source.stream_events(range.to, tx).await });

            let mut engine = Engine::new(self.config.clone());
            while let Some(event) = rx.recv().await {
                engine.apply(event);
            }

            let sent = producer
                .await
                .map_err(|e| RunError::Producer(e.to_string()))??;

            let report = Report::scoped(
                run_id,
                engine.into_output(),
                range.from,
                request.accounts.as_deref(),
            );

            tracing::info!(
                events = sent,
                records = report.summary.records,
                conversions = report.summary.conversions,
                unmatched_withdrawals = report.unmatched_withdrawals.len(),
                errors = report.summary.errors,
                "report run finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
