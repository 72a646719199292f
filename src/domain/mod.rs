//! Domain types for the FIFO ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, Account, Asset, Action
//! - Input events (deposits, withdrawals, trades) with deterministic record ids
//! - Output records emitted by the engine

pub mod decimal;
pub mod event;
pub mod primitives;
pub mod record;

pub use decimal::Decimal;
pub use event::{sort_events_stable, Deposit, Event, FeeLeg, Trade, Withdrawal};
pub use primitives::{Account, Action, Asset, TimeMs};
pub use record::{
    ConsumedLots, Conversion, ConversionResult, DepositRecord, Notes, ReportRecord,
    WithdrawalRecord,
};
