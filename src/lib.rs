pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod orchestration;
pub mod report;

pub use config::{Config, LedgerConfig};
pub use datasource::{EventSource, JsonFileSource, MockEventSource, SourceError};
pub use domain::{Account, Action, Asset, Decimal, Event, ReportRecord, TimeMs};
pub use engine::{Engine, EngineOutput};
pub use error::AppError;
pub use orchestration::{ReportRequest, ReportRunner, RunError};
pub use report::Report;
