//! Report runs: wiring an event source to a fresh engine.

pub mod runner;

pub use runner::{ReportRange, ReportRequest, ReportRunner, RunError};
