//! Event source abstraction feeding report runs.

use crate::domain::{sort_events_stable, Event, TimeMs};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

pub mod file;
pub mod mock;

pub use file::JsonFileSource;
pub use mock::MockEventSource;

/// Producer side of a report run.
///
/// Implementations deliver events in deterministic order: ascending
/// timestamp, input order on ties.
#[async_trait]
pub trait EventSource: Send + Sync + fmt::Debug {
    /// Send every event with `ts <= until` into `out`.
    ///
    /// # Returns
    /// Number of events sent.
    async fn stream_events(
        &self,
        until: TimeMs,
        out: mpsc::Sender<Event>,
    ) -> Result<usize, SourceError>;
}

/// Error type for event source operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The backing store could not be read.
    Io(String),
    /// Malformed event data (with location when known).
    ParseError(String),
    /// The consumer stopped receiving.
    ChannelClosed,
    /// Other error
    Other(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Io(msg) => write!(f, "I/O error: {}", msg),
            SourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            SourceError::ChannelClosed => write!(f, "Event channel closed"),
            SourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Order `events` and send those at or before `until`.
pub(crate) async fn send_ordered(
    mut events: Vec<Event>,
    until: TimeMs,
    out: &mpsc::Sender<Event>,
) -> Result<usize, SourceError> {
    sort_events_stable(&mut events);

    let mut sent = 0;
    for event in events.into_iter().take_while(|e| e.ts() <= until) {
        out.send(event)
            .await
            .map_err(|_| SourceError::ChannelClosed)?;
        sent += 1;
    }
    Ok(sent)
}
