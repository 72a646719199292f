//! Mock event source for testing without touching the filesystem.

use super::{send_ordered, EventSource, SourceError};
use crate::domain::{Event, TimeMs};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Mock event source that returns predefined events.
#[derive(Debug, Clone, Default)]
pub struct MockEventSource {
    events: Vec<Event>,
    error: Option<SourceError>,
}

impl MockEventSource {
    /// Create a new mock source with no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to the mock source.
    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Add multiple events to the mock source.
    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events.extend(events);
        self
    }

    /// Fail every stream with `error` after sending nothing.
    pub fn with_error(mut self, error: SourceError) -> Self {
        self.error = Some(error);
        self
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn stream_events(
        &self,
        until: TimeMs,
        out: mpsc::Sender<Event>,
    ) -> Result<usize, SourceError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        send_ordered(self.events.clone(), until, &out).await
    }
}
