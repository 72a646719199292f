//! Events read from a local JSON file.

use super::{send_ordered, EventSource, SourceError};
use crate::domain::{Event, TimeMs};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Reads either a JSON array of events or one event per line.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse file contents. Blank lines are ignored in the line format.
    pub fn parse(content: &str) -> Result<Vec<Event>, SourceError> {
        let trimmed = content.trim_start();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed)
                .map_err(|e| SourceError::ParseError(e.to_string()));
        }

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                serde_json::from_str(line)
                    .map_err(|e| SourceError::ParseError(format!("line {}: {}", idx + 1, e)))
            })
            .collect()
    }

    async fn load(&self) -> Result<Vec<Event>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Io(format!("{}: {}", self.path.display(), e)))?;
        Self::parse(&content)
    }
}

#[async_trait]
impl EventSource for JsonFileSource {
    async fn stream_events(
        &self,
        until: TimeMs,
        out: mpsc::Sender<Event>,
    ) -> Result<usize, SourceError> {
        let events = self.load().await?;
        tracing::debug!(path = %self.path.display(), events = events.len(), "loaded events");
        send_ordered(events, until, &out).await
    }
}
