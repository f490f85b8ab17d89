//! Event journal — collects position events and exports them.
//!
//! Two export formats:
//! - **CSV**: one row per event for spreadsheets and log tooling
//! - **JSON**: the full event list, pretty-printed
//!
//! The journal is shared between the scheduler and every worker through
//! [`SharedJournal`].

use std::path::Path;
use std::sync::Arc;

use riskpilot_core::domain::{EventType, PositionEvent, PositionId};
use thiserror::Error;
use tokio::sync::Mutex;

pub type SharedJournal = Arc<Mutex<EventJournal>>;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV output is not valid UTF-8")]
    Utf8,
}

#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    events: Vec<PositionEvent>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedJournal {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn record(&mut self, events: impl IntoIterator<Item = PositionEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[PositionEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn for_position(&self, id: PositionId) -> impl Iterator<Item = &PositionEvent> {
        self.events.iter().filter(move |e| e.position_id == id)
    }

    // ─── Export ─────────────────────────────────────────────────────

    /// Columns: timestamp, position_id, ticker, event_type, detail
    pub fn to_csv(&self) -> Result<String, JournalError> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record(["timestamp", "position_id", "ticker", "event_type", "detail"])?;
        for e in &self.events {
            wtr.write_record([
                &e.timestamp.to_rfc3339(),
                &e.position_id.to_string(),
                &e.ticker,
                &e.event_type.to_string(),
                &e.detail,
            ])?;
        }
        let data = wtr
            .into_inner()
            .map_err(|e| JournalError::Csv(e.into_error().into()))?;
        String::from_utf8(data).map_err(|_| JournalError::Utf8)
    }

    pub fn to_json(&self) -> Result<String, JournalError> {
        Ok(serde_json::to_string_pretty(&self.events)?)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), JournalError> {
        write_file(path, &self.to_csv()?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), JournalError> {
        write_file(path, &self.to_json()?)
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), JournalError> {
    std::fs::write(path, content).map_err(|source| JournalError::Io {
        path: path.display().to_string(),
        source,
    })
}
