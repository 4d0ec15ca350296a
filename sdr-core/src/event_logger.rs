//! Append-only event journal plus a process-wide bounded ring of recent
//! events, grounded in `core/logger.py`'s `EventLogger`. The ring pattern —
//! a mutex-protected `VecDeque` trimmed from the front — follows
//! `SystemStatus::diagnostics` in `src/status.rs` of the teacher repo.

use crate::transcriber::TranscriptIndex;
use chrono::Utc;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

const DEFAULT_RING_CAPACITY: usize = 200;

/// One logged detection. `extra` carries caller-supplied metadata keys
/// (`power_db`, `duration_s`, and anything else passed to `log_event`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub time: String,
    pub freq: f64,
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn global_ring() -> &'static Mutex<VecDeque<Event>> {
    static RING: OnceLock<Mutex<VecDeque<Event>>> = OnceLock::new();
    RING.get_or_init(|| Mutex::new(VecDeque::with_capacity(DEFAULT_RING_CAPACITY)))
}

/// Return a defensive copy of up to `n` most recent events, oldest first.
#[must_use]
pub fn recent_events(n: usize) -> Vec<Event> {
    let ring = global_ring().lock().expect("event ring mutex poisoned");
    let skip = ring.len().saturating_sub(n);
    ring.iter().skip(skip).cloned().collect()
}

/// Appends events to a CSV journal and a JSONL journal, maintains an
/// instance-local history, and mirrors each append into the process-wide
/// ring. Either journal file may fail to open; that failure is logged and
/// does not prevent the logger from working.
pub struct EventLogger {
    csv: Option<csv::Writer<File>>,
    jsonl: Option<File>,
    transcript_index: Option<Box<dyn TranscriptIndex>>,
    events: Vec<Event>,
    ring_capacity: usize,
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("events_logged", &self.events.len())
            .field("has_transcript_index", &self.transcript_index.is_some())
            .finish()
    }
}

impl EventLogger {
    /// Open (or create) the CSV and JSONL journals at the given paths.
    /// A write header is emitted to the CSV file only when it is empty.
    pub fn new(
        csv_path: &Path,
        jsonl_path: &Path,
        transcript_index: Option<Box<dyn TranscriptIndex>>,
    ) -> Self {
        let csv = match OpenOptions::new().create(true).append(true).read(true).open(csv_path) {
            Ok(f) => {
                let is_empty = f.metadata().map(|m| m.len() == 0).unwrap_or(false);
                let mut writer = WriterBuilder::new().has_headers(false).from_writer(f);
                if is_empty {
                    if let Err(e) = writer.write_record(["Time", "Frequency_MHz", "Transcribed_Text"]) {
                        log::error!("failed to write CSV header: {e}");
                    } else if let Err(e) = writer.flush() {
                        log::error!("failed to flush CSV header: {e}");
                    }
                }
                Some(writer)
            }
            Err(e) => {
                log::error!("failed to open log file {}: {e}", csv_path.display());
                None
            }
        };
        let jsonl = match OpenOptions::new().create(true).append(true).open(jsonl_path) {
            Ok(f) => Some(f),
            Err(e) => {
                log::error!("failed to open jsonl log file {}: {e}", jsonl_path.display());
                None
            }
        };
        Self {
            csv,
            jsonl,
            transcript_index,
            events: Vec::new(),
            ring_capacity: DEFAULT_RING_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Build and record an event. Journal and index failures are logged and
    /// swallowed; the event is always appended to the local history and the
    /// process-wide ring.
    pub fn log_event(&mut self, freq_hz: f64, text: Option<&str>, metadata: Map<String, Value>) -> Event {
        let time = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let log_text = text.unwrap_or("").to_string();
        let event = Event {
            time: time.clone(),
            freq: freq_hz,
            text: log_text.clone(),
            extra: metadata,
        };

        self.events.push(event.clone());
        {
            let mut ring = global_ring().lock().expect("event ring mutex poisoned");
            ring.push_back(event.clone());
            while ring.len() > self.ring_capacity {
                ring.pop_front();
            }
        }

        if let Some(csv) = self.csv.as_mut() {
            let freq_mhz = freq_hz / 1e6;
            let record = [time.clone(), format!("{freq_mhz:.6}"), log_text.clone()];
            if let Err(e) = csv.write_record(record) {
                log::error!("failed to write CSV event: {e}");
            } else if let Err(e) = csv.flush() {
                log::error!("failed to flush CSV journal: {e}");
            }
        }
        if let Some(jsonl) = self.jsonl.as_mut() {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if let Err(e) = writeln!(jsonl, "{line}") {
                        log::error!("failed to write jsonl event: {e}");
                    } else if let Err(e) = jsonl.flush() {
                        log::error!("failed to flush jsonl journal: {e}");
                    }
                }
                Err(e) => log::error!("failed to serialize event: {e}"),
            }
        }

        if let Some(index) = self.transcript_index.as_ref() {
            if !log_text.is_empty() {
                if let Err(e) = index.add(&log_text, freq_hz, &time) {
                    log::debug!("transcript index add failed: {e}");
                }
            }
        }

        event
    }

    /// Same as the free function `recent_events`, provided as a method for
    /// call-site symmetry with the rest of the logger API.
    #[must_use]
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        recent_events(n)
    }

    /// Close any open journal handles. Idempotent.
    pub fn close(&mut self) {
        self.csv = None;
        self.jsonl = None;
    }
}

impl Drop for EventLogger {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_paths(tag: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir();
        (
            dir.join(format!("sdr_core_test_{tag}.csv")),
            dir.join(format!("sdr_core_test_{tag}.jsonl")),
        )
    }

    #[test]
    fn log_event_populates_required_fields() {
        let (csv, jsonl) = temp_paths("fields");
        let mut logger = EventLogger::new(&csv, &jsonl, None);
        let mut meta = Map::new();
        meta.insert("power_db".to_string(), json!(-12.5));
        let event = logger.log_event(100.5e6, Some("hello"), meta);
        assert_eq!(event.freq, 100.5e6);
        assert_eq!(event.text, "hello");
        assert_eq!(event.extra.get("power_db"), Some(&json!(-12.5)));
        let _ = std::fs::remove_file(&csv);
        let _ = std::fs::remove_file(&jsonl);
    }

    #[test]
    fn log_event_with_no_text_uses_empty_string() {
        let (csv, jsonl) = temp_paths("notext");
        let mut logger = EventLogger::new(&csv, &jsonl, None);
        let event = logger.log_event(1.0e6, None, Map::new());
        assert_eq!(event.text, "");
        let _ = std::fs::remove_file(&csv);
        let _ = std::fs::remove_file(&jsonl);
    }

    #[test]
    fn recent_events_returns_at_most_n_in_insertion_order() {
        let (csv, jsonl) = temp_paths("ring");
        let mut logger = EventLogger::new(&csv, &jsonl, None);
        for i in 0..5 {
            logger.log_event(f64::from(i), None, Map::new());
        }
        let recent = logger.recent_events(3);
        assert_eq!(recent.len(), 3);
        assert!(recent[0].freq <= recent[1].freq);
        assert!(recent[1].freq <= recent[2].freq);
        let _ = std::fs::remove_file(&csv);
        let _ = std::fs::remove_file(&jsonl);
    }

    #[test]
    fn close_is_idempotent() {
        let (csv, jsonl) = temp_paths("close");
        let mut logger = EventLogger::new(&csv, &jsonl, None);
        logger.close();
        logger.close();
        let _ = std::fs::remove_file(&csv);
        let _ = std::fs::remove_file(&jsonl);
    }
}
