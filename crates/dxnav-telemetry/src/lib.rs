//! Opt-in, local-only journal of operation outcomes.
//!
//! Nothing leaves the machine: events are appended as JSON lines under the
//! configured directory by a background writer thread, so callers on the
//! async side never block on file I/O.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

const EVENT_QUEUE_CAPACITY: usize = 256;
const MAX_JOURNAL_BYTES: u64 = 1024 * 1024;
const JOURNAL_FILE: &str = "operations.jsonl";
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct TelemetryOptions {
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub enabled: bool,
    pub dir: PathBuf,
}

pub struct Telemetry {
    app_name: String,
    app_version: String,
    session_id: String,
    enabled: AtomicBool,
    sender: SyncSender<Message>,
}

enum Message {
    Entry(JournalEntry),
    Flush(SyncSender<()>),
}

#[derive(Serialize)]
struct JournalEntry {
    event_type: String,
    at_unix_millis: i64,
    app: String,
    version: String,
    session_id: String,
    properties: BTreeMap<String, String>,
}

/// Outcome of a long-running operation as recorded in the journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Partial,
    Cancelled,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succeeded => "succeeded",
            Outcome::Partial => "partial",
            Outcome::Cancelled => "cancelled",
            Outcome::Failed => "failed",
        }
    }
}

static TELEMETRY: OnceLock<Arc<Telemetry>> = OnceLock::new();

pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(existing) = TELEMETRY.get() {
        existing.enabled.store(options.enabled, Ordering::Relaxed);
        return Arc::clone(existing);
    }

    let (sender, receiver) = sync_channel(EVENT_QUEUE_CAPACITY);
    let telemetry = Arc::new(Telemetry {
        app_name: options.app_name.to_string(),
        app_version: options.app_version.to_string(),
        session_id: new_session_id(),
        enabled: AtomicBool::new(options.enabled),
        sender,
    });

    start_writer_thread(options.dir.join(options.app_name), receiver);

    let _ = TELEMETRY.set(Arc::clone(&telemetry));
    telemetry
}

pub fn init_with_env(app_name: &'static str, app_version: &'static str, dir: PathBuf) -> Arc<Telemetry> {
    init(TelemetryOptions {
        app_name,
        app_version,
        enabled: env_flag("DXNAV_TELEMETRY"),
        dir,
    })
}

/// Waits until every event recorded so far is on disk, or `timeout` passes.
/// Returns whether the writer caught up.
pub fn flush(timeout: Duration) -> bool {
    match TELEMETRY.get() {
        Some(telemetry) => flush_queue(&telemetry.sender, timeout),
        None => true,
    }
}

/// Flushes the journal when dropped. Binaries hold one for the life of
/// `main`.
#[must_use = "the journal is flushed when the guard is dropped"]
pub struct FlushGuard {
    timeout: Duration,
}

impl FlushGuard {
    pub fn new() -> Self {
        Self {
            timeout: FLUSH_TIMEOUT,
        }
    }
}

impl Default for FlushGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if !flush(self.timeout) {
            eprintln!("telemetry: journal not flushed within {:?}", self.timeout);
        }
    }
}

fn flush_queue(sender: &SyncSender<Message>, timeout: Duration) -> bool {
    let (ack_tx, ack_rx) = sync_channel(1);
    if sender.send(Message::Flush(ack_tx)).is_err() {
        return false;
    }
    ack_rx.recv_timeout(timeout).is_ok()
}

pub fn event(event_type: &str, properties: &[(&str, &str)]) {
    if let Some(telemetry) = TELEMETRY.get() {
        telemetry.record(event_type, properties);
    }
}

/// Records the end of an operation with its outcome and wall-clock duration.
pub fn operation(name: &str, outcome: Outcome, duration_ms: u128, properties: &[(&str, &str)]) {
    let duration = duration_ms.to_string();
    let mut props: Vec<(&str, &str)> = vec![
        ("outcome", outcome.as_str()),
        ("duration_ms", duration.as_str()),
    ];
    props.extend_from_slice(properties);
    event(&format!("{name}.finished"), &props);
}

impl Telemetry {
    fn record(&self, event_type: &str, properties: &[(&str, &str)]) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let entry = JournalEntry {
            event_type: event_type.to_string(),
            at_unix_millis: now_millis(),
            app: self.app_name.clone(),
            version: self.app_version.clone(),
            session_id: self.session_id.clone(),
            properties: collect_properties(properties),
        };
        let _ = self.sender.try_send(Message::Entry(entry));
    }
}

fn collect_properties(properties: &[(&str, &str)]) -> BTreeMap<String, String> {
    properties
        .iter()
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect()
}

fn start_writer_thread(dir: PathBuf, receiver: Receiver<Message>) {
    std::thread::spawn(move || {
        while let Ok(message) = receiver.recv() {
            match message {
                Message::Entry(entry) => append_entry(&dir, &entry),
                Message::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    });
}

fn append_entry(dir: &Path, entry: &JournalEntry) {
    if let Err(err) = fs::create_dir_all(dir) {
        eprintln!("telemetry: failed to create {}: {err}", dir.display());
        return;
    }

    let path = dir.join(JOURNAL_FILE);
    if rotate_if_needed(&path, MAX_JOURNAL_BYTES).is_err() {
        return;
    }

    let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("telemetry: failed to open {}: {err}", path.display());
            return;
        }
    };
    if let Ok(line) = serde_json::to_string(entry) {
        let _ = writeln!(file, "{line}");
    }
}

fn rotate_if_needed(path: &Path, max_bytes: u64) -> std::io::Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() >= max_bytes {
            let rotated = path.with_extension("jsonl.1");
            let _ = fs::remove_file(&rotated);
            fs::rename(path, rotated)?;
        }
    }
    Ok(())
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn new_session_id() -> String {
    format!("{:x}-{:x}", now_millis(), std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(event_type: &str) -> JournalEntry {
        JournalEntry {
            event_type: event_type.to_string(),
            at_unix_millis: 1,
            app: "dxnav".into(),
            version: "0.1.0".into(),
            session_id: "s".into(),
            properties: collect_properties(&[("outcome", "succeeded"), (" ", "dropped")]),
        }
    }

    #[test]
    fn blank_property_keys_are_dropped() {
        let props = collect_properties(&[("a", "1"), ("", "2"), ("  ", "3")]);
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("a").map(String::as_str), Some("1"));
    }

    #[test]
    fn entries_are_appended_as_json_lines() {
        let dir = TempDir::new().unwrap();
        append_entry(dir.path(), &entry("upload.finished"));
        append_entry(dir.path(), &entry("delete.finished"));

        let data = fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_type"], "upload.finished");
        assert_eq!(first["properties"]["outcome"], "succeeded");
    }

    #[test]
    fn flush_waits_for_queued_entries() {
        let dir = TempDir::new().unwrap();
        let (sender, receiver) = sync_channel(EVENT_QUEUE_CAPACITY);
        start_writer_thread(dir.path().to_path_buf(), receiver);
        for name in ["cli.start", "upload.finished"] {
            sender.try_send(Message::Entry(entry(name))).unwrap();
        }

        assert!(flush_queue(&sender, Duration::from_secs(5)));

        let data = fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();
        assert_eq!(data.lines().count(), 2);
        assert!(data.lines().last().unwrap().contains("upload.finished"));
    }

    #[test]
    fn flush_without_a_writer_reports_failure() {
        let (sender, receiver) = sync_channel::<Message>(1);
        drop(receiver);
        assert!(!flush_queue(&sender, Duration::from_millis(10)));
    }

    #[test]
    fn oversized_journal_is_rotated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(JOURNAL_FILE);
        fs::write(&path, vec![b'x'; 64]).unwrap();

        rotate_if_needed(&path, 32).unwrap();

        assert!(!path.exists());
        assert!(path.with_extension("jsonl.1").exists());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(Outcome::Partial.as_str(), "partial");
        assert_eq!(Outcome::Cancelled.as_str(), "cancelled");
    }
}
