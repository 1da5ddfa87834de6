//! Transfer task model
//!
//! A [`Task`] records one download or upload attempt from the moment it is
//! queued until it completes or fails. Tasks are never removed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use hotline_common::handshake::ReferenceNumber;

// =============================================================================
// Transfer Direction
// =============================================================================

/// Direction of the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Server to local disk
    Download,
    /// Local disk to server
    Upload,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Upload => write!(f, "upload"),
        }
    }
}

// =============================================================================
// Task Status
// =============================================================================

/// Lifecycle state of a task
///
/// Moves only forward: `Pending -> Active -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued, waiting for the control reply
    Pending,
    /// Worker running
    Active,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Returns true for Pending and Active
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Active)
    }

    /// Returns true for Completed and Failed
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Category of a transfer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Dial, TLS or transfer port derivation failed
    Connection,
    /// Malformed or undersized container data
    Format,
    /// Handshake write failure or size mismatch
    Protocol,
    /// I/O failure while streaming a fork
    Transfer,
    /// Local path resolution, directory or file creation
    Filesystem,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Format => "format",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Transfer => "transfer",
            ErrorKind::Filesystem => "filesystem",
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failed transfer: what stage broke, what kind of failure, and why
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct TransferError {
    stage: &'static str,
    kind: ErrorKind,
    #[source]
    source: BoxError,
}

impl TransferError {
    pub fn new(kind: ErrorKind, stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            stage,
            kind,
            source: source.into(),
        }
    }

    pub fn connection(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Connection, stage, source)
    }

    pub fn format(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Format, stage, source)
    }

    pub fn protocol(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Protocol, stage, source)
    }

    pub fn transfer(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Transfer, stage, source)
    }

    pub fn filesystem(stage: &'static str, source: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Filesystem, stage, source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }
}

// =============================================================================
// Control Reply
// =============================================================================

/// What the control session hands back for an accepted transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReply {
    /// Opaque number authorizing one transfer port session
    pub reference: ReferenceNumber,
    /// Declared size of the whole transfer
    pub transfer_size: u32,
    /// File size reported by the server (downloads only)
    pub file_size: Option<u32>,
}

impl TransferReply {
    pub fn new(reference: ReferenceNumber, transfer_size: u32) -> Self {
        Self {
            reference,
            transfer_size,
            file_size: None,
        }
    }
}

// =============================================================================
// Task
// =============================================================================

/// One transfer attempt
#[derive(Debug, Clone)]
pub struct Task {
    pub id: Uuid,
    pub direction: TransferDirection,
    /// Name of the file on the server
    pub file_name: String,
    /// Remote folder, outermost first
    pub file_path: Vec<String>,
    pub status: TaskStatus,
    /// Data fork size (0 until known)
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Bytes per second measured between the last two progress updates
    pub speed: f64,
    pub last_bytes: u64,
    pub last_update: Instant,
    /// Failure message, present iff status is Failed
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Destination file for downloads, source file for uploads
    pub local_path: Option<PathBuf>,
}

impl Task {
    fn new(direction: TransferDirection, file_name: String, file_path: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            file_name,
            file_path,
            status: TaskStatus::Pending,
            total_bytes: 0,
            transferred_bytes: 0,
            start_time: Utc::now(),
            end_time: None,
            speed: 0.0,
            last_bytes: 0,
            last_update: Instant::now(),
            error: None,
            error_kind: None,
            local_path: None,
        }
    }

    /// Create a pending download of `file_name` from the remote folder `file_path`
    pub fn download(file_name: impl Into<String>, file_path: Vec<String>) -> Self {
        Self::new(TransferDirection::Download, file_name.into(), file_path)
    }

    /// Create a pending upload of `local_path` into the remote folder `file_path`
    pub fn upload(local_path: PathBuf, file_path: Vec<String>, size: u64) -> Self {
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut task = Self::new(TransferDirection::Upload, file_name, file_path);
        task.total_bytes = size;
        task.local_path = Some(local_path);
        task
    }

    /// Remote path joined with '/' (e.g. "Games/Emulators/app.sit")
    pub fn remote_display_path(&self) -> String {
        let mut parts: Vec<&str> = self.file_path.iter().map(String::as_str).collect();
        parts.push(&self.file_name);
        parts.join("/")
    }

    /// Pending -> Active
    pub fn activate(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Active;
        self.last_update = Instant::now();
        true
    }

    /// Active -> Completed
    pub fn complete(&mut self) -> bool {
        if self.status != TaskStatus::Active {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.end_time = Some(Utc::now());
        self.speed = 0.0;
        true
    }

    /// Active -> Failed, attaching the error
    pub fn fail(&mut self, error: &TransferError) -> bool {
        if self.status != TaskStatus::Active {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        self.end_time = Some(Utc::now());
        self.speed = 0.0;
        true
    }

    /// Record a cumulative byte count observed now
    pub fn record_progress(&mut self, transferred: u64) {
        self.record_progress_at(transferred, Instant::now());
    }

    /// Record a cumulative byte count observed at `now`
    ///
    /// Counts never move backwards and are capped at `total_bytes` once known.
    pub fn record_progress_at(&mut self, transferred: u64, now: Instant) {
        let mut transferred = transferred.max(self.transferred_bytes);
        if self.total_bytes > 0 {
            transferred = transferred.min(self.total_bytes);
        }

        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        if elapsed > 0.0 {
            self.speed = transferred.saturating_sub(self.last_bytes) as f64 / elapsed;
        }

        self.transferred_bytes = transferred;
        self.last_bytes = transferred;
        self.last_update = now;
    }

    /// Progress as a percentage (0.0 to 100.0)
    pub fn progress_percent(&self) -> f32 {
        if self.total_bytes == 0 {
            if self.status == TaskStatus::Completed {
                100.0
            } else {
                0.0
            }
        } else {
            (self.transferred_bytes as f64 / self.total_bytes as f64 * 100.0) as f32
        }
    }

    /// Estimated time remaining at the current speed
    pub fn eta(&self) -> Option<Duration> {
        if self.status != TaskStatus::Active || self.speed <= 0.0 {
            return None;
        }
        let remaining = self.total_bytes.saturating_sub(self.transferred_bytes);
        Some(Duration::from_secs_f64(remaining as f64 / self.speed))
    }

    /// Time from creation to finish (or to now while running)
    pub fn elapsed(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }
}

// =============================================================================
// Formatting
// =============================================================================

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Human-readable size: "512 B", "1.5 KB", "2.0 MB"
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Human-readable rate: "512 B/s", "1.5 KB/s"
pub fn format_speed(bytes_per_second: f64) -> String {
    let bytes = if bytes_per_second.is_finite() && bytes_per_second > 0.0 {
        bytes_per_second as u64
    } else {
        0
    };
    format!("{}/s", format_bytes(bytes))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn active_download(total: u64) -> Task {
        let mut task = Task::download("app.sit", vec!["Games".to_string()]);
        task.total_bytes = total;
        assert!(task.activate());
        task
    }

    #[test]
    fn test_task_download_defaults() {
        let task = Task::download("app.sit", vec!["Games".into(), "Emulators".into()]);
        assert_eq!(task.direction, TransferDirection::Download);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.total_bytes, 0);
        assert!(task.error.is_none());
        assert!(task.local_path.is_none());
        assert_eq!(task.remote_display_path(), "Games/Emulators/app.sit");
    }

    #[test]
    fn test_task_upload_takes_file_name() {
        let task = Task::upload(PathBuf::from("/tmp/notes.txt"), vec![], 5000);
        assert_eq!(task.direction, TransferDirection::Upload);
        assert_eq!(task.file_name, "notes.txt");
        assert_eq!(task.total_bytes, 5000);
        assert_eq!(task.local_path, Some(PathBuf::from("/tmp/notes.txt")));
    }

    #[test]
    fn test_status_only_moves_forward() {
        let mut task = Task::download("a.txt", vec![]);

        // Cannot finish before starting
        assert!(!task.complete());
        assert_eq!(task.status, TaskStatus::Pending);

        assert!(task.activate());
        assert!(!task.activate());
        assert!(task.complete());
        assert!(task.end_time.is_some());

        // No way back out of a terminal state
        assert!(!task.activate());
        let error = TransferError::transfer("data transfer failed", "reset");
        assert!(!task.fail(&error));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_fail_attaches_error() {
        let mut task = active_download(100);
        let error = TransferError::protocol("handshake failed", "broken pipe");
        assert!(task.fail(&error));

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("handshake failed: broken pipe"));
        assert_eq!(task.error_kind, Some(ErrorKind::Protocol));
        assert!(!task.complete());
    }

    #[test]
    fn test_status_helpers() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Active.is_active());
        assert!(!TaskStatus::Completed.is_active());
        assert!(TaskStatus::Completed.is_finished());
        assert!(TaskStatus::Failed.is_finished());
        assert!(!TaskStatus::Pending.is_finished());
    }

    #[test]
    fn test_speed_from_delta() {
        let mut task = active_download(10_000);
        let start = task.last_update;

        task.record_progress_at(1000, start + Duration::from_secs(1));
        assert!((task.speed - 1000.0).abs() < 0.01);

        task.record_progress_at(4000, start + Duration::from_secs(2));
        assert!((task.speed - 3000.0).abs() < 0.01);
        assert_eq!(task.transferred_bytes, 4000);
        assert_eq!(task.last_bytes, 4000);
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut task = active_download(1000);
        let start = task.last_update;

        task.record_progress_at(600, start + Duration::from_millis(100));
        task.record_progress_at(200, start + Duration::from_millis(200));
        assert_eq!(task.transferred_bytes, 600);

        task.record_progress_at(5000, start + Duration::from_millis(300));
        assert_eq!(task.transferred_bytes, 1000);
    }

    #[test]
    fn test_eta() {
        let mut task = active_download(10_000);
        let start = task.last_update;
        task.record_progress_at(2000, start + Duration::from_secs(2));

        // 8000 bytes left at 1000 B/s
        let eta = task.eta().unwrap();
        assert_eq!(eta.as_secs(), 8);

        task.complete();
        assert!(task.eta().is_none());
    }

    #[test]
    fn test_progress_percent() {
        let mut task = Task::download("a.txt", vec![]);
        assert_eq!(task.progress_percent(), 0.0);

        task.activate();
        task.complete();
        assert_eq!(task.progress_percent(), 100.0);

        let mut task = active_download(1000);
        task.record_progress(250);
        assert!((task.progress_percent() - 25.0).abs() < 0.01);
    }

    #[test]
    fn test_elapsed_uses_end_time() {
        let mut task = active_download(0);
        task.complete();
        task.start_time = task.end_time.unwrap() - chrono::Duration::seconds(10);
        assert_eq!(task.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_error_display_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = TransferError::connection("connection failed", io);
        assert_eq!(error.to_string(), "connection failed: refused");
        assert_eq!(error.kind(), ErrorKind::Connection);
        assert_eq!(error.stage(), "connection failed");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::Filesystem).unwrap();
        assert_eq!(json, r#""filesystem""#);
        assert_eq!(ErrorKind::Connection.as_str(), "connection");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(512.0), "512 B/s");
        assert_eq!(format_speed(1536.0), "1.5 KB/s");
        assert_eq!(format_speed(2.0 * 1024.0 * 1024.0), "2.0 MB/s");
        assert_eq!(format_speed(f64::NAN), "0 B/s");
    }
}
