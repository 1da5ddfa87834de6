//! Transfer executor - runs each file transfer on its own tokio task
//!
//! A transfer is queued (a Pending task is registered) before the control
//! request goes out, and started when the control session's reply arrives.
//! The worker dials the transfer port, streams the file, and reports progress
//! and the final status through an unbounded channel.
//!
//! ## Module Structure
//!
//! - `connection` - transfer port dialing, TLS and the HTXF handshake
//! - `streaming` - fork copying with throttled progress
//! - `file_utils` - download path resolution, name checks, sidecar lookup
//! - `download` / `upload` - the two transfer state machines

mod connection;
mod download;
mod file_utils;
mod streaming;
mod upload;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::manager::TaskManager;
use super::types::{ErrorKind, Task, TaskStatus, TransferDirection, TransferError, TransferReply};
use crate::config::TransferSettings;
use crate::network::ControlSession;

pub use connection::{BoxedStream, TransferStream, TransferTarget, open, send_handshake};
pub use file_utils::{create_download_file, is_safe_file_name, numbered_path};
pub use streaming::{CopyError, CopyOptions, copy_with_progress};
pub use upload::container_size;

// =============================================================================
// Progress Events
// =============================================================================

/// Event sent from a transfer worker to whoever renders transfers
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// Cumulative data fork bytes, non-decreasing per task
    Progress { id: Uuid, transferred_bytes: u64 },

    /// Status change; Completed and Failed are sent exactly once per task
    Status {
        id: Uuid,
        status: TaskStatus,
        error: Option<String>,
    },
}

// =============================================================================
// Executor
// =============================================================================

/// Starts transfer workers and keeps the task registry up to date
#[derive(Clone)]
pub struct TransferExecutor {
    tasks: Arc<TaskManager>,
    settings: Arc<TransferSettings>,
    events: mpsc::UnboundedSender<TransferEvent>,
}

impl TransferExecutor {
    pub fn new(
        tasks: Arc<TaskManager>,
        settings: TransferSettings,
        events: mpsc::UnboundedSender<TransferEvent>,
    ) -> Self {
        Self {
            tasks,
            settings: Arc::new(settings),
            events,
        }
    }

    pub fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Register a pending download of `file_name` from the remote folder `file_path`
    pub fn queue_download(&self, file_name: &str, file_path: Vec<String>) -> Uuid {
        let id = self.tasks.add(Task::download(file_name, file_path));
        info!(task = %id, file = file_name, "download queued");
        id
    }

    /// Register a pending upload of a local file into the remote folder `file_path`
    ///
    /// Fails without registering anything when `local_path` is missing or is
    /// not a regular file.
    pub async fn queue_upload(
        &self,
        local_path: &Path,
        file_path: Vec<String>,
    ) -> Result<Uuid, TransferError> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| TransferError::filesystem("upload unavailable", e))?;
        if !metadata.is_file() {
            return Err(TransferError::filesystem(
                "upload unavailable",
                format!("{} is not a regular file", local_path.display()),
            ));
        }

        let task = Task::upload(local_path.to_path_buf(), file_path, metadata.len());
        let id = self.tasks.add(task);
        info!(task = %id, path = %local_path.display(), size = metadata.len(), "upload queued");
        Ok(id)
    }

    /// Spawn the worker for a queued download once the control reply is in
    pub fn start_download<S>(&self, id: Uuid, session: &S, reply: TransferReply) -> JoinHandle<()>
    where
        S: ControlSession + ?Sized,
    {
        self.start(id, TransferDirection::Download, session, reply)
    }

    /// Spawn the worker for a queued upload once the control reply is in
    pub fn start_upload<S>(&self, id: Uuid, session: &S, reply: TransferReply) -> JoinHandle<()>
    where
        S: ControlSession + ?Sized,
    {
        self.start(id, TransferDirection::Upload, session, reply)
    }

    fn start<S>(
        &self,
        id: Uuid,
        direction: TransferDirection,
        session: &S,
        reply: TransferReply,
    ) -> JoinHandle<()>
    where
        S: ControlSession + ?Sized,
    {
        let target = TransferTarget::from_session(session);
        let executor = self.clone();
        tokio::spawn(async move { executor.run(id, direction, target, reply).await })
    }

    async fn run(
        self,
        id: Uuid,
        direction: TransferDirection,
        target: Result<TransferTarget, TransferError>,
        reply: TransferReply,
    ) {
        if !self.tasks.activate(id) {
            warn!(task = %id, "task is not pending, worker not started");
            return;
        }
        self.send_status(id, TaskStatus::Active, None);
        info!(task = %id, %direction, reference = %reply.reference, size = reply.transfer_size, "transfer started");

        let result = match target {
            Ok(target) => match direction {
                TransferDirection::Download => download::run(&self, id, &target, reply).await,
                TransferDirection::Upload => upload::run(&self, id, &target, reply).await,
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                if self.tasks.complete(id) {
                    info!(task = %id, %direction, "transfer completed");
                    self.send_status(id, TaskStatus::Completed, None);
                }
            }
            Err(e) => {
                error!(task = %id, %direction, kind = e.kind().as_str(), error = %e, "transfer failed");
                if self.tasks.fail(id, &e) {
                    self.send_status(id, TaskStatus::Failed, Some(e.to_string()));
                }
            }
        }
    }

    fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            idle_timeout: self.settings.idle_timeout(),
            tolerate_short_reads: self.settings.tolerate_short_reads,
        }
    }

    /// Progress callback for one task: updates the registry and emits an event
    fn progress_reporter(&self, id: Uuid) -> impl FnMut(u64) + '_ {
        move |transferred_bytes| {
            self.tasks.record_progress(id, transferred_bytes);
            let _ = self.events.send(TransferEvent::Progress {
                id,
                transferred_bytes,
            });
        }
    }

    fn send_status(&self, id: Uuid, status: TaskStatus, error: Option<String>) {
        // Receiver gone just means nobody is watching
        let _ = self.events.send(TransferEvent::Status { id, status, error });
    }
}

/// Which end of a copy is the local file
#[derive(Debug, Clone, Copy)]
enum LocalEnd {
    Source,
    Destination,
}

/// Classify a failed copy: local file trouble is a filesystem error, the rest is the network
fn copy_failed(stage: &'static str, local: LocalEnd, error: CopyError) -> TransferError {
    let kind = match (&error, local) {
        (CopyError::Read(_), LocalEnd::Source) | (CopyError::Write(_), LocalEnd::Destination) => {
            ErrorKind::Filesystem
        }
        _ => ErrorKind::Transfer,
    };
    TransferError::new(kind, stage, error)
}
