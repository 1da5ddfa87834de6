//! File transfer management
//!
//! Transfers run on the transfer port (control port + 1), one tokio task per
//! file, tracked in a shared registry.
//!
//! Key types:
//! - `Task` - one download or upload attempt and its progress
//! - `TaskManager` - thread-safe registry of all tasks
//! - `TransferExecutor` - queues tasks and spawns their workers
//! - `TransferEvent` - progress and status events from the workers

mod executor;
mod manager;
mod types;

pub use executor::{
    BoxedStream, CopyError, CopyOptions, TransferEvent, TransferExecutor, TransferStream,
    TransferTarget, container_size, copy_with_progress, create_download_file, is_safe_file_name,
    numbered_path, open, send_handshake,
};
pub use manager::TaskManager;
pub use types::{
    ErrorKind, Task, TaskStatus, TransferDirection, TransferError, TransferReply, format_bytes,
    format_speed,
};
