//! Upload state machine
//!
//! stat local file -> look for a sidecar -> compute container size -> dial ->
//! handshake -> container header, INFO, DATA -> optional MACR.

use std::time::SystemTime;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use hotline_common::ffo::{
    CONTAINER_HEADER_SIZE, ContainerHeader, FORK_HEADER_SIZE, ForkHeader, ForkType,
    encode_info_fork, wire_size,
};

use super::connection::{TransferTarget, open, send_handshake};
use super::file_utils::open_resource_fork;
use super::streaming::{CopyOptions, copy_with_progress};
use super::{LocalEnd, TransferExecutor, copy_failed};
use crate::transfers::types::{TransferError, TransferReply};

/// Bytes on the wire for a container with the given forks
///
/// `info_fork_len` includes the INFO fork header.
pub fn container_size(info_fork_len: usize, data_size: u32, resource_size: Option<u32>) -> u64 {
    let mut total = (CONTAINER_HEADER_SIZE + info_fork_len + FORK_HEADER_SIZE) as u64;
    total += u64::from(data_size);
    if let Some(resource_size) = resource_size {
        total += FORK_HEADER_SIZE as u64 + u64::from(resource_size);
    }
    total
}

pub(super) async fn run(
    executor: &TransferExecutor,
    id: Uuid,
    target: &TransferTarget,
    reply: TransferReply,
) -> Result<(), TransferError> {
    let task = executor
        .tasks
        .get(id)
        .ok_or_else(|| TransferError::filesystem("task lookup failed", format!("no task {id}")))?;
    let local_path = task.local_path.clone().ok_or_else(|| {
        TransferError::filesystem("read local file failed", "task has no local path")
    })?;

    let metadata = tokio::fs::metadata(&local_path)
        .await
        .map_err(|e| TransferError::filesystem("read local file failed", e))?;
    if !metadata.is_file() {
        return Err(TransferError::filesystem(
            "read local file failed",
            format!("{} is not a regular file", local_path.display()),
        ));
    }
    let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());

    let data_size = wire_size("data fork", metadata.len())
        .map_err(|e| TransferError::protocol("file too large", e))?;
    let info_fork = encode_info_fork(&task.file_name, modified, None)
        .map_err(|e| TransferError::format("encode info fork failed", e))?;
    let resource = open_resource_fork(&local_path)
        .await
        .map_err(|e| TransferError::filesystem("read resource fork failed", e))?;
    if let Some(resource) = &resource {
        debug!(task = %id, sidecar = %resource.path.display(), size = resource.length, "found resource fork");
    }

    let total = container_size(info_fork.len(), data_size, resource.as_ref().map(|r| r.length));
    let total = wire_size("transfer", total).map_err(|e| TransferError::protocol("file too large", e))?;
    if reply.transfer_size != 0 && reply.transfer_size != total {
        debug!(task = %id, declared = reply.transfer_size, computed = total, "control reply size differs");
    }
    executor.tasks.set_total(id, u64::from(data_size));

    let settings = executor.settings();
    let mut stream = open(target, settings).await?;
    send_handshake(&mut stream, reply.reference, total, settings.idle_timeout()).await?;

    let fork_count = if resource.is_some() { 3 } else { 2 };
    ContainerHeader::new(fork_count)
        .write_to(&mut stream)
        .await
        .map_err(|e| TransferError::transfer("send container header failed", e))?;
    stream
        .write_all(&info_fork)
        .await
        .map_err(|e| TransferError::transfer("send info fork failed", e))?;
    ForkHeader::new(ForkType::Data, data_size)
        .write_to(&mut stream)
        .await
        .map_err(|e| TransferError::transfer("send data fork failed", e))?;

    // The local file must deliver exactly what was declared
    let options = CopyOptions {
        tolerate_short_reads: false,
        ..executor.copy_options()
    };

    let mut file = File::open(&local_path)
        .await
        .map_err(|e| TransferError::filesystem("open local file failed", e))?;
    let sent = copy_with_progress(
        &mut file,
        &mut stream,
        u64::from(data_size),
        options,
        executor.progress_reporter(id),
    )
    .await
    .map_err(|e| copy_failed("data transfer failed", LocalEnd::Source, e))?;
    info!(task = %id, bytes = sent, "data fork sent");

    if let Some(mut resource) = resource {
        ForkHeader::new(ForkType::Resource, resource.length)
            .write_to(&mut stream)
            .await
            .map_err(|e| TransferError::transfer("send resource fork failed", e))?;
        let sent = copy_with_progress(
            &mut resource.file,
            &mut stream,
            u64::from(resource.length),
            options,
            |_| {},
        )
        .await
        .map_err(|e| copy_failed("resource fork transfer failed", LocalEnd::Source, e))?;
        info!(task = %id, bytes = sent, "resource fork sent");
    }

    if let Err(e) = stream.shutdown().await {
        debug!(task = %id, error = %e, "transfer connection shutdown failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_size_without_resource() {
        assert_eq!(container_size(100, 5000, None), 24 + 100 + 16 + 5000);
    }

    #[test]
    fn test_container_size_with_resource() {
        assert_eq!(
            container_size(100, 5000, Some(300)),
            24 + 100 + 16 + 5000 + 16 + 300
        );
    }

    #[test]
    fn test_container_size_exceeds_wire_limit() {
        let total = container_size(100, u32::MAX, None);
        assert!(total > u64::from(u32::MAX));
        assert!(wire_size("transfer", total).is_err());
    }
}
