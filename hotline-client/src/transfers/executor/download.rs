//! Download state machine
//!
//! dial -> handshake -> create local file -> container header -> forks in
//! declared order. INFO is decoded and discarded, DATA is streamed to the
//! local file, MACR goes to the `._name` sidecar, anything else is skipped.

use std::path::Path;

use tokio::fs::File;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hotline_common::ffo::{
    ContainerHeader, ForkHeader, ForkType, InformationFork, read_fork_payload, skip_fork,
};
use hotline_common::sidecar::{sidecar_path, write_sidecar_header};

use super::connection::{BoxedStream, TransferTarget, open, send_handshake};
use super::file_utils::{create_download_file, is_safe_file_name};
use super::streaming::{CopyOptions, copy_with_progress};
use super::{LocalEnd, TransferExecutor, copy_failed};
use crate::constants::MAX_INFO_FORK_SIZE;
use crate::transfers::types::{TransferError, TransferReply};

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

    if !is_safe_file_name(&task.file_name) {
        return Err(TransferError::filesystem(
            "invalid file name",
            format!("refusing to create {:?}", task.file_name),
        ));
    }
    if let Some(file_size) = reply.file_size {
        executor.tasks.set_total(id, u64::from(file_size));
    }

    let settings = executor.settings();
    let mut stream = open(target, settings).await?;
    send_handshake(
        &mut stream,
        reply.reference,
        reply.transfer_size,
        settings.idle_timeout(),
    )
    .await?;

    let download_dir = settings.resolved_download_dir();
    tokio::fs::create_dir_all(&download_dir)
        .await
        .map_err(|e| TransferError::filesystem("create download directory failed", e))?;
    let (local_path, mut local_file) = create_download_file(&download_dir, &task.file_name)
        .await
        .map_err(|e| TransferError::filesystem("create file failed", e))?;
    executor.tasks.set_local_path(id, local_path.clone());
    debug!(task = %id, path = %local_path.display(), "download destination created");

    let header = ContainerHeader::read_from(&mut stream)
        .await
        .map_err(|e| TransferError::format("read container header failed", e))?;
    debug!(task = %id, version = header.version, forks = header.fork_count, "container header");

    let options = executor.copy_options();
    let mut data_done = false;

    for _ in 0..header.fork_count {
        let fork = match ForkHeader::read_from(&mut stream).await {
            Ok(fork) => fork,
            Err(e) if data_done => {
                warn!(task = %id, error = %e, "stream ended after data fork, ignoring remaining forks");
                break;
            }
            Err(e) => return Err(TransferError::format("read fork header failed", e)),
        };

        match fork.fork_type {
            ForkType::Info => read_info_fork(id, &mut stream, fork.data_size).await?,

            ForkType::Data if !data_done => {
                executor.tasks.set_total(id, u64::from(fork.data_size));
                let received = receive_data_fork(
                    executor,
                    id,
                    &mut stream,
                    &mut local_file,
                    fork.data_size,
                    options,
                )
                .await?;
                data_done = true;
                info!(task = %id, bytes = received, path = %local_path.display(), "data fork received");
                if received < u64::from(fork.data_size) {
                    // Stream ended early and short reads are tolerated
                    warn!(task = %id, expected = fork.data_size, received, "data fork ended early");
                    break;
                }
            }

            ForkType::Resource => {
                let keep_going =
                    receive_resource_fork(id, &mut stream, &local_path, fork.data_size, options, data_done)
                        .await?;
                if !keep_going {
                    break;
                }
            }

            other => {
                debug!(task = %id, fork = %other, size = fork.data_size, "skipping fork");
                if let Err(e) = skip_fork(&mut stream, fork.data_size).await {
                    if data_done {
                        warn!(task = %id, error = %e, "stream ended while skipping fork");
                        break;
                    }
                    return Err(TransferError::format("skip fork failed", e));
                }
            }
        }
    }

    if !data_done {
        return Err(TransferError::format(
            "missing data fork",
            format!("container declared {} forks without DATA", header.fork_count),
        ));
    }
    Ok(())
}

/// Decode the INFO fork for logging; its contents are not kept
async fn read_info_fork(
    id: Uuid,
    stream: &mut BoxedStream,
    size: u32,
) -> Result<(), TransferError> {
    if size as usize > MAX_INFO_FORK_SIZE {
        warn!(task = %id, size, "oversized info fork, skipping");
        return skip_fork(stream, size)
            .await
            .map_err(|e| TransferError::format("read info fork failed", e));
    }

    let payload = read_fork_payload(stream, size)
        .await
        .map_err(|e| TransferError::format("read info fork failed", e))?;
    match InformationFork::from_bytes(&payload) {
        Ok(info) => debug!(
            task = %id,
            name = %info.name,
            file_type = %String::from_utf8_lossy(&info.file_type.type_code),
            creator = %String::from_utf8_lossy(&info.file_type.creator_code),
            modified = ?info.modify_date.to_datetime(),
            "info fork"
        ),
        Err(e) => warn!(task = %id, error = %e, "undecodable info fork ignored"),
    }
    Ok(())
}

async fn receive_data_fork(
    executor: &TransferExecutor,
    id: Uuid,
    stream: &mut BoxedStream,
    file: &mut File,
    size: u32,
    options: CopyOptions,
) -> Result<u64, TransferError> {
    copy_with_progress(
        stream,
        file,
        u64::from(size),
        options,
        executor.progress_reporter(id),
    )
    .await
    .map_err(|e| copy_failed("data transfer failed", LocalEnd::Destination, e))
}

/// Write a resource fork to the sidecar next to `local_path`
///
/// Returns whether the fork walk can continue. Failures after the data fork
/// only cost the resource fork; before it they fail the download.
async fn receive_resource_fork(
    id: Uuid,
    stream: &mut BoxedStream,
    local_path: &Path,
    size: u32,
    options: CopyOptions,
    data_done: bool,
) -> Result<bool, TransferError> {
    let sidecar = match create_sidecar(local_path, size).await {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(task = %id, error = %e, "cannot create sidecar, discarding resource fork");
            None
        }
    };

    let Some(mut sidecar) = sidecar else {
        return match skip_fork(stream, size).await {
            Ok(()) => Ok(true),
            Err(e) if data_done => {
                warn!(task = %id, error = %e, "stream ended in resource fork");
                Ok(false)
            }
            Err(e) => Err(TransferError::format("read resource fork failed", e)),
        };
    };

    // Resource bytes are not part of the task's progress
    match copy_with_progress(stream, &mut sidecar, u64::from(size), options, |_| {}).await {
        Ok(received) => {
            info!(task = %id, bytes = received, "resource fork written to sidecar");
            Ok(received == u64::from(size))
        }
        Err(e) if data_done => {
            warn!(task = %id, error = %e, "resource fork transfer failed, keeping data fork");
            Ok(false)
        }
        Err(e) => Err(copy_failed(
            "resource fork transfer failed",
            LocalEnd::Destination,
            e,
        )),
    }
}

async fn create_sidecar(local_path: &Path, size: u32) -> std::io::Result<File> {
    let path = sidecar_path(local_path).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let mut file = File::create(&path).await?;
    write_sidecar_header(&mut file, size).await?;
    Ok(file)
}
