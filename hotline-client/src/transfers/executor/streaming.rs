//! Fork streaming with throttled progress
//!
//! Copies a declared number of bytes from the transfer connection to a file
//! (or the other way round), reporting the running total at most every
//! 100ms and once more at the end.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::constants::BUFFER_SIZE;

/// Minimum interval between progress updates (100ms = 10 updates/second)
const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Error type for streaming operations
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("no progress for {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("stream ended after {received} of {expected} bytes")]
    ShortRead { expected: u64, received: u64 },
}

/// How a copy treats stalls and early end of stream
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Fail when a single read or write makes no progress for this long
    pub idle_timeout: Option<Duration>,
    /// Treat end of stream before `total` as a successful (shorter) fork
    pub tolerate_short_reads: bool,
}

/// Copy exactly `total` bytes from `src` to `dst`
///
/// `on_progress` receives the cumulative byte count. Returns the number of
/// bytes copied, which is `total` unless short reads are tolerated.
pub async fn copy_with_progress<R, W, F>(
    src: &mut R,
    dst: &mut W,
    total: u64,
    options: CopyOptions,
    mut on_progress: F,
) -> Result<u64, CopyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written: u64 = 0;
    let mut last_progress_time = Instant::now();

    while written < total {
        let to_read = ((total - written) as usize).min(buffer.len());

        let bytes_read = idle(options.idle_timeout, src.read(&mut buffer[..to_read]))
            .await?
            .map_err(CopyError::Read)?;

        if bytes_read == 0 {
            if options.tolerate_short_reads {
                break;
            }
            return Err(CopyError::ShortRead {
                expected: total,
                received: written,
            });
        }

        idle(options.idle_timeout, dst.write_all(&buffer[..bytes_read]))
            .await?
            .map_err(CopyError::Write)?;

        written += bytes_read as u64;

        if last_progress_time.elapsed() >= PROGRESS_UPDATE_INTERVAL {
            on_progress(written);
            last_progress_time = Instant::now();
        }
    }

    idle(options.idle_timeout, dst.flush())
        .await?
        .map_err(CopyError::Write)?;

    // Final progress update (always sent so the total is reported)
    on_progress(written);

    Ok(written)
}

async fn idle<T, F>(limit: Option<Duration>, operation: F) -> Result<io::Result<T>, CopyError>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => timeout(limit, operation)
            .await
            .map_err(|_| CopyError::Timeout(limit)),
        None => Ok(operation.await),
    }
}
