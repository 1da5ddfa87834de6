//! Application-wide constants
//!
//! Shared constants used across multiple modules.

/// Directory created under the platform download directory
pub const DOWNLOAD_DIR_NAME: &str = "Hotline";

/// Default timeout for dialing the transfer port (seconds)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default time a read or write may make no progress (seconds, 0 disables)
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Buffer size for streaming fork payloads (32KB)
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Maximum number of " (N)" suffixes tried when resolving a download path
pub const MAX_UNIQUE_PATH_ATTEMPTS: u32 = 1000;

/// Largest INFO fork decoded in memory; bigger ones are skipped
pub const MAX_INFO_FORK_SIZE: usize = 256 * 1024;
