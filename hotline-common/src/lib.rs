//! Hotline Common Library
//!
//! Wire formats spoken on the Hotline file transfer port: the HTXF handshake
//! preamble, the flattened file object (FFO) container with its forks, and the
//! AppleDouble sidecar used to keep a resource fork on filesystems without
//! native fork support.

mod error;
pub mod ffo;
pub mod file_type;
pub mod handshake;
pub mod sidecar;
pub mod time;

pub use error::FormatError;

/// Default port for Hotline control connections
pub const DEFAULT_PORT: u16 = 5500;

/// Offset from the control port to the file transfer port
pub const TRANSFER_PORT_OFFSET: u16 = 1;
