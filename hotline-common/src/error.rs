//! Errors produced while encoding or decoding transfer-port structures

use std::io;

use thiserror::Error;

/// Error type for malformed or undersized wire structures
#[derive(Debug, Error)]
pub enum FormatError {
    /// The stream ended before a fixed-size structure was complete
    #[error("truncated {what}: {source}")]
    Truncated {
        /// Which structure was being read (e.g. "container header")
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// An in-memory buffer was shorter than the structure it should hold
    #[error("{what} too short: need {needed} bytes, have {actual}")]
    TooShort {
        what: &'static str,
        needed: usize,
        actual: usize,
    },

    /// A length does not fit the field that carries it on the wire
    #[error("{what} too large for the wire format: {size}")]
    TooLarge { what: &'static str, size: u64 },

    /// The sidecar did not start with the AppleDouble magic
    #[error("bad sidecar magic: {0:02X?}")]
    BadSidecarMagic([u8; 4]),

    /// The sidecar has no resource fork entry
    #[error("sidecar has no resource fork entry")]
    MissingResourceEntry,

    /// Underlying I/O failure while writing
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FormatError {
    /// Map a read error to `Truncated` when the stream simply ran out
    pub(crate) fn from_read(what: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated { what, source }
        } else {
            Self::Io(source)
        }
    }
}
