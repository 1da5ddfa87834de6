//! HTXF handshake preamble
//!
//! Every transfer-port session starts with a fixed 16-byte preamble from the
//! client:
//!
//! ```text
//! [0:4]   "HTXF"
//! [4:8]   reference number (opaque, issued by the control connection)
//! [8:12]  total transfer size, big-endian u32
//! [12:16] reserved, zero
//! ```

use std::fmt;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::FormatError;

/// Magic tag opening a transfer-port session
pub const HANDSHAKE_MAGIC: &[u8; 4] = b"HTXF";

/// Size of the handshake preamble in bytes
pub const HANDSHAKE_SIZE: usize = 16;

/// Opaque correlation ID authorizing one transfer-port session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReferenceNumber(pub [u8; 4]);

impl ReferenceNumber {
    /// Build a reference number from its integer form
    pub fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// Integer form, as shown in logs and accepted on the command line
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for ReferenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.as_u32())
    }
}

impl From<[u8; 4]> for ReferenceNumber {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

/// The preamble identifying a transfer session and its declared size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub reference: ReferenceNumber,
    pub total_size: u32,
}

impl Handshake {
    pub fn new(reference: ReferenceNumber, total_size: u32) -> Self {
        Self {
            reference,
            total_size,
        }
    }

    /// Serialize the preamble
    pub fn to_bytes(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut bytes = [0u8; HANDSHAKE_SIZE];
        bytes[0..4].copy_from_slice(HANDSHAKE_MAGIC);
        bytes[4..8].copy_from_slice(&self.reference.0);
        bytes[8..12].copy_from_slice(&self.total_size.to_be_bytes());
        bytes
    }

    /// Parse a preamble (the magic is returned, not validated)
    pub fn from_bytes(bytes: &[u8; HANDSHAKE_SIZE]) -> ([u8; 4], Self) {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut reference = [0u8; 4];
        reference.copy_from_slice(&bytes[4..8]);
        let total_size = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        (
            magic,
            Self {
                reference: ReferenceNumber(reference),
                total_size,
            },
        )
    }

    /// Write the preamble and flush
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }

    /// Read a preamble from a stream
    pub async fn read_from<R>(reader: &mut R) -> Result<([u8; 4], Self), FormatError>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; HANDSHAKE_SIZE];
        reader
            .read_exact(&mut bytes)
            .await
            .map_err(|e| FormatError::from_read("handshake", e))?;
        Ok(Self::from_bytes(&bytes))
    }
}
