//! Flattened file object (FFO) container
//!
//! A file crosses the transfer port as one linear stream: a 24-byte container
//! header followed by 1 to 3 forks, each a 16-byte fork header and its payload.
//!
//! ```text
//! Container header (24 bytes)
//!   [0:4]   reserved
//!   [4:6]   version, big-endian u16 (1)
//!   [6:22]  reserved, zero
//!   [22:24] fork count, big-endian u16
//!
//! Fork header (16 bytes)
//!   [0:4]   fork type tag ("INFO", "DATA", "MACR")
//!   [4:6]   compression (0)
//!   [6:12]  reserved
//!   [12:16] payload size, big-endian u32
//! ```

mod info;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::FormatError;

pub use info::{INFO_FORK_FIXED_SIZE, InformationFork, encode_info_fork};

/// Size of the container header in bytes
pub const CONTAINER_HEADER_SIZE: usize = 24;

/// Size of each fork header in bytes
pub const FORK_HEADER_SIZE: usize = 16;

/// Container format version written by this implementation
pub const FFO_VERSION: u16 = 1;

// =============================================================================
// Container Header
// =============================================================================

/// The 24-byte header opening a flattened file object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub version: u16,
    pub fork_count: u16,
}

impl ContainerHeader {
    /// Header for a container holding `fork_count` forks
    pub fn new(fork_count: u16) -> Self {
        Self {
            version: FFO_VERSION,
            fork_count,
        }
    }

    pub fn to_bytes(&self) -> [u8; CONTAINER_HEADER_SIZE] {
        let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
        bytes[4..6].copy_from_slice(&self.version.to_be_bytes());
        bytes[22..24].copy_from_slice(&self.fork_count.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; CONTAINER_HEADER_SIZE]) -> Self {
        Self {
            version: u16::from_be_bytes([bytes[4], bytes[5]]),
            fork_count: u16::from_be_bytes([bytes[22], bytes[23]]),
        }
    }

    /// Read the fixed 24-byte header from a stream
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, FormatError>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
        reader
            .read_exact(&mut bytes)
            .await
            .map_err(|e| FormatError::from_read("container header", e))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await
    }
}

// =============================================================================
// Fork Type
// =============================================================================

/// The kind of a fork, identified by its four-byte tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkType {
    /// File metadata (name, type/creator, timestamps)
    Info,
    /// The file's contents
    Data,
    /// Classic Mac OS resource fork
    Resource,
    /// Unrecognized tag, skipped by readers
    Other([u8; 4]),
}

impl ForkType {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match &tag {
            b"INFO" => Self::Info,
            b"DATA" => Self::Data,
            b"MACR" => Self::Resource,
            _ => Self::Other(tag),
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        match self {
            Self::Info => *b"INFO",
            Self::Data => *b"DATA",
            Self::Resource => *b"MACR",
            Self::Other(tag) => *tag,
        }
    }
}

impl std::fmt::Display for ForkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.tag()))
    }
}

// =============================================================================
// Fork Header
// =============================================================================

/// The 16-byte header preceding each fork payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkHeader {
    pub fork_type: ForkType,
    pub compression: u16,
    pub data_size: u32,
}

impl ForkHeader {
    /// Uncompressed fork header
    pub fn new(fork_type: ForkType, data_size: u32) -> Self {
        Self {
            fork_type,
            compression: 0,
            data_size,
        }
    }

    pub fn to_bytes(&self) -> [u8; FORK_HEADER_SIZE] {
        let mut bytes = [0u8; FORK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.fork_type.tag());
        bytes[4..6].copy_from_slice(&self.compression.to_be_bytes());
        bytes[12..16].copy_from_slice(&self.data_size.to_be_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; FORK_HEADER_SIZE]) -> Self {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&bytes[0..4]);
        Self {
            fork_type: ForkType::from_tag(tag),
            compression: u16::from_be_bytes([bytes[4], bytes[5]]),
            data_size: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        }
    }

    /// Read the fixed 16-byte fork header from a stream
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, FormatError>
    where
        R: AsyncRead + Unpin,
    {
        let mut bytes = [0u8; FORK_HEADER_SIZE];
        reader
            .read_exact(&mut bytes)
            .await
            .map_err(|e| FormatError::from_read("fork header", e))?;
        Ok(Self::from_bytes(&bytes))
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Convert a local length to a 32-bit wire size
pub fn wire_size(what: &'static str, size: u64) -> Result<u32, FormatError> {
    u32::try_from(size).map_err(|_| FormatError::TooLarge { what, size })
}

/// Read and discard exactly `size` payload bytes
pub async fn skip_fork<R>(reader: &mut R, size: u32) -> Result<(), FormatError>
where
    R: AsyncRead + Unpin,
{
    let mut limited = (&mut *reader).take(u64::from(size));
    let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink())
        .await
        .map_err(|e| FormatError::from_read("fork payload", e))?;

    if skipped != u64::from(size) {
        return Err(FormatError::Truncated {
            what: "fork payload",
            source: std::io::ErrorKind::UnexpectedEof.into(),
        });
    }
    Ok(())
}

/// Read a whole fork payload into memory (for small forks such as INFO)
pub async fn read_fork_payload<R>(reader: &mut R, size: u32) -> Result<Vec<u8>, FormatError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = vec![0u8; size as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| FormatError::from_read("fork payload", e))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_header_layout() {
        let bytes = ContainerHeader::new(3).to_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..6], &[0x00, 0x01]);
        assert!(bytes[6..22].iter().all(|&b| b == 0));
        assert_eq!(&bytes[22..24], &[0x00, 0x03]);
    }

    #[test]
    fn test_container_header_ignores_leading_tag() {
        let mut bytes = ContainerHeader::new(2).to_bytes();
        bytes[0..4].copy_from_slice(b"FILP");
        let header = ContainerHeader::from_bytes(&bytes);
        assert_eq!(header.version, 1);
        assert_eq!(header.fork_count, 2);
    }

    #[test]
    fn test_fork_header_layout() {
        let bytes = ForkHeader::new(ForkType::Data, 0x0102_0304).to_bytes();
        assert_eq!(&bytes[0..4], b"DATA");
        assert_eq!(&bytes[4..12], &[0; 8]);
        assert_eq!(&bytes[12..16], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_fork_type_tags() {
        assert_eq!(ForkType::from_tag(*b"INFO"), ForkType::Info);
        assert_eq!(ForkType::from_tag(*b"MACR"), ForkType::Resource);
        assert_eq!(ForkType::from_tag(*b"XTRA"), ForkType::Other(*b"XTRA"));
        assert_eq!(ForkType::Other(*b"XTRA").to_string(), "XTRA");
    }

    #[test]
    fn test_wire_size_limit() {
        assert_eq!(wire_size("data fork", 5000).unwrap(), 5000);
        assert!(matches!(
            wire_size("data fork", u64::from(u32::MAX) + 1),
            Err(FormatError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_container_header() {
        let mut input: &[u8] = &[0u8; 10];
        let err = ContainerHeader::read_from(&mut input).await.unwrap_err();
        assert!(matches!(err, FormatError::Truncated { .. }));
    }

    #[tokio::test]
    async fn test_zero_length_fork() {
        let mut stream = Vec::new();
        ForkHeader::new(ForkType::Data, 0)
            .write_to(&mut stream)
            .await
            .unwrap();
        assert_eq!(stream.len(), FORK_HEADER_SIZE);

        let mut input = stream.as_slice();
        let header = ForkHeader::read_from(&mut input).await.unwrap();
        assert_eq!(header.data_size, 0);
        skip_fork(&mut input, header.data_size).await.unwrap();
    }

    #[tokio::test]
    async fn test_skip_unknown_fork_then_continue() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&ForkHeader::new(ForkType::Other(*b"XTRA"), 5).to_bytes());
        stream.extend_from_slice(b"abcde");
        stream.extend_from_slice(&ForkHeader::new(ForkType::Data, 2).to_bytes());
        stream.extend_from_slice(b"hi");

        let mut input = stream.as_slice();
        let unknown = ForkHeader::read_from(&mut input).await.unwrap();
        skip_fork(&mut input, unknown.data_size).await.unwrap();

        let data = ForkHeader::read_from(&mut input).await.unwrap();
        assert_eq!(data.fork_type, ForkType::Data);
        assert_eq!(read_fork_payload(&mut input, 2).await.unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_skip_past_end_is_truncated() {
        let mut input: &[u8] = b"abc";
        let err = skip_fork(&mut input, 10).await.unwrap_err();
        assert!(matches!(err, FormatError::Truncated { .. }));
    }
}
