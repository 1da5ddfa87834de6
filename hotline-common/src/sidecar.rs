//! AppleDouble sidecar for resource forks
//!
//! A downloaded resource fork is stored next to the data file as `._<name>`:
//! an AppleDouble header with a single resource-fork entry, zero padded to 82
//! bytes, followed by the raw fork bytes.
//!
//! ```text
//! [0:4]   magic 00 05 16 07
//! [4:8]   version 00 02 00 00
//! [8:24]  filler, zero
//! [24:26] entry count (1)
//! [26:30] entry ID (2 = resource fork)
//! [30:34] entry offset (82)
//! [34:38] entry length, big-endian u32
//! [38:82] zero padding
//! ```

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::FormatError;

/// Size of the header written ahead of the resource fork bytes
pub const SIDECAR_HEADER_SIZE: usize = 82;

/// Filename prefix marking a sidecar
pub const SIDECAR_PREFIX: &str = "._";

/// AppleDouble magic number
pub const APPLE_DOUBLE_MAGIC: [u8; 4] = [0x00, 0x05, 0x16, 0x07];

/// AppleDouble version 2
pub const APPLE_DOUBLE_VERSION: [u8; 4] = [0x00, 0x02, 0x00, 0x00];

/// AppleDouble entry ID for the resource fork
pub const RESOURCE_FORK_ENTRY_ID: u32 = 2;

/// Fixed part of the header before the entry descriptors
const PREAMBLE_SIZE: usize = 26;

/// Size of one entry descriptor
const DESCRIPTOR_SIZE: usize = 12;

/// Location of the resource fork inside a sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceEntry {
    pub offset: u32,
    pub length: u32,
}

/// Path of the sidecar belonging to `path` (`dir/file` becomes `dir/._file`)
pub fn sidecar_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    Some(path.with_file_name(format!("{SIDECAR_PREFIX}{name}")))
}

/// Build the 82-byte header for a resource fork of `resource_fork_size` bytes
pub fn encode_sidecar_header(resource_fork_size: u32) -> [u8; SIDECAR_HEADER_SIZE] {
    let mut header = [0u8; SIDECAR_HEADER_SIZE];
    header[0..4].copy_from_slice(&APPLE_DOUBLE_MAGIC);
    header[4..8].copy_from_slice(&APPLE_DOUBLE_VERSION);
    header[24..26].copy_from_slice(&1u16.to_be_bytes());
    header[26..30].copy_from_slice(&RESOURCE_FORK_ENTRY_ID.to_be_bytes());
    header[30..34].copy_from_slice(&(SIDECAR_HEADER_SIZE as u32).to_be_bytes());
    header[34..38].copy_from_slice(&resource_fork_size.to_be_bytes());
    header
}

/// Write the sidecar header
pub async fn write_sidecar_header<W>(writer: &mut W, resource_fork_size: u32) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&encode_sidecar_header(resource_fork_size))
        .await
}

/// Read an AppleDouble header and locate its resource fork entry
///
/// Consumes the preamble and the descriptor table; the caller seeks to
/// `offset` before reading the fork bytes.
pub async fn read_resource_entry<R>(reader: &mut R) -> Result<ResourceEntry, FormatError>
where
    R: AsyncRead + Unpin,
{
    let mut preamble = [0u8; PREAMBLE_SIZE];
    reader
        .read_exact(&mut preamble)
        .await
        .map_err(|e| FormatError::from_read("sidecar header", e))?;

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&preamble[0..4]);
    if magic != APPLE_DOUBLE_MAGIC {
        return Err(FormatError::BadSidecarMagic(magic));
    }

    let entry_count = u16::from_be_bytes([preamble[24], preamble[25]]);
    for _ in 0..entry_count {
        let mut descriptor = [0u8; DESCRIPTOR_SIZE];
        reader
            .read_exact(&mut descriptor)
            .await
            .map_err(|e| FormatError::from_read("sidecar entry", e))?;

        let id = u32::from_be_bytes([descriptor[0], descriptor[1], descriptor[2], descriptor[3]]);
        if id == RESOURCE_FORK_ENTRY_ID {
            return Ok(ResourceEntry {
                offset: u32::from_be_bytes([
                    descriptor[4],
                    descriptor[5],
                    descriptor[6],
                    descriptor[7],
                ]),
                length: u32::from_be_bytes([
                    descriptor[8],
                    descriptor[9],
                    descriptor[10],
                    descriptor[11],
                ]),
            });
        }
    }

    Err(FormatError::MissingResourceEntry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = encode_sidecar_header(0x1234);
        assert_eq!(header.len(), 82);
        assert_eq!(&header[0..4], &APPLE_DOUBLE_MAGIC);
        assert_eq!(&header[4..8], &APPLE_DOUBLE_VERSION);
        assert!(header[8..24].iter().all(|&b| b == 0));
        assert_eq!(&header[24..26], &[0, 1]);
        assert_eq!(&header[26..30], &[0, 0, 0, 2]);
        assert_eq!(&header[30..34], &[0, 0, 0, 0x52]);
        assert_eq!(&header[34..38], &[0, 0, 0x12, 0x34]);
        assert!(header[38..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/tmp/dl/Game.sit")),
            Some(PathBuf::from("/tmp/dl/._Game.sit"))
        );
        assert_eq!(sidecar_path(Path::new("/")), None);
    }

    #[tokio::test]
    async fn test_write_then_read_back_after_header() {
        let fork: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let mut file = Vec::new();
        write_sidecar_header(&mut file, fork.len() as u32)
            .await
            .unwrap();
        file.extend_from_slice(&fork);

        assert_eq!(&file[SIDECAR_HEADER_SIZE..], fork.as_slice());

        let mut input = file.as_slice();
        let entry = read_resource_entry(&mut input).await.unwrap();
        assert_eq!(entry.offset as usize, SIDECAR_HEADER_SIZE);
        assert_eq!(entry.length as usize, fork.len());
    }

    #[tokio::test]
    async fn test_finds_resource_entry_after_finder_info() {
        // Two entries, Finder info first, as written by macOS
        let mut file = Vec::new();
        file.extend_from_slice(&APPLE_DOUBLE_MAGIC);
        file.extend_from_slice(&APPLE_DOUBLE_VERSION);
        file.extend_from_slice(&[0u8; 16]);
        file.extend_from_slice(&2u16.to_be_bytes());
        file.extend_from_slice(&9u32.to_be_bytes());
        file.extend_from_slice(&50u32.to_be_bytes());
        file.extend_from_slice(&32u32.to_be_bytes());
        file.extend_from_slice(&2u32.to_be_bytes());
        file.extend_from_slice(&82u32.to_be_bytes());
        file.extend_from_slice(&7u32.to_be_bytes());

        let mut input = file.as_slice();
        let entry = read_resource_entry(&mut input).await.unwrap();
        assert_eq!(entry, ResourceEntry {
            offset: 82,
            length: 7
        });
    }

    #[tokio::test]
    async fn test_rejects_bad_magic() {
        let mut input: &[u8] = &[0xFFu8; 82];
        let err = read_resource_entry(&mut input).await.unwrap_err();
        assert!(matches!(err, FormatError::BadSidecarMagic(_)));
    }
}
