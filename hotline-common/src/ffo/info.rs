//! INFO fork body
//!
//! ```text
//! [0:4]    platform ("AMAC")
//! [4:8]    type code
//! [8:12]   creator code
//! [12:16]  flags
//! [16:20]  platform flags
//! [20:52]  reserved
//! [52:60]  create date (HotlineTime)
//! [60:68]  modify date (HotlineTime)
//! [68:70]  name script
//! [70:72]  name length, big-endian u16
//! [72:..]  name
//! then     comment length, big-endian u16, and comment
//! ```

use std::time::SystemTime;

use super::{ForkHeader, ForkType, wire_size};
use crate::FormatError;
use crate::file_type::{FileType, file_type_for_name};
use crate::time::HotlineTime;

/// Size of the INFO body before the variable-length name
pub const INFO_FORK_FIXED_SIZE: usize = 72;

const PLATFORM: &[u8; 4] = b"AMAC";

const PLATFORM_FLAGS: [u8; 4] = [0, 0, 1, 0];

/// Decoded INFO fork body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationFork {
    pub platform: [u8; 4],
    pub file_type: FileType,
    pub flags: [u8; 4],
    pub platform_flags: [u8; 4],
    pub create_date: HotlineTime,
    pub modify_date: HotlineTime,
    pub name_script: u16,
    pub name: String,
    pub comment: Vec<u8>,
}

impl InformationFork {
    /// Metadata for a local file
    ///
    /// The create date mirrors the modify date since not every filesystem
    /// records creation time.
    pub fn new(name: impl Into<String>, modified: HotlineTime, file_type: FileType) -> Self {
        Self {
            platform: *PLATFORM,
            file_type,
            flags: [0; 4],
            platform_flags: PLATFORM_FLAGS,
            create_date: modified,
            modify_date: modified,
            name_script: 0,
            name: name.into(),
            comment: Vec::new(),
        }
    }

    /// Serialized body size
    pub fn size(&self) -> usize {
        INFO_FORK_FIXED_SIZE + self.name.len() + 2 + self.comment.len()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let name_len = u16::try_from(self.name.len()).map_err(|_| FormatError::TooLarge {
            what: "file name",
            size: self.name.len() as u64,
        })?;
        let comment_len =
            u16::try_from(self.comment.len()).map_err(|_| FormatError::TooLarge {
                what: "file comment",
                size: self.comment.len() as u64,
            })?;

        let mut bytes = Vec::with_capacity(self.size());
        bytes.extend_from_slice(&self.platform);
        bytes.extend_from_slice(&self.file_type.type_code);
        bytes.extend_from_slice(&self.file_type.creator_code);
        bytes.extend_from_slice(&self.flags);
        bytes.extend_from_slice(&self.platform_flags);
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(&self.create_date.0);
        bytes.extend_from_slice(&self.modify_date.0);
        bytes.extend_from_slice(&self.name_script.to_be_bytes());
        bytes.extend_from_slice(&name_len.to_be_bytes());
        bytes.extend_from_slice(self.name.as_bytes());
        bytes.extend_from_slice(&comment_len.to_be_bytes());
        bytes.extend_from_slice(&self.comment);
        Ok(bytes)
    }

    /// Parse an INFO body
    ///
    /// Servers that omit the trailing comment length are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < INFO_FORK_FIXED_SIZE {
            return Err(FormatError::TooShort {
                what: "info fork",
                needed: INFO_FORK_FIXED_SIZE,
                actual: bytes.len(),
            });
        }

        let name_len = u16::from_be_bytes([bytes[70], bytes[71]]) as usize;
        let name_end = INFO_FORK_FIXED_SIZE + name_len;
        if bytes.len() < name_end {
            return Err(FormatError::TooShort {
                what: "info fork name",
                needed: name_end,
                actual: bytes.len(),
            });
        }

        let comment = match bytes.get(name_end..name_end + 2) {
            Some(len) => {
                let comment_len = u16::from_be_bytes([len[0], len[1]]) as usize;
                let start = name_end + 2;
                bytes
                    .get(start..start + comment_len)
                    .ok_or(FormatError::TooShort {
                        what: "info fork comment",
                        needed: start + comment_len,
                        actual: bytes.len(),
                    })?
                    .to_vec()
            }
            None => Vec::new(),
        };

        Ok(Self {
            platform: array4(&bytes[0..4]),
            file_type: FileType {
                type_code: array4(&bytes[4..8]),
                creator_code: array4(&bytes[8..12]),
            },
            flags: array4(&bytes[12..16]),
            platform_flags: array4(&bytes[16..20]),
            create_date: HotlineTime(array8(&bytes[52..60])),
            modify_date: HotlineTime(array8(&bytes[60..68])),
            name_script: u16::from_be_bytes([bytes[68], bytes[69]]),
            name: String::from_utf8_lossy(&bytes[INFO_FORK_FIXED_SIZE..name_end]).into_owned(),
            comment,
        })
    }
}

/// Build a complete INFO fork (16-byte fork header plus body) for a local file
///
/// When `file_type` is `None` the codes are guessed from the extension.
pub fn encode_info_fork(
    file_name: &str,
    modified: SystemTime,
    file_type: Option<FileType>,
) -> Result<Vec<u8>, FormatError> {
    let file_type = file_type.unwrap_or_else(|| file_type_for_name(file_name));
    let info = InformationFork::new(
        file_name,
        HotlineTime::from_system_time(modified),
        file_type,
    );
    let body = info.to_bytes()?;
    let header = ForkHeader::new(ForkType::Info, wire_size("info fork", body.len() as u64)?);

    let mut fork = Vec::with_capacity(super::FORK_HEADER_SIZE + body.len());
    fork.extend_from_slice(&header.to_bytes());
    fork.extend_from_slice(&body);
    Ok(fork)
}

fn array4(slice: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(slice);
    out
}

fn array8(slice: &[u8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(slice);
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::ffo::FORK_HEADER_SIZE;

    #[test]
    fn test_encode_then_decode_recovers_metadata() {
        let modified = Utc.with_ymd_and_hms(2023, 6, 15, 12, 30, 45).unwrap();
        let fork = encode_info_fork("report.pdf", modified.into(), None).unwrap();

        let header = ForkHeader::from_bytes(fork[..FORK_HEADER_SIZE].try_into().unwrap());
        assert_eq!(header.fork_type, ForkType::Info);
        assert_eq!(header.data_size as usize, fork.len() - FORK_HEADER_SIZE);

        let info = InformationFork::from_bytes(&fork[FORK_HEADER_SIZE..]).unwrap();
        assert_eq!(info.name, "report.pdf");
        assert_eq!(&info.file_type.type_code, b"PDF ");
        assert_eq!(&info.file_type.creator_code, b"CARO");
        assert_eq!(info.modify_date.to_datetime(), Some(modified));
        assert_eq!(&info.platform, b"AMAC");
    }

    #[test]
    fn test_explicit_codes_override_table() {
        let codes = FileType {
            type_code: *b"APPL",
            creator_code: *b"HTLC",
        };
        let fork = encode_info_fork("Hotline.txt", SystemTime::UNIX_EPOCH, Some(codes)).unwrap();
        let info = InformationFork::from_bytes(&fork[FORK_HEADER_SIZE..]).unwrap();
        assert_eq!(info.file_type, codes);
    }

    #[test]
    fn test_body_size() {
        let info = InformationFork::new("abc", HotlineTime::default(), FileType {
            type_code: *b"TEXT",
            creator_code: *b"ttxt",
        });
        assert_eq!(info.size(), 72 + 3 + 2);
        assert_eq!(info.to_bytes().unwrap().len(), info.size());
    }

    #[test]
    fn test_sub_second_resolution_is_kept_to_millis() {
        let modified = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        let fork = encode_info_fork("a.txt", modified, None).unwrap();
        let info = InformationFork::from_bytes(&fork[FORK_HEADER_SIZE..]).unwrap();
        let decoded = info.modify_date.to_datetime().unwrap();
        assert_eq!(decoded.timestamp_millis(), 1_700_000_000_250);
    }

    #[test]
    fn test_missing_comment_length_is_accepted() {
        let info = InformationFork::new("x", HotlineTime::default(), FileType {
            type_code: *b"TEXT",
            creator_code: *b"ttxt",
        });
        let mut bytes = info.to_bytes().unwrap();
        bytes.truncate(INFO_FORK_FIXED_SIZE + 1);
        let parsed = InformationFork::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name, "x");
        assert!(parsed.comment.is_empty());
    }

    #[test]
    fn test_short_body_rejected() {
        assert!(matches!(
            InformationFork::from_bytes(&[0u8; 40]),
            Err(FormatError::TooShort { .. })
        ));
    }
}
