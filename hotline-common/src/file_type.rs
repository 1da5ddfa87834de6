//! Classic Mac OS type/creator codes derived from filename extensions
//!
//! Hosts without native type/creator metadata still have to fill these fields
//! in the INFO fork, so they are guessed from the extension.

/// A four-character type code and creator code pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileType {
    pub type_code: [u8; 4],
    pub creator_code: [u8; 4],
}

/// Used when the extension is unknown
pub const DEFAULT_FILE_TYPE: FileType = FileType {
    type_code: *b"TEXT",
    creator_code: *b"TTXT",
};

/// Extension (lowercase, no dot) to type/creator codes
const FILE_TYPES: &[(&str, FileType)] = &[
    ("sit", ft(b"SIT!", b"SIT!")),
    ("pdf", ft(b"PDF ", b"CARO")),
    ("gif", ft(b"GIFf", b"ogle")),
    ("txt", ft(b"TEXT", b"ttxt")),
    ("zip", ft(b"ZIP ", b"SITx")),
    ("tgz", ft(b"Gzip", b"SITx")),
    ("hqx", ft(b"TEXT", b"SITx")),
    ("jpg", ft(b"JPEG", b"ogle")),
    ("jpeg", ft(b"JPEG", b"ogle")),
    ("img", ft(b"rohd", b"ddsk")),
    ("sea", ft(b"APPL", b"aust")),
    ("mov", ft(b"MooV", b"TVOD")),
    ("incomplete", ft(b"HTft", b"HTLC")),
];

const fn ft(type_code: &[u8; 4], creator_code: &[u8; 4]) -> FileType {
    FileType {
        type_code: *type_code,
        creator_code: *creator_code,
    }
}

/// Look up type/creator codes for a filename by its extension
pub fn file_type_for_name(file_name: &str) -> FileType {
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return DEFAULT_FILE_TYPE;
    };
    let extension = extension.to_ascii_lowercase();

    FILE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, file_type)| *file_type)
        .unwrap_or(DEFAULT_FILE_TYPE)
}
