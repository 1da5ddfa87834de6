//! File utility functions for the transfer executor
//!
//! Provides helpers for validating server-provided file names, creating a
//! download's destination under a free name, and locating the resource fork stored in a sidecar.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncSeekExt;
use tracing::warn;

use hotline_common::sidecar::{SIDECAR_HEADER_SIZE, read_resource_entry, sidecar_path};

use crate::constants::MAX_UNIQUE_PATH_ATTEMPTS;

/// Validate that a file name from the server is safe to create locally
///
/// Rejects anything that could escape the download directory.
pub fn is_safe_file_name(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }

    // Control characters include NUL (0x00-0x1F and 0x7F)
    if name.chars().any(|c| c.is_ascii_control()) {
        return false;
    }

    if name.contains(['/', '\\']) {
        return false;
    }

    // Drive-relative names such as "C:file.txt"
    if name.len() >= 2 && name.chars().nth(1) == Some(':') {
        return false;
    }

    true
}

/// Create the file a download of `file_name` lands in, inside `dir`
///
/// Uses the name as-is when free, otherwise the first free " (N)" variant.
/// Each candidate is created with `create_new`, so two downloads of the same
/// name never end up sharing a destination.
pub async fn create_download_file(dir: &Path, file_name: &str) -> io::Result<(PathBuf, File)> {
    let original = dir.join(file_name);

    for i in 0..=MAX_UNIQUE_PATH_ATTEMPTS {
        let candidate = if i == 0 {
            original.clone()
        } else {
            numbered_path(&original, i)
        };

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {}", original.display()),
    ))
}

/// Insert " (N)" before the extension
///
/// Given "/path/to/file.txt" and 2, returns "/path/to/file (2).txt".
pub fn numbered_path(original: &Path, n: u32) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let new_name = match original.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    original.with_file_name(new_name)
}

/// A resource fork read back from a sidecar, positioned at its first byte
pub struct ResourceFork {
    pub file: File,
    pub length: u32,
    pub path: PathBuf,
}

/// Open the resource fork stored next to `data_path`, if there is one
///
/// Sidecars whose descriptor table cannot be parsed are read as raw bytes
/// after the 82-byte header. An empty fork counts as no fork.
pub async fn open_resource_fork(data_path: &Path) -> io::Result<Option<ResourceFork>> {
    let Some(path) = sidecar_path(data_path) else {
        return Ok(None);
    };

    let mut file = match File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let file_len = file.metadata().await?.len();

    let header = SIDECAR_HEADER_SIZE as u64;
    let fallback = (header, file_len.saturating_sub(header));
    let (offset, length) = match read_resource_entry(&mut file).await {
        Ok(entry) if u64::from(entry.offset) + u64::from(entry.length) <= file_len => {
            (u64::from(entry.offset), u64::from(entry.length))
        }
        Ok(entry) => {
            warn!(
                sidecar = %path.display(),
                offset = entry.offset,
                length = entry.length,
                "resource entry runs past end of sidecar, reading after the header"
            );
            fallback
        }
        Err(e) => {
            warn!(
                sidecar = %path.display(),
                error = %e,
                "unreadable sidecar header, reading after the header"
            );
            fallback
        }
    };

    let Ok(length) = u32::try_from(length) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "resource fork larger than 4 GiB",
        ));
    };
    if length == 0 {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(offset)).await?;
    Ok(Some(ResourceFork { file, length, path }))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use hotline_common::sidecar::encode_sidecar_header;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_is_safe_file_name_valid() {
        assert!(is_safe_file_name("file.txt"));
        assert!(is_safe_file_name("My Stuff 1.0.sit"));
        assert!(is_safe_file_name(".hidden"));
        assert!(is_safe_file_name("ファイル.txt"));
    }

    #[test]
    fn test_is_safe_file_name_rejects_separators() {
        assert!(!is_safe_file_name("dir/file.txt"));
        assert!(!is_safe_file_name("/etc/passwd"));
        assert!(!is_safe_file_name("..\\file.txt"));
        assert!(!is_safe_file_name("C:file.txt"));
    }

    #[test]
    fn test_is_safe_file_name_rejects_dots_and_empty() {
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name("."));
        assert!(!is_safe_file_name(".."));
    }

    #[test]
    fn test_is_safe_file_name_rejects_control_chars() {
        assert!(!is_safe_file_name("foo\0bar"));
        assert!(!is_safe_file_name("file\x7f.txt"));
        assert!(!is_safe_file_name("line\nbreak"));
    }

    #[test]
    fn test_numbered_path() {
        assert_eq!(
            numbered_path(Path::new("/tmp/a.txt"), 2),
            PathBuf::from("/tmp/a (2).txt")
        );
        assert_eq!(
            numbered_path(Path::new("/tmp/README"), 1),
            PathBuf::from("/tmp/README (1)")
        );
    }

    #[tokio::test]
    async fn test_create_download_file_free_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, _file) = create_download_file(dir.path(), "a.txt").await.unwrap();
        assert_eq!(path, dir.path().join("a.txt"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_create_download_file_skips_taken_names() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("a (1).txt"), b"x").unwrap();

        let (path, _file) = create_download_file(dir.path(), "a.txt").await.unwrap();
        assert_eq!(path, dir.path().join("a (2).txt"));
        // Existing files are left alone
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_create_download_file_without_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("README"), b"x").unwrap();

        let (path, _file) = create_download_file(dir.path(), "README").await.unwrap();
        assert_eq!(path, dir.path().join("README (1)"));
    }

    #[tokio::test]
    async fn test_create_download_file_concurrent_same_name() {
        let dir = tempfile::TempDir::new().unwrap();

        let (first, second) = tokio::join!(
            create_download_file(dir.path(), "same.txt"),
            create_download_file(dir.path(), "same.txt"),
        );
        let (first, _) = first.unwrap();
        let (second, _) = second.unwrap();

        assert_ne!(first, second);
        let mut names = vec![first, second];
        names.sort();
        assert_eq!(
            names,
            vec![dir.path().join("same (1).txt"), dir.path().join("same.txt")]
        );
    }

    #[tokio::test]
    async fn test_open_resource_fork_missing_sidecar() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("app");
        std::fs::write(&data, b"data").unwrap();

        assert!(open_resource_fork(&data).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_resource_fork_single_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let data = dir.path().join("app");
        let mut sidecar = encode_sidecar_header(5).to_vec();
        sidecar.extend_from_slice(b"RSRC!");
        std::fs::write(dir.path().join("._app"), &sidecar).unwrap();

        let mut fork = open_resource_fork(&data).await.unwrap().unwrap();
        assert_eq!(fork.length, 5);
        let mut bytes = Vec::new();
        fork.file.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"RSRC!");
    }

    #[tokio::test]
    async fn test_open_resource_fork_two_entries() {
        // Finder info first, then the resource fork, as macOS writes them
        let mut sidecar = vec![0u8; 50];
        sidecar[0..4].copy_from_slice(&[0x00, 0x05, 0x16, 0x07]);
        sidecar[4..8].copy_from_slice(&[0x00, 0x02, 0x00, 0x00]);
        sidecar[24..26].copy_from_slice(&2u16.to_be_bytes());
        sidecar[26..30].copy_from_slice(&9u32.to_be_bytes());
        sidecar[30..34].copy_from_slice(&50u32.to_be_bytes());
        sidecar[34..38].copy_from_slice(&4u32.to_be_bytes());
        sidecar[38..42].copy_from_slice(&2u32.to_be_bytes());
        sidecar[42..46].copy_from_slice(&54u32.to_be_bytes());
        sidecar[46..50].copy_from_slice(&3u32.to_be_bytes());
        sidecar.extend_from_slice(b"FINF");
        sidecar.extend_from_slice(b"abc");

        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("._doc"), &sidecar).unwrap();

        let mut fork = open_resource_fork(&dir.path().join("doc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fork.length, 3);
        let mut bytes = Vec::new();
        fork.file.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"abc");
    }

    #[tokio::test]
    async fn test_open_resource_fork_falls_back_to_fixed_offset() {
        let mut sidecar = vec![0xFFu8; SIDECAR_HEADER_SIZE];
        sidecar.extend_from_slice(b"tail");

        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("._odd"), &sidecar).unwrap();

        let mut fork = open_resource_fork(&dir.path().join("odd"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fork.length, 4);
        let mut bytes = Vec::new();
        fork.file.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"tail");
    }
}
