//! Transfer settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS, DOWNLOAD_DIR_NAME,
};

/// Error loading settings from disk
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Options governing how transfers are carried out
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TransferSettings {
    /// Download location for file transfers
    /// Defaults to `<downloads>/Hotline` if not set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Validate the server certificate on TLS transfer connections
    ///
    /// Off by default: legacy servers commonly run self-signed certificates.
    #[serde(default)]
    pub verify_certificates: bool,

    /// Accept a fork that ends early as complete
    #[serde(default)]
    pub tolerate_short_reads: bool,

    /// Timeout for dialing the transfer port
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// A read or write making no progress for this long fails the transfer (0 = never)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            download_dir: None,
            verify_certificates: false,
            tolerate_short_reads: false,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl TransferSettings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory downloads are written to
    pub fn resolved_download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return dir.clone();
        }
        dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DOWNLOAD_DIR_NAME)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}
