//! Transfer configuration

mod settings;

pub use settings::{SettingsError, TransferSettings};
