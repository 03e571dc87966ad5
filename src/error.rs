//! Error types.

use crate::platform::OsFamily;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for resolver operations.
pub type Result<T> = std::result::Result<T, ResolverError>;

/// Result alias for settings operations.
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Errors returned by resolver operations.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Filesystem I/O failed (typically `PermissionDenied` on system paths).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No resolver strategy exists for the host.
    #[error("unsupported platform: {os}")]
    UnsupportedPlatform {
        /// What the platform detector reported.
        os: OsFamily,
    },

    /// A helper command exited unsuccessfully.
    #[error("command `{program}` failed (exit code {code:?}): {stderr}")]
    Command {
        /// The program that was run.
        program: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
}

impl ResolverError {
    /// Returns `true` if the underlying I/O error is `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
    }
}

/// Errors returned by the settings store.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file does not exist.
    #[error("settings file not found: {}", path.display())]
    NotFound {
        /// The path that was read.
        path: PathBuf,
    },

    /// The settings file exists but is not a valid document.
    #[error("failed to parse settings file {}: {source}", path.display())]
    Parse {
        /// The path that was read.
        path: PathBuf,
        /// The underlying parser error.
        #[source]
        source: toml::de::Error,
    },

    /// The document could not be serialized.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The document parsed but does not match the settings schema.
    #[error("invalid settings: {0}")]
    Schema(String),

    /// No settings path override and no home directory to default to.
    #[error("cannot locate home directory for the settings file")]
    NoHomeDir,

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
