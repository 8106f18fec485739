//! Error types for jbi

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for every failure; usage and operational errors are not distinguished.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("{0}")]
    Usage(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("No platform provided")]
    MissingPlatform { available: Vec<String> },

    #[error("Unknown platform: {platform}")]
    UnknownPlatform {
        platform: String,
        available: Vec<String>,
    },

    #[error("Release catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("No {channel} release matching '{selector}' found for product {code}")]
    ReleaseNotFound {
        channel: String,
        selector: String,
        code: String,
    },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Invalid archive {path}: {reason}")]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("No application bundle found in {0}")]
    NoBundleFound(PathBuf),

    #[error("Expected one application bundle in {mount_point}, found {found}")]
    AmbiguousBundle { mount_point: PathBuf, found: usize },

    #[error("Installation could not be verified: {0} does not exist")]
    InstallVerificationFailed(PathBuf),

    #[error("Disk image error: {0}")]
    DiskImage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallerError {
    /// Platform keys to show the user alongside the error, if any.
    pub fn available_platforms(&self) -> Option<&[String]> {
        match self {
            Self::MissingPlatform { available } | Self::UnknownPlatform { available, .. } => {
                Some(available)
            }
            _ => None,
        }
    }

    /// Errors caused by bad arguments; the CLI prints help text after them.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::UnknownProduct(_))
    }

    pub fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

pub type Result<T> = std::result::Result<T, InstallerError>;
