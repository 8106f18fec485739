//! Host-specific installation of downloaded artifacts

mod linux;
mod macos;

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::Config;
use crate::error::{InstallerError, Result};
use crate::product::Product;

pub use linux::{canonical_dir_name, top_level_component, LinuxInstaller};
pub use macos::{parse_mount_point, DiskImageTool, Hdiutil, MacInstaller, MAC_APPLICATIONS_DIR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub prefix: PathBuf,
    pub force: bool,
    pub link: bool,
    pub app: bool,
    pub desktop: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Where the product now lives; `None` when nothing was installed.
    pub installed: Option<PathBuf>,
    /// An existing installation was kept because `force` was not set.
    pub skipped_extraction: bool,
    pub link: Option<PathBuf>,
    /// Previous installation moved aside.
    pub backup: Option<PathBuf>,
    /// Desktop entry files written.
    pub entries: Vec<PathBuf>,
}

pub trait PlatformInstaller {
    fn name(&self) -> &'static str;

    fn install(
        &self,
        artifact: &Path,
        product: &Product,
        options: &InstallOptions,
    ) -> Result<InstallReport>;
}

/// Installer for the OS this binary runs on.
pub fn for_host(config: &Config) -> Box<dyn PlatformInstaller> {
    for_os(std::env::consts::OS, config)
}

pub fn for_os(os: &str, config: &Config) -> Box<dyn PlatformInstaller> {
    match os {
        "linux" => Box::new(LinuxInstaller::new(
            config.applications_dir.clone(),
            config.desktop_dir.clone(),
        )),
        "macos" => Box::new(MacInstaller::new(Hdiutil, PathBuf::from(MAC_APPLICATIONS_DIR))),
        other => Box::new(UnsupportedInstaller {
            os: other.to_string(),
        }),
    }
}

pub struct UnsupportedInstaller {
    os: String,
}

impl PlatformInstaller for UnsupportedInstaller {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn install(
        &self,
        artifact: &Path,
        _product: &Product,
        _options: &InstallOptions,
    ) -> Result<InstallReport> {
        warn!(
            "Installation is not supported on {}; {} was downloaded only",
            self.os,
            artifact.display()
        );
        Ok(InstallReport::default())
    }
}

/// Remove whatever is at `path`: a file, a symlink or a whole directory tree.
pub(crate) fn remove_existing(path: &Path) -> Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)?,
        Ok(_) => std::fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(InstallerError::Io(e)),
    }
    Ok(true)
}
