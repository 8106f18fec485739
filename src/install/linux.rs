//! Linux installation from `.tar.gz` archives

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info, warn};

use super::{remove_existing, InstallOptions, InstallReport, PlatformInstaller};
use crate::desktop::{mark_executable, DesktopEntry};
use crate::error::{InstallerError, Result};
use crate::product::Product;

pub struct LinuxInstaller {
    applications_dir: PathBuf,
    desktop_dir: PathBuf,
}

impl LinuxInstaller {
    pub fn new(applications_dir: PathBuf, desktop_dir: PathBuf) -> Self {
        Self {
            applications_dir,
            desktop_dir,
        }
    }
}

impl PlatformInstaller for LinuxInstaller {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn install(
        &self,
        artifact: &Path,
        product: &Product,
        options: &InstallOptions,
    ) -> Result<InstallReport> {
        let dir_name = canonical_dir_name(artifact)?;

        std::fs::create_dir_all(&options.prefix)?;
        let full_dir = options.prefix.join(&dir_name);

        let mut report = InstallReport::default();

        if prepare_target(&full_dir, options.force)? {
            info!("Extracting into {}", full_dir.display());
            extract(artifact, &options.prefix)?;
        } else {
            report.skipped_extraction = true;
        }

        let mut entry_dir = full_dir.clone();
        if options.link {
            if let Some(link) = link_install(&options.prefix, &dir_name)? {
                entry_dir = link.clone();
                report.link = Some(link);
            }
        }

        let entry = DesktopEntry::for_product(product, &entry_dir);

        if options.app {
            report.entries.push(entry.write_to(&self.applications_dir)?);
        }

        if options.desktop {
            let path = entry.write_to(&self.desktop_dir)?;
            mark_executable(&path)?;
            report.entries.push(path);
        }

        report.installed = Some(full_dir);
        Ok(report)
    }
}

fn open_archive(path: &Path) -> Result<Archive<GzDecoder<File>>> {
    Ok(Archive::new(GzDecoder::new(File::open(path)?)))
}

fn invalid(path: &Path, reason: impl ToString) -> InstallerError {
    InstallerError::InvalidArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Name of the directory the archive unpacks into, taken from its first entry.
pub fn canonical_dir_name(archive_path: &Path) -> Result<String> {
    let mut archive = open_archive(archive_path)?;
    let mut entries = archive
        .entries()
        .map_err(|e| invalid(archive_path, e))?;

    // Pax extension headers describe the members after them and are not members.
    let first = loop {
        let entry = entries
            .next()
            .ok_or_else(|| invalid(archive_path, "archive has no members"))?
            .map_err(|e| invalid(archive_path, e))?;
        let kind = entry.header().entry_type();
        if kind.is_pax_global_extensions() || kind.is_pax_local_extensions() {
            debug!("Skipping pax header in {}", archive_path.display());
            continue;
        }
        break entry;
    };
    let entry_path = first.path().map_err(|e| invalid(archive_path, e))?;

    top_level_component(&entry_path).ok_or_else(|| {
        invalid(
            archive_path,
            format!("cannot derive a directory from {}", entry_path.display()),
        )
    })
}

/// Pop parents off `path` until only its first component is left.
///
/// `a/b/c/file.txt` gives `a`; `file.txt` gives `file.txt`.
pub fn top_level_component(path: &Path) -> Option<String> {
    let mut dir: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    while let Some(parent) = dir.parent() {
        if parent.as_os_str().is_empty() {
            break;
        }
        dir = parent.to_path_buf();
    }

    dir.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Returns whether extraction should go ahead.
fn prepare_target(full_dir: &Path, force: bool) -> Result<bool> {
    if !full_dir.exists() {
        return Ok(true);
    }

    info!("Target directory {} already exists", full_dir.display());
    if force {
        info!("Deleting {}", full_dir.display());
        remove_existing(full_dir)?;
        Ok(true)
    } else {
        warn!(
            "Keeping existing installation in {}, use --force to replace it",
            full_dir.display()
        );
        Ok(false)
    }
}

fn extract(artifact: &Path, prefix: &Path) -> Result<()> {
    let mut archive = open_archive(artifact)?;
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(prefix)?;
    Ok(())
}

/// Point `prefix/<name before the first '-'>` at `dir_name`.
fn link_install(prefix: &Path, dir_name: &str) -> Result<Option<PathBuf>> {
    let base = dir_name.split('-').next().unwrap_or(dir_name);
    if base == dir_name {
        warn!("{dir_name} has no version suffix, not creating a link");
        return Ok(None);
    }

    let link = prefix.join(base);
    if remove_existing(&link)? {
        info!("Deleted old link {}", link.display());
    }

    info!("Linking {} to {}", dir_name, link.display());

    #[cfg(unix)]
    std::os::unix::fs::symlink(dir_name, &link)?;

    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(dir_name, &link)?;

    Ok(Some(link))
}
