//! macOS installation from `.dmg` disk images
//!
//! The image is attached read-only, its single `.app` bundle is copied into
//! the applications directory and the image is detached again. Detaching is
//! tied to a guard so it also happens when any step in between fails.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{remove_existing, InstallOptions, InstallReport, PlatformInstaller};
use crate::error::{InstallerError, Result};
use crate::product::Product;

pub const MAC_APPLICATIONS_DIR: &str = "/Applications";

/// Attaches and detaches disk images.
pub trait DiskImageTool {
    /// Mount `image` read-only and return its mount point.
    fn attach(&self, image: &Path) -> Result<PathBuf>;

    fn detach(&self, mount_point: &Path) -> Result<()>;
}

/// `hdiutil`, the disk image tool shipped with macOS.
pub struct Hdiutil;

impl Hdiutil {
    fn run(args: &[&OsStr]) -> Result<String> {
        debug!("Running hdiutil {:?}", args);
        let output = Command::new("hdiutil").args(args).output()?;

        if !output.status.success() {
            return Err(InstallerError::DiskImage(format!(
                "hdiutil {} failed: {}",
                args.first().map(|a| a.to_string_lossy()).unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DiskImageTool for Hdiutil {
    fn attach(&self, image: &Path) -> Result<PathBuf> {
        let stdout = Self::run(&[
            OsStr::new("attach"),
            OsStr::new("-nobrowse"),
            OsStr::new("-readonly"),
            image.as_os_str(),
        ])?;

        parse_mount_point(&stdout).ok_or_else(|| {
            InstallerError::DiskImage(format!(
                "could not find a mount point in hdiutil output: {}",
                stdout.trim()
            ))
        })
    }

    fn detach(&self, mount_point: &Path) -> Result<()> {
        Self::run(&[OsStr::new("detach"), mount_point.as_os_str()]).map(|_| ())
    }
}

/// Mount point from `hdiutil attach` output: third field of the last line.
///
/// hdiutil separates fields with tabs, so volume names may contain spaces.
pub fn parse_mount_point(output: &str) -> Option<PathBuf> {
    let line = output.lines().rev().find(|l| !l.trim().is_empty())?;

    let field = if line.contains('\t') {
        line.split('\t').nth(2).map(str::trim)
    } else {
        line.split_whitespace().nth(2)
    };

    field.filter(|f| !f.is_empty()).map(PathBuf::from)
}

struct MountGuard<'a, D: DiskImageTool> {
    tool: &'a D,
    mount_point: PathBuf,
}

impl<D: DiskImageTool> Drop for MountGuard<'_, D> {
    fn drop(&mut self) {
        info!("Unmounting {}", self.mount_point.display());
        if let Err(e) = self.tool.detach(&self.mount_point) {
            warn!("Failed to unmount {}: {e}", self.mount_point.display());
        }
    }
}

pub struct MacInstaller<D: DiskImageTool = Hdiutil> {
    tool: D,
    applications_dir: PathBuf,
}

impl<D: DiskImageTool> MacInstaller<D> {
    pub fn new(tool: D, applications_dir: PathBuf) -> Self {
        Self {
            tool,
            applications_dir,
        }
    }
}

impl<D: DiskImageTool> PlatformInstaller for MacInstaller<D> {
    fn name(&self) -> &'static str {
        "macos"
    }

    fn install(
        &self,
        artifact: &Path,
        _product: &Product,
        _options: &InstallOptions,
    ) -> Result<InstallReport> {
        let mount_point = self.tool.attach(artifact)?;
        info!("Mounted {} at {}", artifact.display(), mount_point.display());
        let guard = MountGuard {
            tool: &self.tool,
            mount_point,
        };

        let bundle = find_bundle(&guard.mount_point)?;
        let target = match bundle.file_name() {
            Some(name) => self.applications_dir.join(name),
            None => return Err(InstallerError::NoBundleFound(guard.mount_point.clone())),
        };

        let backup = backup_existing(&target)?;

        info!("Copying {} to {}", bundle.display(), target.display());
        copy_tree(&bundle, &target)?;

        verify_installed(&target)?;
        drop(guard);

        Ok(InstallReport {
            installed: Some(target),
            backup,
            ..Default::default()
        })
    }
}

fn find_bundle(mount_point: &Path) -> Result<PathBuf> {
    let mut bundles = Vec::new();
    for entry in std::fs::read_dir(mount_point)? {
        let path = entry?.path();
        let is_app = path.extension().is_some_and(|ext| ext == "app");
        if is_app && path.is_dir() {
            bundles.push(path);
        }
    }

    match bundles.len() {
        0 => Err(InstallerError::NoBundleFound(mount_point.to_path_buf())),
        1 => Ok(bundles.remove(0)),
        found => Err(InstallerError::AmbiguousBundle {
            mount_point: mount_point.to_path_buf(),
            found,
        }),
    }
}

/// Move an installed bundle to `<target>.old`, replacing any older backup.
fn backup_existing(target: &Path) -> Result<Option<PathBuf>> {
    if std::fs::symlink_metadata(target).is_err() {
        return Ok(None);
    }

    let mut backup = target.as_os_str().to_owned();
    backup.push(".old");
    let backup = PathBuf::from(backup);

    if std::fs::symlink_metadata(&backup).is_ok() {
        warn!("Removing previous backup {}", backup.display());
        remove_existing(&backup)?;
    }

    info!("Moving {} to {}", target.display(), backup.display());
    std::fs::rename(target, &backup)?;
    Ok(Some(backup))
}

fn verify_installed(target: &Path) -> Result<()> {
    if std::fs::symlink_metadata(target).is_err() {
        return Err(InstallerError::InstallVerificationFailed(target.to_path_buf()));
    }
    Ok(())
}

/// Recursive copy that keeps symlinks as links and preserves permissions.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    // Directory modes are applied last so read-only sources can be filled.
    let mut dir_perms = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| InstallerError::DiskImage(e.to_string()))?;
        let dest = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest)?;
            let perms = entry.metadata().map_err(std::io::Error::from)?.permissions();
            dir_perms.push((dest, perms));
        } else if file_type.is_symlink() {
            let link_target = std::fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &dest)?;
            #[cfg(not(unix))]
            std::fs::copy(entry.path(), &dest).map(|_| ())?;
            debug!("Linked {} -> {}", dest.display(), link_target.display());
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }

    for (dir, perms) in dir_perms.into_iter().rev() {
        std::fs::set_permissions(dir, perms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product;
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct FakeTool {
        mount_point: PathBuf,
        detached: RefCell<Vec<PathBuf>>,
        detach_fails: bool,
    }

    impl DiskImageTool for &FakeTool {
        fn attach(&self, _image: &Path) -> Result<PathBuf> {
            Ok(self.mount_point.clone())
        }

        fn detach(&self, mount_point: &Path) -> Result<()> {
            self.detached.borrow_mut().push(mount_point.to_path_buf());
            if self.detach_fails {
                return Err(InstallerError::DiskImage("resource busy".into()));
            }
            Ok(())
        }
    }

    struct Fixture {
        temp_dir: TempDir,
        tool: FakeTool,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let mount_point = temp_dir.path().join("Volumes/CLion");
            std::fs::create_dir_all(&mount_point).unwrap();
            Self {
                temp_dir,
                tool: FakeTool {
                    mount_point,
                    detached: RefCell::new(Vec::new()),
                    detach_fails: false,
                },
            }
        }

        fn add_bundle(&self, name: &str, marker: &str) {
            let contents = self.tool.mount_point.join(name).join("Contents");
            std::fs::create_dir_all(contents.join("MacOS")).unwrap();
            std::fs::write(contents.join("Info.plist"), marker).unwrap();
        }

        fn applications(&self) -> PathBuf {
            self.temp_dir.path().join("Applications")
        }

        fn install(&self) -> Result<InstallReport> {
            std::fs::create_dir_all(self.applications()).unwrap();
            let installer = MacInstaller::new(&self.tool, self.applications());
            let options = InstallOptions {
                prefix: PathBuf::from("/unused"),
                force: false,
                link: false,
                app: false,
                desktop: false,
            };
            installer.install(
                Path::new("CLion-2023.1.dmg"),
                product::lookup("clion").unwrap(),
                &options,
            )
        }

        fn detach_count(&self) -> usize {
            self.tool.detached.borrow().len()
        }
    }

    #[test]
    fn test_parse_mount_point() {
        let output = "/dev/disk4          \tGUID_partition_scheme          \t\n\
                      /dev/disk4s1        \tApple_HFS                      \t/Volumes/CLion\n";
        assert_eq!(parse_mount_point(output).unwrap(), PathBuf::from("/Volumes/CLion"));
    }

    #[test]
    fn test_parse_mount_point_with_spaces() {
        let output = "/dev/disk5s1\tApple_HFS\t/Volumes/IntelliJ IDEA\n\n";
        assert_eq!(
            parse_mount_point(output).unwrap(),
            PathBuf::from("/Volumes/IntelliJ IDEA")
        );
    }

    #[test]
    fn test_parse_mount_point_whitespace_fallback() {
        assert_eq!(
            parse_mount_point("/dev/disk2s1 Apple_HFS /Volumes/WebStorm").unwrap(),
            PathBuf::from("/Volumes/WebStorm")
        );
        assert!(parse_mount_point("/dev/disk2 GUID_partition_scheme").is_none());
        assert!(parse_mount_point("").is_none());
    }

    #[test]
    fn test_install_copies_bundle_and_unmounts() {
        let fixture = Fixture::new();
        fixture.add_bundle("CLion.app", "new");
        std::fs::create_dir_all(fixture.tool.mount_point.join(".background")).unwrap();

        let report = fixture.install().unwrap();

        let target = fixture.applications().join("CLion.app");
        assert_eq!(report.installed, Some(target.clone()));
        assert!(report.backup.is_none());
        assert_eq!(
            std::fs::read_to_string(target.join("Contents/Info.plist")).unwrap(),
            "new"
        );
        assert_eq!(fixture.detach_count(), 1);
        assert_eq!(fixture.tool.detached.borrow()[0], fixture.tool.mount_point);
    }

    #[test]
    fn test_existing_bundle_is_backed_up() {
        let fixture = Fixture::new();
        fixture.add_bundle("CLion.app", "new");

        let target = fixture.applications().join("CLion.app");
        std::fs::create_dir_all(target.join("Contents")).unwrap();
        std::fs::write(target.join("Contents/Info.plist"), "current").unwrap();
        let stale = fixture.applications().join("CLion.app.old");
        std::fs::create_dir_all(stale.join("Contents")).unwrap();
        std::fs::write(stale.join("Contents/Info.plist"), "stale").unwrap();

        let report = fixture.install().unwrap();

        assert_eq!(report.backup, Some(stale.clone()));
        assert_eq!(
            std::fs::read_to_string(stale.join("Contents/Info.plist")).unwrap(),
            "current"
        );
        assert_eq!(
            std::fs::read_to_string(target.join("Contents/Info.plist")).unwrap(),
            "new"
        );
        assert_eq!(fixture.detach_count(), 1);
    }

    #[test]
    fn test_no_bundle_still_unmounts() {
        let fixture = Fixture::new();

        let err = fixture.install().unwrap_err();
        assert!(matches!(err, InstallerError::NoBundleFound(_)));
        assert_eq!(fixture.detach_count(), 1);
    }

    #[test]
    fn test_ambiguous_bundle_still_unmounts() {
        let fixture = Fixture::new();
        fixture.add_bundle("CLion.app", "a");
        fixture.add_bundle("CLion Nova.app", "b");

        match fixture.install().unwrap_err() {
            InstallerError::AmbiguousBundle { found, .. } => assert_eq!(found, 2),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(fixture.detach_count(), 1);
        assert!(!fixture.applications().join("CLion.app").exists());
    }

    #[test]
    fn test_failed_detach_keeps_install_result() {
        let mut fixture = Fixture::new();
        fixture.tool.detach_fails = true;
        fixture.add_bundle("CLion.app", "new");

        let report = fixture.install().unwrap();
        assert_eq!(
            report.installed,
            Some(fixture.applications().join("CLion.app"))
        );
        assert_eq!(fixture.detach_count(), 1);
    }

    #[test]
    fn test_failed_detach_keeps_original_error() {
        let mut fixture = Fixture::new();
        fixture.tool.detach_fails = true;

        let err = fixture.install().unwrap_err();
        assert!(matches!(err, InstallerError::NoBundleFound(_)));
        assert_eq!(fixture.detach_count(), 1);
    }

    #[test]
    fn test_verify_installed() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("CLion.app");

        match verify_installed(&target) {
            Err(InstallerError::InstallVerificationFailed(path)) => assert_eq!(path, target),
            other => panic!("unexpected: {other:?}"),
        }

        std::fs::create_dir_all(&target).unwrap();
        assert!(verify_installed(&target).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_keeps_symlinks() {
        let fixture = Fixture::new();
        fixture.add_bundle("CLion.app", "new");
        let frameworks = fixture.tool.mount_point.join("CLion.app/Contents/Frameworks");
        std::fs::create_dir_all(frameworks.join("Versions/A")).unwrap();
        std::os::unix::fs::symlink("Versions/A", frameworks.join("Current")).unwrap();

        fixture.install().unwrap();

        let copied = fixture
            .applications()
            .join("CLion.app/Contents/Frameworks/Current");
        assert_eq!(std::fs::read_link(copied).unwrap(), PathBuf::from("Versions/A"));
    }
}
