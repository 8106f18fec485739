//! Freedesktop `.desktop` launcher entries

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::product::Product;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub exec: PathBuf,
    pub icon: PathBuf,
}

impl DesktopEntry {
    /// Entry for `product` installed in (or linked at) `install_dir`.
    pub fn for_product(product: &Product, install_dir: &Path) -> Self {
        let bin = install_dir.join("bin");
        Self {
            name: product.name.to_string(),
            exec: bin.join(format!("{}.sh", product.binname)),
            icon: bin.join(format!("{}.png", product.binname)),
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.desktop", self.name)
    }

    pub fn render(&self) -> String {
        format!(
            "[Desktop Entry]\n\
             Name={name}\n\
             Exec={exec}\n\
             StartupNotify=true\n\
             Terminal=false\n\
             Type=Application\n\
             Categories=Development;IDE;\n\
             Icon={icon}\n",
            name = self.name,
            exec = self.exec.display().to_string().replace(' ', "\\ "),
            icon = self.icon.display(),
        )
    }

    /// Write the entry into `dir`, replacing any entry of the same name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        info!("Creating {}", path.display());
        std::fs::write(&path, self.render())?;
        Ok(path)
    }
}

/// Add the owner execute bit, keeping every other permission bit.
#[cfg(unix)]
pub fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
