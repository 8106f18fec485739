//! One download-and-install run

use std::path::PathBuf;

use tracing::info;

use crate::catalog::{Channel, DownloadInfo, ReleaseCatalog, ReleaseRecord};
use crate::download::{Artifact, DownloadProgress, Downloader, Transport};
use crate::error::Result;
use crate::install::{InstallOptions, InstallReport, PlatformInstaller};
use crate::product::Product;
use crate::resolve::resolve;

/// Everything a run needs, fixed before any work starts.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub product: &'static Product,
    pub platform: Option<String>,
    pub channel: Channel,
    pub selector: Option<String>,
    pub tmp_dir: PathBuf,
    pub install: bool,
    pub options: InstallOptions,
}

/// The release chosen for a request and its artifact for the platform.
#[derive(Debug, Clone)]
pub struct Selection {
    pub release: ReleaseRecord,
    pub download: DownloadInfo,
}

#[derive(Debug)]
pub struct Outcome {
    pub selection: Selection,
    pub artifact: Artifact,
    pub report: Option<InstallReport>,
}

pub struct Pipeline<'a, T: Transport> {
    catalog: &'a dyn ReleaseCatalog,
    downloader: &'a Downloader<T>,
    installer: &'a dyn PlatformInstaller,
}

impl<'a, T: Transport> Pipeline<'a, T> {
    pub fn new(
        catalog: &'a dyn ReleaseCatalog,
        downloader: &'a Downloader<T>,
        installer: &'a dyn PlatformInstaller,
    ) -> Self {
        Self {
            catalog,
            downloader,
            installer,
        }
    }

    pub fn select(&self, request: &InstallRequest) -> Result<Selection> {
        let code = request.product.code;
        let selector = request.selector.as_deref();

        // A specific release needs the whole history to search.
        let records = self
            .catalog
            .fetch_releases(code, request.channel, selector.is_some())?;
        info!("Catalog returned {} {} release(s) for {code}", records.len(), request.channel);

        let release = resolve(records, selector, request.channel, code)?;
        let download = release.download_for(request.platform.as_deref())?.clone();

        info!(
            "Selected {} {} (build {})",
            request.product.name, release.version, release.build
        );
        Ok(Selection { release, download })
    }

    pub fn fetch<F>(
        &self,
        request: &InstallRequest,
        selection: &Selection,
        progress: F,
    ) -> Result<Artifact>
    where
        F: FnMut(DownloadProgress),
    {
        self.downloader
            .download(&selection.download, &request.tmp_dir, progress)
    }

    /// Install `artifact` when the request asks for it.
    pub fn install(
        &self,
        request: &InstallRequest,
        artifact: &Artifact,
    ) -> Result<Option<InstallReport>> {
        if !request.install {
            return Ok(None);
        }

        info!("Installing with the {} installer", self.installer.name());
        self.installer
            .install(&artifact.path, request.product, &request.options)
            .map(Some)
    }

    pub fn run<F>(&self, request: &InstallRequest, progress: F) -> Result<Outcome>
    where
        F: FnMut(DownloadProgress),
    {
        let selection = self.select(request)?;
        let artifact = self.fetch(request, &selection, progress)?;
        let report = self.install(request, &artifact)?;

        Ok(Outcome {
            selection,
            artifact,
            report,
        })
    }
}
