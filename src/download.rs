//! Download management with progress reporting
//!
//! Artifacts are cached as `tmp_dir/<basename of the link>`. A cached file is
//! reused when its size equals the size announced by the catalog. That is the
//! only freshness check: there is no checksum, so a same-sized corrupt file
//! would be trusted.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::catalog::DownloadInfo;
use crate::config::Config;
use crate::error::{InstallerError, Result};

/// A progress event is emitted on the first transport callback and on every
/// `PROGRESS_EVERY`th one after it.
pub const PROGRESS_EVERY: u64 = 100;

const BLOCK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadProgress {
    Advanced { downloaded: u64, total: u64 },
    Finished { total: u64 },
}

impl DownloadProgress {
    pub fn percent(&self) -> f64 {
        match *self {
            Self::Advanced { downloaded, total } if total > 0 => {
                100.0 * downloaded as f64 / total as f64
            }
            Self::Advanced { .. } => 0.0,
            Self::Finished { .. } => 100.0,
        }
    }
}

/// Moves the bytes behind a URL into a writer.
pub trait Transport {
    /// Stream `url` into `sink`, calling `on_block` with the cumulative byte
    /// count after every block written. Returns the total bytes written.
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        on_block: &mut dyn FnMut(u64),
    ) -> Result<u64>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        // Artifacts are hundreds of megabytes: bound the connect, not the transfer.
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("jbi/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| InstallerError::DownloadFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        url: &str,
        sink: &mut dyn Write,
        on_block: &mut dyn FnMut(u64),
    ) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| InstallerError::DownloadFailed(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::DownloadFailed(format!(
                "{url} returned {status}"
            )));
        }

        let mut downloaded: u64 = 0;
        let mut buffer = [0u8; BLOCK_SIZE];

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| InstallerError::DownloadFailed(format!("{url}: {e}")))?;
            if bytes_read == 0 {
                break;
            }

            sink.write_all(&buffer[..bytes_read])?;
            downloaded += bytes_read as u64;
            on_block(downloaded);
        }

        Ok(downloaded)
    }
}

/// A downloaded file in the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    /// The cached copy was reused without fetching.
    pub reused: bool,
}

pub struct Downloader<T = HttpTransport> {
    transport: T,
}

impl Downloader<HttpTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?))
    }
}

impl<T: Transport> Downloader<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn download<F>(
        &self,
        download: &DownloadInfo,
        tmp_dir: &Path,
        mut progress_callback: F,
    ) -> Result<Artifact>
    where
        F: FnMut(DownloadProgress),
    {
        let path = tmp_dir.join(file_name_from_url(&download.link)?);
        std::fs::create_dir_all(tmp_dir)?;

        if is_cached(&path, download.size)? {
            info!(
                "File {} exists and size matches, skipping download",
                path.display()
            );
            return Ok(Artifact { path, reused: true });
        }

        info!("Downloading from {} to {}", download.link, path.display());

        let total = download.size;
        let mut ticks: u64 = 0;
        let mut on_block = |downloaded: u64| {
            ticks += 1;
            if ticks % PROGRESS_EVERY == 1 {
                progress_callback(DownloadProgress::Advanced { downloaded, total });
            }
        };

        let mut file = BufWriter::new(File::create(&path)?);
        let written = self
            .transport
            .fetch(&download.link, &mut file, &mut on_block)?;
        file.flush()?;

        if written != total {
            warn!("Expected {total} bytes but received {written}");
        }
        progress_callback(DownloadProgress::Finished { total });

        Ok(Artifact {
            path,
            reused: false,
        })
    }
}

fn is_cached(path: &Path, expected: u64) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => {
            if meta.len() == expected {
                Ok(true)
            } else {
                info!(
                    "File exists, but the size differs ({} vs {expected}), downloading again",
                    meta.len()
                );
                Ok(false)
            }
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Last path segment of `link`, ignoring any query string.
pub fn file_name_from_url(link: &str) -> Result<String> {
    let name = match Url::parse(link) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string)),
        Err(e) => {
            debug!("Not an absolute URL ({e}), using raw basename of {link}");
            link.split(['?', '#'])
                .next()
                .and_then(|path| path.rsplit('/').next())
                .map(str::to_string)
        }
    };

    name.filter(|n| !n.is_empty() && n != "." && n != "..")
        .ok_or_else(|| {
            InstallerError::DownloadFailed(format!("cannot derive a file name from {link}"))
        })
}
