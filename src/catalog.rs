//! Release catalog client
//!
//! Queries the JetBrains product release service for one product code and
//! channel. With `latest=true` the service answers with only the newest
//! release; with `latest=false` it returns the full history, newest first.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{InstallerError, Result};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Release track queried from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Release,
    Rc,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Rc => "rc",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadInfo {
    pub link: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub build: String,
    #[serde(
        default,
        rename = "majorVersion",
        deserialize_with = "null_as_empty"
    )]
    pub major_version: String,
    #[serde(default)]
    pub downloads: BTreeMap<String, DownloadInfo>,
}

impl ReleaseRecord {
    /// First dot-segment of the major version, e.g. "2019" for "2019.3".
    pub fn year(&self) -> &str {
        self.major_version
            .split('.')
            .next()
            .unwrap_or(&self.major_version)
    }

    pub fn platforms(&self) -> Vec<String> {
        self.downloads.keys().cloned().collect()
    }

    /// Download for `platform`, or the matching platform error.
    pub fn download_for(&self, platform: Option<&str>) -> Result<&DownloadInfo> {
        let Some(platform) = platform else {
            return Err(InstallerError::MissingPlatform {
                available: self.platforms(),
            });
        };

        self.downloads
            .get(platform)
            .ok_or_else(|| InstallerError::UnknownPlatform {
                platform: platform.to_string(),
                available: self.platforms(),
            })
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Source of release records for a product.
pub trait ReleaseCatalog {
    fn fetch_releases(
        &self,
        code: &str,
        channel: Channel,
        all_versions: bool,
    ) -> Result<Vec<ReleaseRecord>>;
}

pub struct HttpCatalog {
    client: reqwest::blocking::Client,
    base_url: String,
    retries: u32,
}

impl HttpCatalog {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("jbi/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InstallerError::CatalogUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.catalog_url.clone(),
            retries: config.catalog_retries,
        })
    }

    fn get_with_retry(&self, url: &Url) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.client.get(url.clone()).send() {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(InstallerError::CatalogUnavailable(format!(
                            "{url} returned {status}"
                        )));
                    }
                    return response
                        .text()
                        .map_err(|e| InstallerError::CatalogUnavailable(e.to_string()));
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!("Catalog request failed ({e}), retry {attempt}/{}", self.retries);
                    std::thread::sleep(RETRY_DELAY * attempt);
                }
                Err(e) => return Err(InstallerError::CatalogUnavailable(e.to_string())),
            }
        }
    }
}

impl ReleaseCatalog for HttpCatalog {
    fn fetch_releases(
        &self,
        code: &str,
        channel: Channel,
        all_versions: bool,
    ) -> Result<Vec<ReleaseRecord>> {
        let url = query_url(&self.base_url, code, channel, all_versions)?;
        debug!("Querying release catalog: {url}");

        let body = self.get_with_retry(&url)?;
        parse_catalog(code, &body)
    }
}

pub fn query_url(base_url: &str, code: &str, channel: Channel, all_versions: bool) -> Result<Url> {
    let latest = if all_versions { "false" } else { "true" };
    Url::parse_with_params(
        base_url,
        &[("code", code), ("latest", latest), ("type", channel.as_str())],
    )
    .map_err(|e| InstallerError::CatalogUnavailable(format!("invalid catalog url {base_url}: {e}")))
}

/// Extract the ordered release list for `code` from a catalog response.
pub fn parse_catalog(code: &str, body: &str) -> Result<Vec<ReleaseRecord>> {
    let mut response: HashMap<String, Vec<ReleaseRecord>> = serde_json::from_str(body)
        .map_err(|e| InstallerError::CatalogUnavailable(format!("malformed response: {e}")))?;

    Ok(response.remove(code).unwrap_or_default())
}
