//! CLI definition and handlers

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use jbi::catalog::{Channel, HttpCatalog};
use jbi::config::Config;
use jbi::download::{file_name_from_url, Artifact, DownloadProgress, Downloader, Transport};
use jbi::error::{InstallerError, EXIT_FAILURE};
use jbi::install::{self, InstallOptions, InstallReport};
use jbi::pipeline::{InstallRequest, Pipeline, Selection};
use jbi::product;

static CHECK: Emoji = Emoji("✓ ", "* ");
static CROSS: Emoji = Emoji("✗ ", "x ");
static ARROW: Emoji = Emoji("→ ", "-> ");
static INFO: Emoji = Emoji("ℹ ", "i ");

#[derive(Parser, Debug)]
#[command(name = "jbi")]
#[command(author, version, about = "Download and install JetBrains IDEs")]
#[command(after_help = product::products_help())]
pub struct Cli {
    /// Product name, alias or code (e.g. clion, ideaU, PCP)
    pub product: String,

    /// Platform key from the release catalog (e.g. linux, mac, windows)
    pub platform: Option<String>,

    /// Replace an existing installation
    #[arg(short, long)]
    pub force: bool,

    /// Install after downloading
    #[arg(short, long)]
    pub install: bool,

    /// Create a link with the unversioned product name
    #[arg(short, long)]
    pub link: bool,

    /// Directory to install into [default: /opt]
    #[arg(short, long, value_name = "DIR")]
    pub prefix: Option<PathBuf>,

    /// Directory for downloaded files [default: /tmp]
    #[arg(short, long = "tmpdir", value_name = "DIR")]
    pub tmpdir: Option<PathBuf>,

    /// Release channel [default: release]
    #[arg(short, long, value_enum)]
    pub channel: Option<Channel>,

    /// Add the application to ~/.local/share/applications
    #[arg(short, long)]
    pub app: bool,

    /// Put a launcher on the desktop
    #[arg(short, long)]
    pub desktop: bool,

    /// Release to fetch: build, version, major version or year
    #[arg(short, long, value_name = "SELECTOR")]
    pub release: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the arguments against `config` into a request.
    pub fn into_request(
        self,
        config: &Config,
    ) -> std::result::Result<InstallRequest, InstallerError> {
        let product = product::lookup(&self.product)
            .ok_or_else(|| InstallerError::UnknownProduct(self.product.clone()))?;

        if self.release.as_deref().is_some_and(str::is_empty) {
            return Err(InstallerError::Usage("--release needs a non-empty selector".into()));
        }

        if !self.install && (self.force || self.link || self.app || self.desktop) {
            warn!("--force, --link, --app and --desktop only take effect with --install");
        }

        Ok(InstallRequest {
            product,
            platform: self.platform,
            channel: self.channel.unwrap_or(config.channel),
            selector: self.release,
            tmp_dir: self.tmpdir.unwrap_or_else(|| config.tmp_dir.clone()),
            install: self.install,
            options: InstallOptions {
                prefix: self.prefix.unwrap_or_else(|| config.prefix.clone()),
                force: self.force,
                link: self.link,
                app: self.app,
                desktop: self.desktop,
            },
        })
    }
}

/// Download, and optionally install, the requested product
pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let request = cli.into_request(&config)?;

    println!("{} Downloading {}", ARROW, style(request.product.name).cyan());

    let catalog = HttpCatalog::new(&config)?;
    let downloader = Downloader::from_config(&config)?;
    let installer = install::for_host(&config);
    let pipeline = Pipeline::new(&catalog, &downloader, installer.as_ref());

    let selection = pipeline.select(&request)?;
    let download = &selection.download;
    println!(
        "{} Found {} version {}, file: {} ({} bytes)",
        INFO,
        style(request.product.name).cyan(),
        style(&selection.release.version).green(),
        file_name_from_url(&download.link)?,
        download.size
    );

    let pb = ProgressBar::new(download.size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                 {bytes}/{total_bytes} ({percent}%)",
            )?
            .progress_chars("█▓░"),
    );

    let artifact = fetch_with_progress(&pipeline, &request, &selection, &pb)?;

    if artifact.reused {
        pb.finish_and_clear();
        println!(
            "{} File {} exists and size matches, skipping download",
            CHECK,
            style(artifact.path.display()).dim()
        );
    } else {
        println!("{} Downloaded to {}", CHECK, style(artifact.path.display()).dim());
    }

    if let Some(report) = pipeline.install(&request, &artifact)? {
        print_report(&request, &report);
    }

    Ok(())
}

/// Download behind `pb`, clearing the bar if the download fails.
fn fetch_with_progress<T: Transport>(
    pipeline: &Pipeline<'_, T>,
    request: &InstallRequest,
    selection: &Selection,
    pb: &ProgressBar,
) -> jbi::error::Result<Artifact> {
    pipeline
        .fetch(request, selection, |progress| match progress {
            DownloadProgress::Advanced { downloaded, .. } => pb.set_position(downloaded),
            DownloadProgress::Finished { total } => {
                pb.set_position(total);
                pb.finish();
            }
        })
        .inspect_err(|_| pb.finish_and_clear())
}

fn print_report(request: &InstallRequest, report: &InstallReport) {
    let Some(installed) = &report.installed else {
        println!("{} Installation is not supported on this system", INFO);
        return;
    };

    if report.skipped_extraction {
        println!(
            "{} {} already exists, use {} to replace it",
            INFO,
            style(installed.display()).yellow(),
            style("--force").yellow()
        );
    } else {
        println!(
            "{} Installed {} into {}",
            CHECK,
            style(request.product.name).green(),
            style(installed.display()).cyan()
        );
    }

    if let Some(backup) = &report.backup {
        println!("  Previous version moved to {}", style(backup.display()).dim());
    }
    if let Some(link) = &report.link {
        println!("  Linked {}", style(link.display()).cyan());
    }
    for entry in &report.entries {
        println!("  Created {}", style(entry.display()).dim());
    }
}

/// Print `err` the way its kind calls for and return the exit code.
pub fn report_error(err: &anyhow::Error) -> i32 {
    eprintln!("{} {}", CROSS, style(format!("{err:#}")).red());

    let Some(err) = err.downcast_ref::<InstallerError>() else {
        return EXIT_FAILURE;
    };

    if let Some(platforms) = err.available_platforms() {
        println!("Available platforms:");
        for platform in platforms {
            println!("  {platform}");
        }
    }

    if err.is_usage() {
        println!();
        let _ = Cli::command().print_help();
    }

    err.exit_code()
}
