//! airlift - addon bundle builder for airgapped Kubernetes
//!
//! Pulls each catalog image via skopeo into an OCI-layout tar, packages the
//! addon's Helm chart as an OCI blob layout, and wraps the whole tree into
//! `<addon>-addon-bundle-<version>.tar.gz` (plus a `-latest` copy) for
//! transfer into an airgapped cluster.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use airlift_core::bundle::{ensure_image_tool, BuildReport, BundleBuilder};
use airlift_core::catalog::{Addon, Catalogs};
use airlift_core::fetch::{ChartSource, HelmSource, SkopeoSource};
use airlift_core::version::BundleVersion;

mod summary;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "airlift",
    about = "Build addon bundles (images, charts, manifests) for airgapped Kubernetes",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Build one addon bundle, or all of them
    Build {
        /// Addon selector: velero, local-path, openebs, all, or a menu
        /// number (1-4). Omit on a terminal to pick interactively.
        #[clap(env = "AIRLIFT_ADDON")]
        addon: Option<String>,

        /// Directory receiving staging trees and finished archives
        #[clap(long, default_value = ".")]
        output_dir: PathBuf,

        /// YAML catalog file overriding the built-in catalogs
        #[clap(long)]
        catalog_file: Option<PathBuf>,

        /// Keep staging directories after successful archiving
        #[clap(long)]
        keep_staging: bool,
    },
}

fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    // Logs go to stderr; stdout carries the menu and summary
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Build {
            addon,
            output_dir,
            catalog_file,
            keep_staging,
        } => build_command(addon, output_dir, catalog_file, keep_staging).await,
    }
}

async fn build_command(
    addon: Option<String>,
    output_dir: PathBuf,
    catalog_file: Option<PathBuf>,
    keep_staging: bool,
) -> Result<()> {
    let image_source = SkopeoSource::new();

    // Fatal precondition: without the copy tool no bundle can be produced,
    // so bail before creating any directory
    if let Err(e) = ensure_image_tool(&image_source).await {
        error!("Fatal: {e}");
        eprintln!("\nError: {e}");
        std::process::exit(1);
    }

    let helm = HelmSource::new();
    let chart_source: Option<&dyn ChartSource> = if helm.is_available().await {
        Some(&helm)
    } else {
        warn!("helm not found; bundles will be built without charts");
        None
    };

    let selection = resolve_selection(addon.as_deref())?;

    let catalogs = match &catalog_file {
        Some(path) => Catalogs::load_from_path(path)?,
        None => Catalogs::builtin(),
    };

    let version = BundleVersion::resolve()?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let builder = BundleBuilder::new(&output_dir, version.clone(), &image_source, chart_source)
        .keep_staging(keep_staging);

    // One addon at a time; a catastrophic failure in one must still let the
    // next addon build and the summary stay accurate
    let mut outcomes: Vec<(Addon, Result<BuildReport>)> = Vec::new();
    for addon in &selection {
        let outcome = match catalogs.get(*addon) {
            Ok(catalog) => builder
                .build(catalog)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            error!("{} bundle failed: {e:#}", addon);
        }
        outcomes.push((*addon, outcome));
    }

    let leftover = leftover_staging_dirs(&output_dir);
    summary::print_summary(version.as_str(), &outcomes, &leftover);

    // Per-item and per-addon failures are reported, not fatal
    Ok(())
}

/// Staging trees still on disk after the run - retained by archive failures
/// (this run or earlier ones) or by --keep-staging
fn leftover_staging_dirs(output_dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(output_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_dir()
                && e.file_name()
                    .to_string_lossy()
                    .ends_with("-addon-bundle")
        })
        .map(|e| e.into_path())
        .collect()
}

/// Turn the CLI/env selector (or the interactive menu) into a build list
fn resolve_selection(addon: Option<&str>) -> Result<Vec<Addon>> {
    let raw = match addon {
        Some(value) => value.to_string(),
        None => prompt_menu()?,
    };

    parse_selector(raw.trim())
}

fn parse_selector(selector: &str) -> Result<Vec<Addon>> {
    match selector {
        "1" => Ok(vec![Addon::Velero]),
        "2" => Ok(vec![Addon::LocalPath]),
        "3" => Ok(vec![Addon::Openebs]),
        "4" | "all" => Ok(Vec::from(Addon::ALL)),
        other => {
            let addon: Addon = other.parse().map_err(anyhow::Error::msg)?;
            Ok(vec![addon])
        }
    }
}

/// Numeric menu shown when no selector was given on an interactive terminal
fn prompt_menu() -> Result<String> {
    if !std::io::stdin().is_terminal() {
        anyhow::bail!(
            "No addon selected. Pass one of velero, local-path, openebs, all \
             (or set AIRLIFT_ADDON) for non-interactive use."
        );
    }

    println!("Select addon bundle to build:");
    for (i, addon) in Addon::ALL.iter().enumerate() {
        println!("  {}) {}", i + 1, addon.display_name());
    }
    println!("  4) All");
    print!("> ");
    use std::io::Write;
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read menu selection")?;

    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector_numbers() {
        assert_eq!(parse_selector("1").unwrap(), vec![Addon::Velero]);
        assert_eq!(parse_selector("2").unwrap(), vec![Addon::LocalPath]);
        assert_eq!(parse_selector("3").unwrap(), vec![Addon::Openebs]);
        assert_eq!(parse_selector("4").unwrap().len(), 3);
    }

    #[test]
    fn test_parse_selector_names() {
        assert_eq!(parse_selector("velero").unwrap(), vec![Addon::Velero]);
        assert_eq!(parse_selector("all").unwrap().len(), 3);
    }

    #[test]
    fn test_parse_selector_rejects_unknown() {
        assert!(parse_selector("5").is_err());
        assert!(parse_selector("nothing").is_err());
    }
}
