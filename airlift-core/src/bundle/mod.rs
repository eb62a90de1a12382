//! Bundle building - staging, fetching, and archive assembly
//!
//! One `BundleBuilder::build` call produces one addon bundle:
//!
//! ```text
//! <addon>-addon-bundle/            staging tree (removed on success)
//!     VERSION                      written before any fetch
//!     images/<artifact>.tar        one OCI layout per image
//!     charts/<chart>-<ver>.tar     chart as a single-blob OCI layout (dots -> underscores)
//!     manifests/<addon>.yaml       static manifests (chartless addons)
//! <addon>-addon-bundle-<ver>.tar.gz
//! <addon>-addon-bundle-latest.tar.gz
//! ```
//!
//! Failures follow the continue-on-error policy: a single image failure is
//! recorded and the loop moves on; a chart failure skips chart packaging;
//! only an archive failure retains the staging tree for inspection.

mod meta;
mod report;

pub use meta::BundleMeta;
pub use report::BuildReport;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::archive;
use crate::catalog::AddonCatalog;
use crate::error::BundleError;
use crate::fetch::{ChartSource, ImageSource};
use crate::manifest;
use crate::oci;
use crate::version::BundleVersion;

/// Abort the run unless the image-copy tool answers its probe. Nothing can
/// be built without it, so this runs before any directory is created.
pub async fn ensure_image_tool(source: &dyn ImageSource) -> Result<(), BundleError> {
    if source.is_available().await {
        return Ok(());
    }
    Err(BundleError::ToolMissing {
        tool: source.tool_name(),
        hint: "https://github.com/containers/skopeo/blob/main/install.md".to_string(),
    })
}

/// Builds addon bundles under one output root, strictly sequentially.
pub struct BundleBuilder<'a> {
    output_root: PathBuf,
    version: BundleVersion,
    keep_staging: bool,
    image_source: &'a dyn ImageSource,
    chart_source: Option<&'a dyn ChartSource>,
}

impl<'a> BundleBuilder<'a> {
    pub fn new(
        output_root: &Path,
        version: BundleVersion,
        image_source: &'a dyn ImageSource,
        chart_source: Option<&'a dyn ChartSource>,
    ) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            version,
            keep_staging: false,
            image_source,
            chart_source,
        }
    }

    /// Retain the staging tree even after a successful archive
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = keep;
        self
    }

    /// Build one addon bundle. Per-item and per-feature failures land in the
    /// report; `Err` is reserved for staging setup failures that prevent the
    /// build from starting at all.
    pub async fn build(&self, catalog: &AddonCatalog) -> Result<BuildReport, BundleError> {
        let addon = catalog.addon;
        let mut report = BuildReport::new(addon, catalog.images.len());

        info!("Building {} addon bundle", addon.display_name());

        let staging = self.prepare_staging(catalog)?;

        self.fetch_images(catalog, &staging, &mut report).await;
        self.fetch_chart(catalog, &staging, &mut report).await;

        match manifest::emit_manifests(addon, &staging.join("manifests")) {
            Ok(true) => info!("Wrote static manifests for {addon}"),
            Ok(false) => {}
            Err(e) => error!("Failed to write manifests for {addon}: {e:#}"),
        }

        match self.assemble(addon.slug(), &staging) {
            Ok(archives) => {
                report.archives = archives;
                if self.keep_staging {
                    info!("Keeping staging directory: {}", staging.display());
                } else if let Err(e) = std::fs::remove_dir_all(&staging) {
                    warn!("Failed to remove staging directory {}: {e}", staging.display());
                }
            }
            Err(e) => {
                // Terminal but local: keep the tree so the operator can
                // inspect or retry, and let the orchestrator move on
                error!("{e}");
                report.staging_retained = Some(staging);
            }
        }

        info!(
            "{}: {}/{} images, chart={}, archives={}",
            addon,
            report.succeeded,
            report.total,
            report.chart_included,
            report.archives.len()
        );

        Ok(report)
    }

    /// Remove any prior staging tree and create a fresh one
    fn prepare_staging(&self, catalog: &AddonCatalog) -> Result<PathBuf, BundleError> {
        let staging = self
            .output_root
            .join(format!("{}-addon-bundle", catalog.addon.slug()));

        let result = (|| -> std::io::Result<()> {
            if staging.exists() {
                std::fs::remove_dir_all(&staging)?;
            }
            for sub in ["images", "charts", "manifests"] {
                std::fs::create_dir_all(staging.join(sub))?;
            }
            Ok(())
        })();

        result.map_err(|source| BundleError::StagingSetup {
            path: staging.clone(),
            source,
        })?;

        let meta = BundleMeta::new(
            self.version.as_str(),
            &format!("{}-addon", catalog.addon.slug()),
            catalog.component_versions.clone(),
        );
        meta.write_to_dir(&staging)
            .map_err(|e| BundleError::StagingSetup {
                path: staging.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;

        Ok(staging)
    }

    /// Pull each image into a temp OCI layout and wrap it as
    /// `images/<artifact>.tar`. Failures are recorded and never abort the loop.
    async fn fetch_images(
        &self,
        catalog: &AddonCatalog,
        staging: &Path,
        report: &mut BuildReport,
    ) {
        let images_dir = staging.join("images");

        for entry in &catalog.images {
            let outcome = self.fetch_one_image(&entry.source_ref, &entry.artifact_name, &images_dir);
            match outcome.await {
                Ok(()) => {
                    info!("Packaged image {}", entry.source_ref);
                    report.succeeded += 1;
                }
                Err(e) => {
                    error!("Failed to package {}: {e:#}", entry.source_ref);
                    report.failed.push(entry.source_ref.clone());
                }
            }
        }
    }

    async fn fetch_one_image(
        &self,
        source_ref: &str,
        artifact_name: &str,
        images_dir: &Path,
    ) -> Result<()> {
        // Temp layout dir is dropped (and deleted) on success and failure alike
        let temp_dir = tempfile::Builder::new()
            .prefix("airlift-image-")
            .tempdir_in(&self.output_root)
            .context("Failed to create image staging tempdir")?;

        self.image_source
            .copy_to_oci(source_ref, temp_dir.path())
            .await?;

        oci::validate_layout(temp_dir.path())
            .with_context(|| format!("Copy tool produced an invalid layout for {source_ref}"))?;

        let dest_tar = images_dir.join(format!("{artifact_name}.tar"));
        archive::tar_dir(temp_dir.path(), &dest_tar)?;

        Ok(())
    }

    /// Fetch and convert the catalog's chart, if any. Any failure here is
    /// per-feature: log, skip chart packaging, keep building.
    async fn fetch_chart(&self, catalog: &AddonCatalog, staging: &Path, report: &mut BuildReport) {
        let Some(chart) = &catalog.chart else {
            return;
        };

        let Some(chart_source) = self.chart_source else {
            warn!(
                "Chart tool unavailable; {} bundle will not include the {} chart",
                catalog.addon, chart.chart_name
            );
            return;
        };

        let dest_tar = staging
            .join("charts")
            .join(format!("{}.tar", chart.artifact_stem()));

        match self.fetch_chart_inner(chart_source, chart, &dest_tar).await {
            Ok(()) => {
                info!("Packaged chart {} {}", chart.chart_name, chart.version);
                report.chart_included = true;
            }
            Err(e) => {
                error!(
                    "Failed to package chart {} {}: {e:#}; continuing without it",
                    chart.chart_name, chart.version
                );
            }
        }
    }

    async fn fetch_chart_inner(
        &self,
        chart_source: &dyn ChartSource,
        chart: &crate::catalog::ChartEntry,
        dest_tar: &Path,
    ) -> Result<()> {
        chart_source
            .ensure_repo(&chart.repo_name, &chart.repo_url)
            .await?;

        let download_dir = tempfile::Builder::new()
            .prefix("airlift-chart-")
            .tempdir_in(&self.output_root)
            .context("Failed to create chart download tempdir")?;

        let package_path = chart_source
            .fetch_chart(
                &chart.repo_name,
                &chart.chart_name,
                &chart.version,
                download_dir.path(),
            )
            .await?;

        let package = std::fs::read(&package_path)
            .with_context(|| format!("Failed to read chart package: {}", package_path.display()))?;

        let layout_dir = tempfile::Builder::new()
            .prefix("airlift-chart-oci-")
            .tempdir_in(&self.output_root)
            .context("Failed to create chart layout tempdir")?;

        oci::write_chart_layout(&package, layout_dir.path())?;
        archive::tar_dir(layout_dir.path(), dest_tar)?;

        Ok(())
    }

    /// Produce the versioned archive plus its `-latest` physical copy
    fn assemble(&self, slug: &str, staging: &Path) -> Result<Vec<PathBuf>, BundleError> {
        let versioned = self
            .output_root
            .join(format!("{slug}-addon-bundle-{}.tar.gz", self.version));

        archive::tar_gz_dir(staging, &versioned).map_err(|reason| BundleError::ArchiveFailed {
            path: versioned.clone(),
            reason,
        })?;

        let mut archives = vec![versioned.clone()];

        // A real copy, not a symlink: the bundle may land on filesystems and
        // transfer tools that mishandle links
        let latest = self
            .output_root
            .join(format!("{slug}-addon-bundle-latest.tar.gz"));
        match std::fs::copy(&versioned, &latest) {
            Ok(_) => archives.push(latest),
            Err(e) => error!("Failed to copy {} to latest: {e}", versioned.display()),
        }

        Ok(archives)
    }
}
