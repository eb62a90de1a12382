//! Chart fetch via helm
//!
//! Registers the chart repository (idempotently, with `--force-update`),
//! refreshes it, and pulls the packaged chart at a pinned version. The
//! binary can be replaced through the `AIRLIFT_HELM` environment variable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{ChartSource, FetchError, ToolCommand};

/// Environment variable overriding the helm invocation
pub const HELM_ENV: &str = "AIRLIFT_HELM";

/// `helm`-backed chart source
pub struct HelmSource {
    tool: ToolCommand,
}

impl HelmSource {
    pub fn new() -> Self {
        Self {
            tool: ToolCommand::from_env(HELM_ENV, "helm"),
        }
    }
}

impl Default for HelmSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChartSource for HelmSource {
    async fn is_available(&self) -> bool {
        self.tool.probe(&["version", "--short"]).await
    }

    async fn ensure_repo(&self, repo_name: &str, repo_url: &str) -> Result<(), FetchError> {
        // --force-update makes re-registration a no-op rather than an error
        self.tool
            .run(&["repo", "add", repo_name, repo_url, "--force-update"])
            .await?;
        self.tool.run(&["repo", "update", repo_name]).await?;
        Ok(())
    }

    async fn fetch_chart(
        &self,
        repo_name: &str,
        chart_name: &str,
        version: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let chart_ref = format!("{repo_name}/{chart_name}");
        let dest = dest_dir.display().to_string();

        info!("Pulling chart {chart_ref} version {version}");
        self.tool
            .run(&["pull", &chart_ref, "--version", version, "--destination", &dest])
            .await?;

        // helm names the package <chart>-<version>.tgz; fall back to scanning
        // in case of repositories that rename on download
        let expected = dest_dir.join(format!("{chart_name}-{version}.tgz"));
        if expected.is_file() {
            return Ok(expected);
        }

        find_tgz(dest_dir).ok_or_else(|| FetchError::ChartPackageMissing {
            command: self.tool.display(&["pull", &chart_ref]),
            dir: dest_dir.to_path_buf(),
        })
    }

    fn tool_name(&self) -> String {
        self.tool.program().to_string()
    }
}

fn find_tgz(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.extension().map(|ext| ext == "tgz").unwrap_or(false))
}
