//! External fetch tools - image copy and chart download
//!
//! The bundle builder talks to registries only through these traits, so
//! tests substitute in-process fakes and never touch the network. The real
//! implementations spawn `skopeo` and `helm` as child processes and block on
//! them one at a time.

mod helm;
mod skopeo;

pub use helm::HelmSource;
pub use skopeo::SkopeoSource;

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// A single fetch step that failed
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to spawn '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'{command}' succeeded but produced no chart package under {dir}")]
    ChartPackageMissing { command: String, dir: PathBuf },
}

/// Copies a container image into a local OCI layout directory
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Probe whether the underlying tool can run at all
    async fn is_available(&self) -> bool;

    /// Copy the `linux/amd64` variant of `source_ref` into `dest_dir` as an
    /// OCI image layout.
    async fn copy_to_oci(&self, source_ref: &str, dest_dir: &Path) -> Result<(), FetchError>;

    /// Tool name for log lines and the missing-tool error
    fn tool_name(&self) -> String;
}

/// Fetches packaged Helm charts from a chart repository
#[async_trait]
pub trait ChartSource: Send + Sync {
    async fn is_available(&self) -> bool;

    /// Register or refresh the chart repository. Safe to repeat.
    async fn ensure_repo(&self, repo_name: &str, repo_url: &str) -> Result<(), FetchError>;

    /// Download `<repo>/<chart>` at exactly `version` into `dest_dir`,
    /// returning the path of the packaged `.tgz`.
    async fn fetch_chart(
        &self,
        repo_name: &str,
        chart_name: &str,
        version: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError>;

    fn tool_name(&self) -> String;
}

/// An external tool invocation resolved from an environment override or a
/// default binary name. Overrides are parsed with shell-words, so wrappers
/// like `sudo skopeo` work.
#[derive(Debug, Clone)]
pub(crate) struct ToolCommand {
    program: String,
    base_args: Vec<String>,
}

impl ToolCommand {
    pub(crate) fn from_env(env_var: &str, default_bin: &str) -> Self {
        match std::env::var(env_var) {
            Ok(raw) if !raw.trim().is_empty() => match shell_words::split(&raw) {
                Ok(mut words) if !words.is_empty() => {
                    let program = words.remove(0);
                    Self {
                        program,
                        base_args: words,
                    }
                }
                _ => {
                    tracing::warn!("Ignoring unparseable {env_var}='{raw}'");
                    Self::plain(default_bin)
                }
            },
            _ => Self::plain(default_bin),
        }
    }

    fn plain(program: &str) -> Self {
        Self {
            program: program.to_string(),
            base_args: Vec::new(),
        }
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    /// Render the full command line for logs and error messages
    pub(crate) fn display(&self, args: &[&str]) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.base_args.iter().cloned());
        parts.extend(args.iter().map(|a| a.to_string()));
        parts.join(" ")
    }

    /// Run to completion, capturing output. Errors on spawn failure or a
    /// non-zero exit, carrying the stderr tail.
    pub(crate) async fn run(&self, args: &[&str]) -> Result<Output, FetchError> {
        let rendered = self.display(args);
        debug!("Running: {rendered}");

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .output()
            .await
            .map_err(|source| FetchError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(FetchError::CommandFailed {
                command: rendered,
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(output)
    }

    /// Probe the tool by running it with the given args and discarding output
    pub(crate) async fn probe(&self, args: &[&str]) -> bool {
        self.run(args).await.is_ok()
    }
}

/// Keep the last few lines of stderr; tool output can be pages long
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let tail_start = lines.len().saturating_sub(5);
    lines[tail_start..].join(" | ").trim().to_string()
}
