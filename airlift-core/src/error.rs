//! Bundle builder error types with clear, actionable messages

use std::path::PathBuf;
use thiserror::Error;

/// Errors that end or degrade a bundle build
#[derive(Error, Debug)]
pub enum BundleError {
    /// The required image-copy tool is not on PATH. Nothing can be built
    /// without it, so this aborts the run before any directory is created.
    #[error("Required tool '{tool}' was not found.\n\nNo bundle can be produced without it. Install it and re-run:\n  {hint}")]
    ToolMissing { tool: String, hint: String },

    /// The staging directory could not be prepared
    #[error("Failed to prepare staging directory {path}")]
    StagingSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Final archive creation failed; the staging directory is retained
    #[error("Failed to create archive {path} (staging directory retained for inspection): {reason}")]
    ArchiveFailed { path: PathBuf, reason: anyhow::Error },
}
