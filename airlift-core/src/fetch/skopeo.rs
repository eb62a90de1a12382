//! Image copy via skopeo
//!
//! Invokes `skopeo copy` to pull a registry image into a local OCI layout,
//! pinned to the `linux/amd64` platform variant. The binary can be replaced
//! through the `AIRLIFT_SKOPEO` environment variable.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::{FetchError, ImageSource, ToolCommand};

/// Environment variable overriding the skopeo invocation
pub const SKOPEO_ENV: &str = "AIRLIFT_SKOPEO";

/// `skopeo`-backed image source
pub struct SkopeoSource {
    tool: ToolCommand,
}

impl SkopeoSource {
    pub fn new() -> Self {
        Self {
            tool: ToolCommand::from_env(SKOPEO_ENV, "skopeo"),
        }
    }
}

impl Default for SkopeoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSource for SkopeoSource {
    async fn is_available(&self) -> bool {
        self.tool.probe(&["--version"]).await
    }

    async fn copy_to_oci(&self, source_ref: &str, dest_dir: &Path) -> Result<(), FetchError> {
        let tag = ref_tag(source_ref);
        let src = format!("docker://{source_ref}");
        let dest = format!("oci:{}:{}", dest_dir.display(), tag);

        info!("Copying {source_ref} (linux/amd64)");
        self.tool
            .run(&[
                "copy",
                "--override-os",
                "linux",
                "--override-arch",
                "amd64",
                &src,
                &dest,
            ])
            .await?;

        Ok(())
    }

    fn tool_name(&self) -> String {
        self.tool.program().to_string()
    }
}

/// Extract the tag from a registry reference, defaulting to `latest`.
/// A `:` only counts as a tag separator after the last `/`.
fn ref_tag(source_ref: &str) -> &str {
    let after_slash = source_ref.rsplit('/').next().unwrap_or(source_ref);
    match after_slash.rsplit_once(':') {
        Some((_, tag)) => tag,
        None => "latest",
    }
}
