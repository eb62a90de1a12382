//! OCI image layout production and validation
//!
//! Images arrive as OCI layouts straight from the copy tool; charts are
//! repackaged here into a minimal single-blob layout:
//!
//! ```text
//! oci-layout                {"imageLayoutVersion": "1.0.0"}
//! index.json                {schemaVersion: 2, manifests: [{mediaType, digest, size}]}
//! blobs/sha256/<digest>     raw chart package bytes
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::hash;

/// Media type for a Helm chart package stored as an OCI blob
pub const HELM_CHART_MEDIA_TYPE: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";

/// OCI image layout schema version
pub const IMAGE_LAYOUT_VERSION: &str = "1.0.0";

/// The `oci-layout` marker file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciLayout {
    #[serde(rename = "imageLayoutVersion")]
    pub image_layout_version: String,
}

impl Default for OciLayout {
    fn default() -> Self {
        Self {
            image_layout_version: IMAGE_LAYOUT_VERSION.to_string(),
        }
    }
}

/// A content descriptor in `index.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
}

/// The layout's `index.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OciIndex {
    #[serde(rename = "schemaVersion")]
    pub schema_version: i32,
    pub manifests: Vec<Descriptor>,
}

/// Wrap a packaged Helm chart as a single-blob OCI layout under `dest_dir`.
///
/// The digest is computed from the same in-memory bytes that are written to
/// the blob path, and `size` is their byte length, so `index.json` always
/// describes exactly what is on disk.
pub fn write_chart_layout(chart_package: &[u8], dest_dir: &Path) -> Result<()> {
    let digest = hash::sha256_hex(chart_package);

    let blobs_dir = dest_dir.join("blobs").join("sha256");
    std::fs::create_dir_all(&blobs_dir)
        .with_context(|| format!("Failed to create blob directory: {}", blobs_dir.display()))?;

    std::fs::write(blobs_dir.join(&digest), chart_package)
        .context("Failed to write chart blob")?;

    let layout = serde_json::to_string(&OciLayout::default())?;
    std::fs::write(dest_dir.join("oci-layout"), layout)
        .context("Failed to write oci-layout file")?;

    let index = OciIndex {
        schema_version: 2,
        manifests: vec![Descriptor {
            media_type: HELM_CHART_MEDIA_TYPE.to_string(),
            digest: hash::prefixed(&digest),
            size: chart_package.len() as u64,
        }],
    };
    std::fs::write(dest_dir.join("index.json"), serde_json::to_string(&index)?)
        .context("Failed to write index.json")?;

    Ok(())
}

/// Check that `dir` holds a plausible OCI layout: the `oci-layout` marker,
/// an `index.json`, and at least one blob under `blobs/sha256/`.
pub fn validate_layout(dir: &Path) -> Result<()> {
    for required in ["oci-layout", "index.json"] {
        if !dir.join(required).is_file() {
            anyhow::bail!(
                "Not an OCI layout: missing {} in {}",
                required,
                dir.display()
            );
        }
    }

    let blobs_dir = dir.join("blobs").join("sha256");
    let has_blob = blobs_dir.is_dir()
        && std::fs::read_dir(&blobs_dir)?
            .filter_map(|e| e.ok())
            .any(|e| e.path().is_file());

    if !has_blob {
        anyhow::bail!(
            "Not an OCI layout: no blobs under {}",
            blobs_dir.display()
        );
    }

    Ok(())
}
