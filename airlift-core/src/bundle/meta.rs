//! Bundle VERSION metadata file
//!
//! Written into the staging tree before any fetch runs, so the recorded
//! version and date reflect the builder's environment rather than the
//! build outcome.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Contents of the bundle's `VERSION` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMeta {
    /// Calendar bundle version (`YYYY.MM.PATCH`)
    pub bundle_version: String,

    /// Bundle type tag (`<addon>-addon`)
    pub bundle_type: String,

    /// UTC creation timestamp, RFC 3339
    pub created_date: String,

    /// Sub-component name to pinned version
    #[serde(default)]
    pub component_versions: BTreeMap<String, String>,
}

impl BundleMeta {
    pub fn new(
        bundle_version: &str,
        bundle_type: &str,
        component_versions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            bundle_version: bundle_version.to_string(),
            bundle_type: bundle_type.to_string(),
            created_date: chrono::Utc::now().to_rfc3339(),
            component_versions,
        }
    }

    /// Write as YAML to `<dir>/VERSION`
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        let path = dir.join("VERSION");
        let yaml = serde_yaml_ng::to_string(self).context("Failed to serialize VERSION")?;
        std::fs::write(&path, yaml)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Read back from `<dir>/VERSION`
    pub fn read_from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join("VERSION");
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_file_roundtrip() -> Result<()> {
        let dir = TempDir::new()?;
        let mut components = BTreeMap::new();
        components.insert("velero".to_string(), "v1.13.2".to_string());

        let meta = BundleMeta::new("2025.01.0", "velero-addon", components);
        meta.write_to_dir(dir.path())?;

        let read = BundleMeta::read_from_dir(dir.path())?;
        assert_eq!(read.bundle_version, "2025.01.0");
        assert_eq!(read.bundle_type, "velero-addon");
        assert_eq!(read.component_versions["velero"], "v1.13.2");

        // created_date parses as RFC 3339
        assert!(chrono::DateTime::parse_from_rfc3339(&read.created_date).is_ok());
        Ok(())
    }
}
