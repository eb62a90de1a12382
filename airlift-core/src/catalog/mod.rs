//! Addon catalogs - the static inventory each bundle is built from
//!
//! A catalog lists the container images (and, for Helm-packaged addons, the
//! chart) that make up one addon bundle, plus the component version map
//! written into the bundle's VERSION file. The built-in catalogs cover
//! Velero, Local Path Provisioner, and OpenEBS; a YAML catalog file can
//! override them for testing or for pinning different upstream versions.

mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The addons airlift knows how to bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Addon {
    Velero,
    LocalPath,
    Openebs,
}

impl Addon {
    /// All addons, in menu order
    pub const ALL: [Addon; 3] = [Addon::Velero, Addon::LocalPath, Addon::Openebs];

    /// The `<addon>` stem used in directory and archive names
    pub fn slug(&self) -> &'static str {
        match self {
            Addon::Velero => "velero",
            Addon::LocalPath => "local-path",
            Addon::Openebs => "openebs",
        }
    }

    /// Human-readable name shown in the menu and summary
    pub fn display_name(&self) -> &'static str {
        match self {
            Addon::Velero => "Velero",
            Addon::LocalPath => "Local Path Provisioner",
            Addon::Openebs => "OpenEBS",
        }
    }
}

impl fmt::Display for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Addon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "velero" => Ok(Addon::Velero),
            "local-path" | "localpath" | "local-path-provisioner" => Ok(Addon::LocalPath),
            "openebs" => Ok(Addon::Openebs),
            other => Err(format!(
                "Unknown addon '{other}'. Expected one of: velero, local-path, openebs, all"
            )),
        }
    }
}

/// One container image to pull into the bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageEntry {
    /// Filesystem-safe artifact name; becomes `images/<artifactName>.tar`
    pub artifact_name: String,

    /// Registry reference (`registry/repo:tag`)
    pub source_ref: String,
}

impl ImageEntry {
    /// Build an entry from a registry reference, deriving a sanitized
    /// artifact name from its repository path and tag.
    pub fn from_ref(source_ref: &str) -> Self {
        Self {
            artifact_name: sanitize_artifact_name(source_ref),
            source_ref: source_ref.to_string(),
        }
    }
}

/// The Helm chart packaged into `charts/`, if the addon ships one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Name the chart repository is registered under (`helm repo add <name>`)
    pub repo_name: String,

    /// Chart repository URL
    pub repo_url: String,

    /// Chart name within the repository
    pub chart_name: String,

    /// Exact pinned chart version
    pub version: String,
}

impl ChartEntry {
    /// The `charts/<name>.tar` file stem: `<chart>-<version>` with every
    /// `.` replaced by `_`, so version dots never read as file extensions.
    pub fn artifact_stem(&self) -> String {
        format!("{}-{}", self.chart_name, self.version).replace('.', "_")
    }
}

/// Everything needed to build one addon bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonCatalog {
    /// Which addon this catalog describes
    pub addon: Addon,

    /// Images to pull and wrap as OCI-layout tars
    pub images: Vec<ImageEntry>,

    /// Chart to fetch and convert, if any
    #[serde(default)]
    pub chart: Option<ChartEntry>,

    /// Sub-component name to pinned version, recorded in the VERSION file
    #[serde(default)]
    pub component_versions: BTreeMap<String, String>,
}

/// The full catalog set, one entry per addon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalogs {
    pub catalogs: Vec<AddonCatalog>,
}

impl Catalogs {
    /// The embedded default catalogs
    pub fn builtin() -> Self {
        builtin::builtin_catalogs()
    }

    /// Load catalogs from a YAML file, replacing the built-in set
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;

        let catalogs: Catalogs = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;

        for catalog in &catalogs.catalogs {
            for image in &catalog.images {
                if image.artifact_name.contains('/') {
                    anyhow::bail!(
                        "Catalog entry '{}' has an artifact name containing '/'. \
                         Artifact names must be filesystem-safe (use '__' instead).",
                        image.artifact_name
                    );
                }
            }
        }

        Ok(catalogs)
    }

    /// Look up the catalog for one addon
    pub fn get(&self, addon: Addon) -> Result<&AddonCatalog> {
        self.catalogs
            .iter()
            .find(|c| c.addon == addon)
            .with_context(|| format!("No catalog defined for addon '{addon}'"))
    }
}

/// Derive a filesystem-safe artifact name from a registry reference.
///
/// Strips the registry host if present, replaces `/` with `__`, and `:`
/// (before the tag) with `-`, e.g. `velero/velero:v1.13.2` becomes
/// `velero__velero-v1.13.2`.
pub fn sanitize_artifact_name(source_ref: &str) -> String {
    // Drop a leading registry host (contains '.' or ':' before the first '/')
    let repo_and_tag = match source_ref.split_once('/') {
        Some((host, rest)) if host.contains('.') || host.contains(':') => rest,
        _ => source_ref,
    };

    repo_and_tag.replace('/', "__").replace(':', "-")
}
