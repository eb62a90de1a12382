//! End-to-end bundle builds against in-process fetch fakes
//!
//! No network and no external tools: the mock image source writes a minimal
//! OCI layout where skopeo would, and the mock chart source drops a fake
//! chart package where helm would.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use airlift_core::bundle::{BundleBuilder, BundleMeta};
use airlift_core::catalog::{Addon, AddonCatalog, ChartEntry, ImageEntry};
use airlift_core::fetch::{ChartSource, FetchError, ImageSource};
use airlift_core::hash;
use airlift_core::oci::{self, OciIndex};
use airlift_core::version::BundleVersion;

const CHART_BYTES: &[u8] = b"fake chart package bytes for testing";

/// Image source that fabricates OCI layouts locally, failing listed refs
struct MockImageSource {
    fail_refs: HashSet<String>,
}

impl MockImageSource {
    fn new() -> Self {
        Self {
            fail_refs: HashSet::new(),
        }
    }

    fn failing(refs: &[&str]) -> Self {
        Self {
            fail_refs: refs.iter().map(|r| r.to_string()).collect(),
        }
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn is_available(&self) -> bool {
        true
    }

    async fn copy_to_oci(&self, source_ref: &str, dest_dir: &Path) -> Result<(), FetchError> {
        if self.fail_refs.contains(source_ref) {
            return Err(FetchError::CommandFailed {
                command: format!("mock copy {source_ref}"),
                status: "exit status: 1".to_string(),
                stderr: "manifest unknown".to_string(),
            });
        }

        let blobs = dest_dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs).unwrap();
        std::fs::write(dest_dir.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();
        std::fs::write(
            dest_dir.join("index.json"),
            r#"{"schemaVersion":2,"manifests":[]}"#,
        )
        .unwrap();
        // Blob content derives from the ref so layouts differ per image
        std::fs::write(blobs.join(hash::sha256_hex(source_ref.as_bytes())), source_ref).unwrap();
        Ok(())
    }

    fn tool_name(&self) -> String {
        "mock-skopeo".to_string()
    }
}

/// Chart source that writes a fixed fake package
struct MockChartSource;

#[async_trait]
impl ChartSource for MockChartSource {
    async fn is_available(&self) -> bool {
        true
    }

    async fn ensure_repo(&self, _: &str, _: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch_chart(
        &self,
        _repo_name: &str,
        chart_name: &str,
        version: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let path = dest_dir.join(format!("{chart_name}-{version}.tgz"));
        std::fs::write(&path, CHART_BYTES).unwrap();
        Ok(path)
    }

    fn tool_name(&self) -> String {
        "mock-helm".to_string()
    }
}

/// Chart source whose fetch always fails
struct BrokenChartSource;

#[async_trait]
impl ChartSource for BrokenChartSource {
    async fn is_available(&self) -> bool {
        true
    }

    async fn ensure_repo(&self, _: &str, _: &str) -> Result<(), FetchError> {
        Ok(())
    }

    async fn fetch_chart(
        &self,
        _: &str,
        _: &str,
        _: &str,
        _: &Path,
    ) -> Result<PathBuf, FetchError> {
        Err(FetchError::CommandFailed {
            command: "mock pull".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "no such chart".to_string(),
        })
    }

    fn tool_name(&self) -> String {
        "mock-helm".to_string()
    }
}

fn test_catalog() -> AddonCatalog {
    let mut component_versions = BTreeMap::new();
    component_versions.insert("velero".to_string(), "v1.13.2".to_string());

    AddonCatalog {
        addon: Addon::Velero,
        images: vec![
            ImageEntry::from_ref("velero/velero:v1.13.2"),
            ImageEntry::from_ref("velero/velero-plugin-for-aws:v1.9.2"),
        ],
        chart: Some(ChartEntry {
            repo_name: "vmware-tanzu".to_string(),
            repo_url: "https://vmware-tanzu.github.io/helm-charts".to_string(),
            chart_name: "velero".to_string(),
            version: "6.0.0".to_string(),
        }),
        component_versions,
    }
}

fn version() -> BundleVersion {
    BundleVersion::parse("2025.01.0").unwrap()
}

fn extract_targz(archive: &Path, dest: &Path) -> Result<()> {
    let decoder = flate2::read::GzDecoder::new(std::fs::File::open(archive)?);
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)?;
    Ok(())
}

fn extract_tar(archive: &Path, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(std::fs::File::open(archive)?);
    archive.unpack(dest)?;
    Ok(())
}

#[tokio::test]
async fn test_full_build_produces_versioned_and_latest_archives() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();
    let charts = MockChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts));
    let report = builder.build(&test_catalog()).await?;

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.total, 2);
    assert!(report.failed.is_empty());
    assert!(report.chart_included);
    assert!(report.staging_retained.is_none());

    let versioned = out.path().join("velero-addon-bundle-2025.01.0.tar.gz");
    let latest = out.path().join("velero-addon-bundle-latest.tar.gz");
    assert!(versioned.is_file());
    assert!(latest.is_file());
    assert_eq!(report.archives, vec![versioned.clone(), latest.clone()]);

    // -latest is a byte-identical physical copy, not a link
    assert_eq!(std::fs::read(&versioned)?, std::fs::read(&latest)?);
    assert!(!std::fs::symlink_metadata(&latest)?.file_type().is_symlink());

    // Staging tree is gone after a successful archive
    assert!(!out.path().join("velero-addon-bundle").exists());

    Ok(())
}

#[tokio::test]
async fn test_failed_pull_is_recorded_and_skipped() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::failing(&["velero/velero:v1.13.2"]);
    let charts = MockChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts))
        .keep_staging(true);
    let report = builder.build(&test_catalog()).await?;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.total, 2);
    assert_eq!(report.failed, vec!["velero/velero:v1.13.2".to_string()]);

    // Exactly one image tar, and none for the failed ref
    let images_dir = out.path().join("velero-addon-bundle").join("images");
    let tars: Vec<_> = std::fs::read_dir(&images_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(tars, vec!["velero__velero-plugin-for-aws-v1.9.2.tar".to_string()]);

    // The bundle still archived despite the failure
    assert!(report.archived());

    Ok(())
}

#[tokio::test]
async fn test_archive_contents_and_image_layout() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();
    let charts = MockChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts));
    builder.build(&test_catalog()).await?;

    let extract = TempDir::new()?;
    extract_targz(
        &out.path().join("velero-addon-bundle-2025.01.0.tar.gz"),
        extract.path(),
    )?;

    // Downstream loader contract: exact subdirectory names and extensions
    assert!(extract.path().join("images").is_dir());
    assert!(extract.path().join("charts").is_dir());
    assert!(extract.path().join("manifests").is_dir());

    let meta = BundleMeta::read_from_dir(extract.path())?;
    assert_eq!(meta.bundle_version, "2025.01.0");
    assert_eq!(meta.bundle_type, "velero-addon");
    assert_eq!(meta.component_versions["velero"], "v1.13.2");

    // Each image tar unpacks to a valid OCI layout
    let image_tar = extract
        .path()
        .join("images")
        .join("velero__velero-v1.13.2.tar");
    let layout = TempDir::new()?;
    extract_tar(&image_tar, layout.path())?;
    oci::validate_layout(layout.path())?;

    Ok(())
}

#[tokio::test]
async fn test_chart_layout_digest_and_size_roundtrip() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();
    let charts = MockChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts));
    builder.build(&test_catalog()).await?;

    let extract = TempDir::new()?;
    extract_targz(
        &out.path().join("velero-addon-bundle-2025.01.0.tar.gz"),
        extract.path(),
    )?;

    // Chart file name: dots become underscores
    let chart_tar = extract.path().join("charts").join("velero-6_0_0.tar");
    assert!(chart_tar.is_file());

    let layout = TempDir::new()?;
    extract_tar(&chart_tar, layout.path())?;
    oci::validate_layout(layout.path())?;

    let index: OciIndex =
        serde_json::from_str(&std::fs::read_to_string(layout.path().join("index.json"))?)?;
    let descriptor = &index.manifests[0];
    assert_eq!(
        descriptor.media_type,
        "application/vnd.cncf.helm.chart.content.v1.tar+gzip"
    );

    let hex_digest = descriptor.digest.strip_prefix("sha256:").unwrap();
    let blob = std::fs::read(layout.path().join("blobs/sha256").join(hex_digest))?;

    // size matches the blob's byte length, digest matches its hash, and the
    // blob is exactly the fetched chart package
    assert_eq!(descriptor.size, blob.len() as u64);
    assert_eq!(hash::sha256_hex(&blob), hex_digest);
    assert_eq!(blob.as_slice(), CHART_BYTES);

    Ok(())
}

#[tokio::test]
async fn test_missing_chart_tool_still_builds_bundle() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();

    let builder = BundleBuilder::new(out.path(), version(), &images, None).keep_staging(true);
    let report = builder.build(&test_catalog()).await?;

    assert!(!report.chart_included);
    assert!(report.archived());

    let charts_dir = out.path().join("velero-addon-bundle").join("charts");
    assert_eq!(std::fs::read_dir(&charts_dir)?.count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_chart_fetch_failure_is_non_fatal() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();
    let charts = BrokenChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts));
    let report = builder.build(&test_catalog()).await?;

    assert!(!report.chart_included);
    assert_eq!(report.succeeded, 2);
    assert!(report.archived());

    Ok(())
}

#[tokio::test]
async fn test_chartless_addon_gets_static_manifests() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();

    let mut component_versions = BTreeMap::new();
    component_versions.insert("local-path-provisioner".to_string(), "v0.0.28".to_string());
    let catalog = AddonCatalog {
        addon: Addon::LocalPath,
        images: vec![ImageEntry::from_ref("rancher/local-path-provisioner:v0.0.28")],
        chart: None,
        component_versions,
    };

    let builder = BundleBuilder::new(out.path(), version(), &images, None);
    let report = builder.build(&catalog).await?;
    assert!(report.archived());

    let extract = TempDir::new()?;
    extract_targz(
        &out.path().join("local-path-addon-bundle-2025.01.0.tar.gz"),
        extract.path(),
    )?;

    let manifest = std::fs::read_to_string(
        extract
            .path()
            .join("manifests")
            .join("local-path-provisioner.yaml"),
    )?;
    assert!(manifest.contains("kind: StorageClass"));
    assert!(manifest.contains("REGISTRY_URL/"));

    Ok(())
}

#[tokio::test]
async fn test_repeat_build_produces_identical_file_set() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();
    let charts = MockChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts))
        .keep_staging(true);

    let file_set = |root: &Path| -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        files.sort();
        files
    };

    builder.build(&test_catalog()).await?;
    let staging = out.path().join("velero-addon-bundle");
    let first = file_set(&staging);

    builder.build(&test_catalog()).await?;
    let second = file_set(&staging);

    assert_eq!(first, second);
    assert!(first.contains(&"VERSION".to_string()));

    Ok(())
}

#[tokio::test]
async fn test_archive_failure_retains_staging() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::new();

    // Occupy the archive's destination path with a directory so the final
    // rename cannot succeed
    std::fs::create_dir_all(out.path().join("velero-addon-bundle-2025.01.0.tar.gz"))?;

    let builder = BundleBuilder::new(out.path(), version(), &images, None);
    let report = builder.build(&test_catalog()).await?;

    assert!(!report.archived());
    let staging = report.staging_retained.expect("staging should be retained");
    assert!(staging.is_dir());
    assert!(staging.join("VERSION").is_file());
    assert!(staging.join("images").is_dir());

    Ok(())
}

#[tokio::test]
async fn test_no_temp_dirs_left_behind() -> Result<()> {
    let out = TempDir::new()?;
    let images = MockImageSource::failing(&["velero/velero:v1.13.2"]);
    let charts = MockChartSource;

    let builder = BundleBuilder::new(out.path(), version(), &images, Some(&charts));
    builder.build(&test_catalog()).await?;

    // Success and failure paths both clean their per-item temp dirs
    let leftovers: Vec<_> = std::fs::read_dir(out.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with("airlift-"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp dirs: {leftovers:?}");

    Ok(())
}
