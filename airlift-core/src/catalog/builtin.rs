//! Built-in addon catalogs
//!
//! Image references and chart versions are pinned here; bumping an addon
//! means editing this file (or shipping a catalog YAML that overrides it).

use std::collections::BTreeMap;

use super::{Addon, AddonCatalog, Catalogs, ChartEntry, ImageEntry};

pub(super) fn builtin_catalogs() -> Catalogs {
    Catalogs {
        catalogs: vec![velero(), local_path(), openebs()],
    }
}

fn velero() -> AddonCatalog {
    AddonCatalog {
        addon: Addon::Velero,
        images: vec![
            ImageEntry::from_ref("velero/velero:v1.13.2"),
            ImageEntry::from_ref("velero/velero-plugin-for-aws:v1.9.2"),
            ImageEntry::from_ref("velero/velero-restore-helper:v1.13.2"),
            ImageEntry::from_ref("bitnami/kubectl:1.29.4"),
        ],
        chart: Some(ChartEntry {
            repo_name: "vmware-tanzu".to_string(),
            repo_url: "https://vmware-tanzu.github.io/helm-charts".to_string(),
            chart_name: "velero".to_string(),
            version: "6.0.0".to_string(),
        }),
        component_versions: versions(&[
            ("velero", "v1.13.2"),
            ("velero-plugin-for-aws", "v1.9.2"),
            ("velero-chart", "6.0.0"),
        ]),
    }
}

fn local_path() -> AddonCatalog {
    AddonCatalog {
        addon: Addon::LocalPath,
        images: vec![
            ImageEntry::from_ref("rancher/local-path-provisioner:v0.0.28"),
            ImageEntry::from_ref("busybox:1.36"),
        ],
        // Deployed from static manifests, not a chart
        chart: None,
        component_versions: versions(&[
            ("local-path-provisioner", "v0.0.28"),
            ("busybox", "1.36"),
        ]),
    }
}

fn openebs() -> AddonCatalog {
    AddonCatalog {
        addon: Addon::Openebs,
        images: vec![
            ImageEntry::from_ref("openebs/provisioner-localpv:4.0.0"),
            ImageEntry::from_ref("openebs/linux-utils:4.0.0"),
            ImageEntry::from_ref("openebs/node-disk-manager:2.1.0"),
            ImageEntry::from_ref("openebs/node-disk-operator:2.1.0"),
        ],
        chart: Some(ChartEntry {
            repo_name: "openebs".to_string(),
            repo_url: "https://openebs.github.io/openebs".to_string(),
            chart_name: "openebs".to_string(),
            version: "4.0.1".to_string(),
        }),
        component_versions: versions(&[
            ("provisioner-localpv", "4.0.0"),
            ("node-disk-manager", "2.1.0"),
            ("openebs-chart", "4.0.1"),
        ]),
    }
}

fn versions(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
