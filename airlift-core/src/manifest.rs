//! Static manifest emission for chartless addons
//!
//! Local Path Provisioner is deployed from plain Kubernetes manifests rather
//! than a chart. The manifest set is emitted verbatim with image references
//! behind the `REGISTRY_URL` placeholder; the downstream loader substitutes
//! the real registry when the bundle lands in the cluster.

use std::path::Path;

use anyhow::{Context, Result};

use crate::catalog::Addon;

/// Placeholder token the downstream loader replaces with its registry
pub const REGISTRY_PLACEHOLDER: &str = "REGISTRY_URL";

/// The complete Local Path Provisioner manifest set: Namespace,
/// ServiceAccount, ClusterRole, ClusterRoleBinding, Deployment, ConfigMap,
/// and StorageClass. Field values (RBAC verbs, mount paths, reclaim policy)
/// are consumed directly by the cluster and must not drift.
const LOCAL_PATH_MANIFEST: &str = r#"apiVersion: v1
kind: Namespace
metadata:
  name: local-path-storage
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: local-path-provisioner-service-account
  namespace: local-path-storage
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: local-path-provisioner-role
rules:
  - apiGroups: [""]
    resources: ["nodes", "persistentvolumeclaims", "configmaps"]
    verbs: ["get", "list", "watch"]
  - apiGroups: [""]
    resources: ["endpoints", "persistentvolumes", "pods"]
    verbs: ["*"]
  - apiGroups: [""]
    resources: ["events"]
    verbs: ["create", "patch"]
  - apiGroups: ["storage.k8s.io"]
    resources: ["storageclasses"]
    verbs: ["get", "list", "watch"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: local-path-provisioner-bind
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: local-path-provisioner-role
subjects:
  - kind: ServiceAccount
    name: local-path-provisioner-service-account
    namespace: local-path-storage
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: local-path-provisioner
  namespace: local-path-storage
spec:
  replicas: 1
  selector:
    matchLabels:
      app: local-path-provisioner
  template:
    metadata:
      labels:
        app: local-path-provisioner
    spec:
      serviceAccountName: local-path-provisioner-service-account
      containers:
        - name: local-path-provisioner
          image: REGISTRY_URL/rancher/local-path-provisioner:v0.0.28
          imagePullPolicy: IfNotPresent
          command:
            - local-path-provisioner
            - --debug
            - start
            - --config
            - /etc/config/config.json
          volumeMounts:
            - name: config-volume
              mountPath: /etc/config/
          env:
            - name: POD_NAMESPACE
              valueFrom:
                fieldRef:
                  fieldPath: metadata.namespace
      volumes:
        - name: config-volume
          configMap:
            name: local-path-config
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: local-path-config
  namespace: local-path-storage
data:
  config.json: |-
    {
      "nodePathMap": [
        {
          "node": "DEFAULT_PATH_FOR_NON_LISTED_NODES",
          "paths": ["/opt/local-path-provisioner"]
        }
      ]
    }
  setup: |-
    #!/bin/sh
    set -eu
    mkdir -m 0777 -p "$VOL_DIR"
  teardown: |-
    #!/bin/sh
    set -eu
    rm -rf "$VOL_DIR"
  helperPod.yaml: |-
    apiVersion: v1
    kind: Pod
    metadata:
      name: helper-pod
    spec:
      priorityClassName: system-node-critical
      tolerations:
        - key: node.kubernetes.io/disk-pressure
          operator: Exists
          effect: NoSchedule
      containers:
        - name: helper-pod
          image: REGISTRY_URL/busybox:1.36
          imagePullPolicy: IfNotPresent
---
apiVersion: storage.k8s.io/v1
kind: StorageClass
metadata:
  name: local-path
  annotations:
    storageclass.kubernetes.io/is-default-class: "true"
provisioner: rancher.io/local-path
volumeBindingMode: WaitForFirstConsumer
reclaimPolicy: Delete
"#;

/// Write the static manifest set for `addon` into `manifests_dir`, if the
/// addon has one. Returns whether anything was written.
pub fn emit_manifests(addon: Addon, manifests_dir: &Path) -> Result<bool> {
    let Some((file_name, content)) = manifest_for(addon) else {
        return Ok(false);
    };

    let path = manifests_dir.join(file_name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;

    Ok(true)
}

fn manifest_for(addon: Addon) -> Option<(&'static str, &'static str)> {
    match addon {
        Addon::LocalPath => Some(("local-path-provisioner.yaml", LOCAL_PATH_MANIFEST)),
        Addon::Velero | Addon::Openebs => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_emit_local_path_manifest() -> Result<()> {
        let dir = TempDir::new()?;
        let wrote = emit_manifests(Addon::LocalPath, dir.path())?;
        assert!(wrote);

        let content = std::fs::read_to_string(dir.path().join("local-path-provisioner.yaml"))?;

        // All seven resource kinds present
        for kind in [
            "kind: Namespace",
            "kind: ServiceAccount",
            "kind: ClusterRole",
            "kind: ClusterRoleBinding",
            "kind: Deployment",
            "kind: ConfigMap",
            "kind: StorageClass",
        ] {
            assert!(content.contains(kind), "missing '{kind}'");
        }

        // Images sit behind the placeholder for the downstream loader
        assert!(content.contains("REGISTRY_URL/rancher/local-path-provisioner:v0.0.28"));
        assert!(content.contains("REGISTRY_URL/busybox:1.36"));

        // Cluster-consumed field values
        assert!(content.contains("reclaimPolicy: Delete"));
        assert!(content.contains("volumeBindingMode: WaitForFirstConsumer"));
        assert!(content.contains("mountPath: /etc/config/"));
        assert!(content.contains(r#"verbs: ["create", "patch"]"#));

        // Every document parses as YAML
        for doc in content.split("\n---\n") {
            let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_str(doc).unwrap();
            assert!(parsed.get("kind").is_some());
        }

        Ok(())
    }

    #[test]
    fn test_chart_addons_emit_nothing() -> Result<()> {
        let dir = TempDir::new()?;
        assert!(!emit_manifests(Addon::Velero, dir.path())?);
        assert!(!emit_manifests(Addon::Openebs, dir.path())?);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        Ok(())
    }
}
