use std::collections::BTreeMap;
use std::fmt;

use addon_defs::{
    DeleteOption, FeedbackRule, JsonPath, ManifestConfig, ManifestWork, ManifestWorkSpec,
    ResourceIdentifier, Workload, ADDON_NAMESPACE_LABEL, ADDON_NAME_LABEL,
};
use addon_utils::json_mismatch;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

use crate::errors::HubError;
use crate::hub::{TargetRef, WorkLocation};
use crate::manifest::ManifestGenerator;
use crate::namespaces::NamespacePlan;

/// Identity of a manifest inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ManifestKey {
    pub fn of(manifest: &Value) -> ManifestKey {
        let field = |pointer: &str| {
            manifest
                .pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        ManifestKey {
            api_version: field("/apiVersion"),
            kind: field("/kind"),
            namespace: field("/metadata/namespace"),
            name: field("/metadata/name"),
        }
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// The ManifestWork the target should have, recomputed on every pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredBundle {
    pub location: WorkLocation,
    pub labels: BTreeMap<String, String>,
    pub manifests: Vec<Value>,
    pub delete_option: DeleteOption,
    pub manifest_configs: Vec<ManifestConfig>,
}

impl DesiredBundle {
    pub fn build(
        target: &TargetRef,
        generator: &ManifestGenerator<'_>,
        namespaces: &NamespacePlan,
    ) -> Result<DesiredBundle, HubError> {
        let mut manifests = namespaces.manifests()?;
        manifests.extend(generator.workload_manifests()?);

        Ok(DesiredBundle {
            location: generator.placement.work_location(&target.addon),
            labels: addon_labels(target),
            manifests,
            delete_option: namespaces.delete_option(),
            manifest_configs: vec![deployment_feedback(
                generator.placement.install_namespace(),
                generator.deployment_name(),
            )],
        })
    }

    fn spec(&self) -> ManifestWorkSpec {
        ManifestWorkSpec {
            workload: Workload {
                manifests: self.manifests.clone(),
            },
            delete_option: Some(self.delete_option.clone()),
            manifest_configs: self.manifest_configs.clone(),
        }
    }

    pub fn to_manifest_work(&self) -> ManifestWork {
        ManifestWork {
            metadata: ObjectMeta {
                name: Some(self.location.name.clone()),
                namespace: Some(self.location.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: self.spec(),
            status: None,
        }
    }

    /// `live` with its spec replaced and our labels restored. Keeps the
    /// resourceVersion so the write is rejected if `live` is stale.
    pub fn apply_to(&self, live: &ManifestWork) -> ManifestWork {
        let mut updated = live.clone();
        let labels = updated.metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.extend(self.labels.clone());
        updated.spec = self.spec();
        updated
    }
}

pub fn addon_labels(target: &TargetRef) -> BTreeMap<String, String> {
    [
        (ADDON_NAME_LABEL.to_string(), target.addon.clone()),
        (ADDON_NAMESPACE_LABEL.to_string(), target.cluster.clone()),
    ]
    .into_iter()
    .collect()
}

fn deployment_feedback(namespace: &str, name: &str) -> ManifestConfig {
    let path = |name: &str, path: &str| JsonPath {
        name: name.to_string(),
        path: path.to_string(),
    };
    ManifestConfig {
        resource_identifier: ResourceIdentifier {
            group: "apps".to_string(),
            resource: "deployments".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        feedback_rules: vec![FeedbackRule {
            type_: "JSONPaths".to_string(),
            json_paths: vec![
                path("Replicas", ".status.replicas"),
                path("AvailableReplicas", ".status.availableReplicas"),
                path("ReadyReplicas", ".status.readyReplicas"),
            ],
        }],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Drift {
    Missing(ManifestKey),
    Extra(ManifestKey),
    Changed { key: ManifestKey, path: String },
    Reordered,
    DeleteOption,
    ManifestConfigs,
    Labels,
}

impl fmt::Display for Drift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Drift::Missing(key) => write!(f, "missing {}", key),
            Drift::Extra(key) => write!(f, "unexpected {}", key),
            Drift::Changed { key, path } => write!(f, "{} differs at {}", key, path),
            Drift::Reordered => write!(f, "manifests are out of order"),
            Drift::DeleteOption => write!(f, "delete option differs"),
            Drift::ManifestConfigs => write!(f, "manifest configs differ"),
            Drift::Labels => write!(f, "labels differ"),
        }
    }
}

/// Differences between the desired bundle and the live work. Manifests are
/// matched by identity and must be equal field for field; the work stores
/// them exactly as written, so any added field is an out-of-band edit.
pub fn detect_drift(desired: &DesiredBundle, live: &ManifestWork) -> Vec<Drift> {
    let mut drift = Vec::new();

    let live_manifests = live.manifests();
    let live_keys: Vec<ManifestKey> = live_manifests.iter().map(ManifestKey::of).collect();
    let desired_keys: Vec<ManifestKey> = desired.manifests.iter().map(ManifestKey::of).collect();

    for (key, manifest) in desired_keys.iter().zip(desired.manifests.iter()) {
        match live_keys.iter().position(|k| k == key) {
            None => drift.push(Drift::Missing(key.clone())),
            Some(idx) => {
                if let Some(path) = json_mismatch(manifest, &live_manifests[idx]) {
                    drift.push(Drift::Changed {
                        key: key.clone(),
                        path,
                    });
                }
            }
        }
    }
    for key in &live_keys {
        if !desired_keys.contains(key) {
            drift.push(Drift::Extra(key.clone()));
        }
    }
    if drift.is_empty() && live_keys != desired_keys {
        drift.push(Drift::Reordered);
    }

    if live.spec.delete_option.as_ref() != Some(&desired.delete_option) {
        drift.push(Drift::DeleteOption);
    }
    if live.spec.manifest_configs != desired.manifest_configs {
        drift.push(Drift::ManifestConfigs);
    }
    let live_labels = live.metadata.labels.clone().unwrap_or_default();
    if desired
        .labels
        .iter()
        .any(|(k, v)| live_labels.get(k) != Some(v))
    {
        drift.push(Drift::Labels);
    }

    drift
}
