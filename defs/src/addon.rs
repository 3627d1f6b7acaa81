use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::keys::{HOSTING_CLUSTER_ANNOTATION, PAUSE_ANNOTATION};

/// Enables an addon on one managed cluster. Lives in the cluster's namespace on the hub.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "ManagedClusterAddOn",
    derive = "PartialEq",
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    namespaced,
    status = "ManagedClusterAddOnStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<AddonCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl ManagedClusterAddOn {
    /// The managed cluster this addon targets, which is the namespace it lives in.
    pub fn cluster_name(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(|v| v.as_str())
    }

    pub fn hosting_cluster(&self) -> Option<&str> {
        self.annotation(HOSTING_CLUSTER_ANNOTATION)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn is_paused(&self) -> bool {
        self.annotation(PAUSE_ANNOTATION)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn condition(&self, type_: &str) -> Option<&AddonCondition> {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == type_))
    }
}
