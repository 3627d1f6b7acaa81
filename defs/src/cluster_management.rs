use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::keys::ADDON_GROUP;

/// Cluster-wide registration of an addon and its default configuration. Cluster scoped.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "ClusterManagementAddOn",
    derive = "PartialEq",
    group = "addon.open-cluster-management.io",
    version = "v1alpha1"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterManagementAddOnSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_configs: Vec<SupportedConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupportedConfig {
    #[serde(default)]
    pub group: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_config: Option<ConfigReference>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

impl ClusterManagementAddOn {
    /// The AddOnDeploymentConfig bound to this addon, if any. Only the first
    /// matching binding counts.
    pub fn deployment_config_ref(&self) -> Option<&ConfigReference> {
        self.spec
            .supported_configs
            .iter()
            .filter(|c| c.group == ADDON_GROUP && c.resource == "addondeploymentconfigs")
            .find_map(|c| c.default_config.as_ref())
    }
}
