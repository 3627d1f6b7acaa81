use std::fmt;

use addon_defs::{
    AddOnDeploymentConfig, ClusterManagementAddOn, ManagedCluster, ManagedClusterAddOn,
    ManagedClusterAddOnStatus, ManifestWork,
};
use async_trait::async_trait;
use serde::Serialize;

use crate::errors::HubError;

/// One reconciliation unit: an addon enabled on a managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TargetRef {
    pub cluster: String,
    pub addon: String,
}

impl TargetRef {
    pub fn new(cluster: impl Into<String>, addon: impl Into<String>) -> Self {
        TargetRef {
            cluster: cluster.into(),
            addon: addon.into(),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.addon)
    }
}

/// Where a ManifestWork lives on the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkLocation {
    pub namespace: String,
    pub name: String,
}

impl WorkLocation {
    pub fn of(work: &ManifestWork) -> WorkLocation {
        WorkLocation {
            namespace: work.metadata.namespace.clone().unwrap_or_default(),
            name: work.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for WorkLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Everything the engine reads from and writes to the hub API server.
///
/// Getters return `Ok(None)` for objects that do not exist. Writes carrying a
/// stale `resourceVersion` fail with [`HubError::Conflict`].
#[async_trait]
pub trait HubApi: Send + Sync {
    async fn get_addon(&self, target: &TargetRef) -> Result<Option<ManagedClusterAddOn>, HubError>;

    /// All addons with the given name across cluster namespaces.
    async fn list_addons(&self, addon: &str) -> Result<Vec<ManagedClusterAddOn>, HubError>;

    async fn set_addon_finalizers(
        &self,
        target: &TargetRef,
        finalizers: Vec<String>,
    ) -> Result<(), HubError>;

    async fn update_addon_status(
        &self,
        target: &TargetRef,
        status: ManagedClusterAddOnStatus,
    ) -> Result<(), HubError>;

    async fn get_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, HubError>;

    async fn get_cluster_management_addon(
        &self,
        name: &str,
    ) -> Result<Option<ClusterManagementAddOn>, HubError>;

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AddOnDeploymentConfig>, HubError>;

    async fn get_work(&self, location: &WorkLocation) -> Result<Option<ManifestWork>, HubError>;

    /// Works labelled as belonging to the target, wherever they live.
    async fn list_addon_works(&self, target: &TargetRef) -> Result<Vec<ManifestWork>, HubError>;

    async fn list_works_in(&self, namespace: &str) -> Result<Vec<ManifestWork>, HubError>;

    async fn create_work(&self, work: &ManifestWork) -> Result<(), HubError>;

    /// Replaces the spec and labels. Fails with a conflict when the
    /// resourceVersion on `work` is stale.
    async fn replace_work(&self, work: &ManifestWork) -> Result<(), HubError>;

    /// Requests deletion; the work may linger until its resources are cleaned up.
    async fn delete_work(&self, location: &WorkLocation) -> Result<(), HubError>;
}
