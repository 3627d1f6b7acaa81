use addon_defs::{
    AddOnDeploymentConfig, ClusterManagementAddOn, ManagedCluster, ManagedClusterAddOn,
    ManagedClusterAddOnStatus, ManifestWork, ADDON_NAME_LABEL, ADDON_NAMESPACE_LABEL,
};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client as KubeClient, ResourceExt};
use log::debug;
use reconciler::{HubApi, HubError, TargetRef, WorkLocation};
use serde_json::json;

/// [`HubApi`] backed by the hub cluster's API server.
#[derive(Clone)]
pub struct KubeHub {
    client: KubeClient,
}

impl KubeHub {
    pub fn new(client: KubeClient) -> Self {
        KubeHub { client }
    }

    fn addons(&self, namespace: &str) -> Api<ManagedClusterAddOn> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn works(&self, namespace: &str) -> Api<ManifestWork> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

pub fn classify_error(error: kube::Error, kind: &str, name: &str) -> HubError {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => HubError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            409 => HubError::Conflict(format!("{} {}", kind, name)),
            429 | 500..=599 => HubError::Transient(format!(
                "{} {}: {} ({})",
                kind, name, response.message, response.code
            )),
            _ => HubError::Api(format!(
                "{} {}: {} ({})",
                kind, name, response.message, response.code
            )),
        },
        kube::Error::SerdeError(e) => HubError::Serialization(format!("{} {}: {}", kind, name, e)),
        // Connection level failures
        other => HubError::Transient(format!("{} {}: {}", kind, name, other)),
    }
}

pub fn work_selector(target: &TargetRef) -> String {
    format!(
        "{}={},{}={}",
        ADDON_NAME_LABEL, target.addon, ADDON_NAMESPACE_LABEL, target.cluster
    )
}

#[async_trait]
impl HubApi for KubeHub {
    async fn get_addon(&self, target: &TargetRef) -> Result<Option<ManagedClusterAddOn>, HubError> {
        self.addons(&target.cluster)
            .get_opt(&target.addon)
            .await
            .map_err(|e| classify_error(e, "ManagedClusterAddOn", &target.to_string()))
    }

    async fn list_addons(&self, addon: &str) -> Result<Vec<ManagedClusterAddOn>, HubError> {
        let api: Api<ManagedClusterAddOn> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("metadata.name={}", addon));
        let list = api
            .list(&params)
            .await
            .map_err(|e| classify_error(e, "ManagedClusterAddOn", addon))?;
        Ok(list.items)
    }

    async fn set_addon_finalizers(
        &self,
        target: &TargetRef,
        finalizers: Vec<String>,
    ) -> Result<(), HubError> {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.addons(&target.cluster)
            .patch(&target.addon, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify_error(e, "ManagedClusterAddOn", &target.to_string()))?;
        debug!("Set finalizers on {} to {:?}", target, finalizers);
        Ok(())
    }

    async fn update_addon_status(
        &self,
        target: &TargetRef,
        status: ManagedClusterAddOnStatus,
    ) -> Result<(), HubError> {
        // Merge patches replace lists wholesale, so the conditions are sent complete
        let patch = json!({ "status": status });
        self.addons(&target.cluster)
            .patch_status(&target.addon, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify_error(e, "ManagedClusterAddOn", &target.to_string()))?;
        Ok(())
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, HubError> {
        let api: Api<ManagedCluster> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| classify_error(e, "ManagedCluster", name))
    }

    async fn get_cluster_management_addon(
        &self,
        name: &str,
    ) -> Result<Option<ClusterManagementAddOn>, HubError> {
        let api: Api<ClusterManagementAddOn> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| classify_error(e, "ClusterManagementAddOn", name))
    }

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AddOnDeploymentConfig>, HubError> {
        let api: Api<AddOnDeploymentConfig> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(|e| {
            classify_error(e, "AddOnDeploymentConfig", &format!("{}/{}", namespace, name))
        })
    }

    async fn get_work(&self, location: &WorkLocation) -> Result<Option<ManifestWork>, HubError> {
        self.works(&location.namespace)
            .get_opt(&location.name)
            .await
            .map_err(|e| classify_error(e, "ManifestWork", &location.to_string()))
    }

    async fn list_addon_works(&self, target: &TargetRef) -> Result<Vec<ManifestWork>, HubError> {
        let api: Api<ManifestWork> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default().labels(&work_selector(target)))
            .await
            .map_err(|e| classify_error(e, "ManifestWork", &target.to_string()))?;
        Ok(list.items)
    }

    async fn list_works_in(&self, namespace: &str) -> Result<Vec<ManifestWork>, HubError> {
        let list = self
            .works(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| classify_error(e, "ManifestWork", namespace))?;
        Ok(list.items)
    }

    async fn create_work(&self, work: &ManifestWork) -> Result<(), HubError> {
        let location = WorkLocation::of(work);
        self.works(&location.namespace)
            .create(&PostParams::default(), work)
            .await
            .map_err(|e| classify_error(e, "ManifestWork", &location.to_string()))?;
        Ok(())
    }

    async fn replace_work(&self, work: &ManifestWork) -> Result<(), HubError> {
        let location = WorkLocation::of(work);
        self.works(&location.namespace)
            .replace(&work.name_any(), &PostParams::default(), work)
            .await
            .map_err(|e| classify_error(e, "ManifestWork", &location.to_string()))?;
        Ok(())
    }

    async fn delete_work(&self, location: &WorkLocation) -> Result<(), HubError> {
        match self
            .works(&location.namespace)
            .delete(&location.name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match classify_error(e, "ManifestWork", &location.to_string()) {
                HubError::NotFound { .. } => Ok(()),
                other => Err(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;
    use pretty_assertions::assert_eq;

    fn api_error(code: u16, message: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: message.to_string(),
            reason: String::new(),
            code,
        })
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(api_error(404, "not found"), "ManifestWork", "cluster1/work"),
            HubError::NotFound {
                kind: "ManifestWork".to_string(),
                name: "cluster1/work".to_string()
            }
        );
        assert_eq!(
            classify_error(api_error(409, "conflict"), "ManifestWork", "cluster1/work"),
            HubError::Conflict("ManifestWork cluster1/work".to_string())
        );
        assert_eq!(
            classify_error(api_error(503, "unavailable"), "ManagedCluster", "cluster1"),
            HubError::Transient("ManagedCluster cluster1: unavailable (503)".to_string())
        );
        assert_eq!(
            classify_error(api_error(429, "slow down"), "ManagedCluster", "cluster1")
                .is_transient(),
            true
        );
        assert_eq!(
            classify_error(api_error(403, "forbidden"), "ManagedCluster", "cluster1"),
            HubError::Api("ManagedCluster cluster1: forbidden (403)".to_string())
        );
    }

    #[test]
    fn test_work_selector() {
        assert_eq!(
            work_selector(&TargetRef::new("cluster1", "governance-policy-framework")),
            "addon.open-cluster-management.io/addon-name=governance-policy-framework,\
             addon.open-cluster-management.io/addon-namespace=cluster1"
        );
    }
}
