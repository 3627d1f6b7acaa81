#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use addon_defs::{
    AddOnDeploymentConfig, AddOnDeploymentConfigSpec, ClusterManagementAddOn,
    ClusterManagementAddOnSpec, ConfigReference, ManagedClusterAddOn, ManifestWork,
    SupportedConfig, ADDON_GROUP, ADDON_NAMESPACE_LABEL, ADDON_NAME_LABEL,
};
use reconciler::{EngineSettings, MemoryHub, PassOutcome, SelfHealer, TargetRef, WorkLocation};
use serde_json::Value;

pub const ADDON: &str = "governance-policy-framework";
pub const INSTALL_NAMESPACE: &str = "open-cluster-management-agent-addon";
pub const POLICY_NAMESPACE: &str = "open-cluster-management-policies";
pub const CONFIG_NAMESPACE: &str = "open-cluster-management";

/// A hub with a self-managed `local-cluster`, a current `cluster1` and an old
/// `cluster2`, plus an engine tuned for fast teardown.
pub struct Scenario {
    pub hub: Arc<MemoryHub>,
    pub healer: SelfHealer<MemoryHub>,
}

pub async fn test_scaffold<F, Fut>(function_to_test: F)
where
    F: FnOnce(Scenario) -> Fut,
    Fut: Future<Output = ()>,
{
    let hub = Arc::new(MemoryHub::new());
    hub.add_cluster("local-cluster", "v1.30.4");
    hub.add_cluster("cluster1", "v1.29.3");
    hub.add_cluster("cluster2", "v1.19.16");

    let settings = EngineSettings {
        teardown_timeout: Duration::from_millis(300),
        teardown_poll_interval: Duration::from_millis(10),
        conflict_backoff: Duration::from_millis(1),
        ..Default::default()
    };
    let healer = SelfHealer::new(hub.clone(), settings);

    // Perform function tests here
    function_to_test(Scenario { hub, healer }).await;
}

impl Scenario {
    pub fn target(&self, cluster: &str) -> TargetRef {
        TargetRef::new(cluster, ADDON)
    }

    pub fn enable_addon(&self, cluster: &str, annotations: &[(&str, &str)]) {
        let mut addon = ManagedClusterAddOn::new(ADDON, Default::default());
        addon.metadata.namespace = Some(cluster.to_string());
        addon.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self.hub.put_addon(addon);
    }

    /// Binds an AddOnDeploymentConfig to the addon template.
    pub fn bind_deployment_config(&self, spec: AddOnDeploymentConfigSpec) {
        let mut config = AddOnDeploymentConfig::new(ADDON, spec);
        config.metadata.namespace = Some(CONFIG_NAMESPACE.to_string());
        self.hub.put_deployment_config(config);

        self.hub.put_cluster_management_addon(ClusterManagementAddOn::new(
            ADDON,
            ClusterManagementAddOnSpec {
                supported_configs: vec![SupportedConfig {
                    group: ADDON_GROUP.to_string(),
                    resource: "addondeploymentconfigs".to_string(),
                    default_config: Some(ConfigReference {
                        name: ADDON.to_string(),
                        namespace: CONFIG_NAMESPACE.to_string(),
                    }),
                }],
            },
        ));
    }

    pub async fn reconcile(&self, cluster: &str) -> PassOutcome {
        self.healer.reconcile(&self.target(cluster)).await.unwrap()
    }

    /// Reconciles until a pass makes no writes.
    pub async fn settle(&self, cluster: &str) -> PassOutcome {
        for _ in 0..5 {
            let outcome = self.reconcile(cluster).await;
            if outcome.writes == 0 {
                return outcome;
            }
        }
        panic!("{} did not settle", cluster);
    }

    pub fn standard_location(&self, cluster: &str) -> WorkLocation {
        WorkLocation {
            namespace: cluster.to_string(),
            name: format!("addon-{}-deploy-0", ADDON),
        }
    }

    pub fn hosted_location(&self, cluster: &str, hosting: &str) -> WorkLocation {
        WorkLocation {
            namespace: hosting.to_string(),
            name: format!("addon-{}-deploy-hosting-{}-0", ADDON, cluster),
        }
    }

    /// The live bundle of the cluster's addon, wherever it is placed.
    pub fn bundle(&self, cluster: &str) -> Option<ManifestWork> {
        self.hub.works().into_iter().find(|w| {
            let labels = w.metadata.labels.clone().unwrap_or_default();
            labels.get(ADDON_NAME_LABEL).map(String::as_str) == Some(ADDON)
                && labels.get(ADDON_NAMESPACE_LABEL).map(String::as_str) == Some(cluster)
        })
    }

    pub fn manifest(&self, cluster: &str, kind: &str) -> Value {
        let bundle = self
            .bundle(cluster)
            .unwrap_or_else(|| panic!("no bundle for {}", cluster));
        bundle
            .manifests()
            .iter()
            .find(|m| m["kind"] == kind)
            .cloned()
            .unwrap_or_else(|| panic!("no {} in the bundle for {}", kind, cluster))
    }

    pub fn container(&self, cluster: &str) -> Value {
        self.manifest(cluster, "Deployment")["spec"]["template"]["spec"]["containers"][0].clone()
    }

    pub fn replicas(&self, cluster: &str) -> i64 {
        self.manifest(cluster, "Deployment")["spec"]["replicas"]
            .as_i64()
            .unwrap_or_default()
    }

    pub fn args(&self, cluster: &str) -> Vec<String> {
        self.container(cluster)["args"]
            .as_array()
            .map(|args| {
                args.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn namespaces_in_bundle(&self, cluster: &str) -> Vec<String> {
        self.bundle(cluster)
            .map(|w| reconciler::namespaces_in(&w))
            .unwrap_or_default()
    }
}
