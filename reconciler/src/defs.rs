pub const DEFAULT_ADDON_NAME: &str = "governance-policy-framework";
pub const CONTROLLER_NAME: &str = "governance-policy-addon-controller";

pub const DEFAULT_INSTALL_NAMESPACE: &str = "open-cluster-management-agent-addon";
pub const POLICY_NAMESPACE: &str = "open-cluster-management-policies";
pub const HOSTED_NAMESPACE_SUFFIX: &str = "-hosted";

pub const DEFAULT_IMAGE: &str =
    "quay.io/open-cluster-management/governance-policy-framework-addon:latest";

pub const POLICY_GROUP: &str = "policy.open-cluster-management.io";
pub const POLICY_CRD_NAME: &str = "policies.policy.open-cluster-management.io";

pub const DEFAULT_EVALUATION_CONCURRENCY: u8 = 2;
pub const DEFAULT_CLIENT_QPS: u32 = 30;
pub const DEFAULT_CLIENT_BURST: u32 = 45;

pub const DEFAULT_MEMORY_REQUEST: &str = "64Mi";
pub const DEFAULT_MEMORY_LIMIT: &str = "512Mi";

/// Clusters from this minor version on support startup probes.
pub const STARTUP_PROBE_MIN_MINOR: u32 = 20;
pub const LIVENESS_INITIAL_DELAY_SECONDS: i32 = 300;
pub const HEALTH_PORT: i32 = 8081;

pub const HUB_KUBECONFIG_MOUNT: &str = "/var/run/klusterlet";
pub const MANAGED_KUBECONFIG_MOUNT: &str = "/var/run/managed-kubeconfig";

// Customized variables understood on an AddOnDeploymentConfig
pub const VAR_LOG_LEVEL: &str = "logLevel";
pub const VAR_EVALUATION_CONCURRENCY: &str = "evaluationConcurrency";
pub const VAR_CLIENT_QPS: &str = "clientQPS";
pub const VAR_CLIENT_BURST: &str = "clientBurst";
pub const VAR_ON_MULTICLUSTER_HUB: &str = "onMulticlusterHub";
pub const VAR_INSTALL_NAMESPACE_EXTERNALLY_MANAGED: &str = "installNamespaceExternallyManaged";
