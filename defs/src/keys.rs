// Annotation, label and finalizer keys shared by the hub objects the controller reads and writes.

pub const ADDON_GROUP: &str = "addon.open-cluster-management.io";
pub const CLUSTER_GROUP: &str = "cluster.open-cluster-management.io";
pub const WORK_GROUP: &str = "work.open-cluster-management.io";

/// Names the cluster whose hub namespace hosts the workload in hosted mode.
pub const HOSTING_CLUSTER_ANNOTATION: &str = "addon.open-cluster-management.io/hosting-cluster-name";
pub const ON_MULTICLUSTER_HUB_ANNOTATION: &str =
    "addon.open-cluster-management.io/on-multicluster-hub";
/// Helm-values style JSON document attached to a ManagedClusterAddOn.
pub const VALUES_ANNOTATION: &str = "addon.open-cluster-management.io/values";
pub const SYNC_POLICIES_ON_HUB_ANNOTATION: &str =
    "policy.open-cluster-management.io/sync-policies-on-multicluster-hub";
pub const PAUSE_ANNOTATION: &str = "policy-addon-pause";

pub const LOG_LEVEL_ANNOTATION: &str = "log-level";
pub const EVALUATION_CONCURRENCY_ANNOTATION: &str = "policy-evaluation-concurrency";
pub const CLIENT_QPS_ANNOTATION: &str = "client-qps";
pub const CLIENT_BURST_ANNOTATION: &str = "client-burst";

pub const ADDON_NAME_LABEL: &str = "addon.open-cluster-management.io/addon-name";
pub const ADDON_NAMESPACE_LABEL: &str = "addon.open-cluster-management.io/addon-namespace";

pub const ADDON_FINALIZER: &str = "policy.open-cluster-management.io/addon-cleanup";

/// Objects carrying this annotation are left in place when the work applying them is deleted.
pub const DELETION_ORPHAN_ANNOTATION: &str = "addon.open-cluster-management.io/deletion-orphan";
