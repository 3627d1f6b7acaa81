mod addon;
mod cluster;
mod cluster_management;
mod deployment_config;
mod keys;
mod work;

pub use addon::{AddonCondition, ManagedClusterAddOn, ManagedClusterAddOnSpec, ManagedClusterAddOnStatus};
pub use cluster::{
    parse_minor_version, ManagedCluster, ManagedClusterSpec, ManagedClusterStatus,
    ManagedClusterVersion,
};
pub use cluster_management::{
    ClusterManagementAddOn, ClusterManagementAddOnSpec, ConfigReference, SupportedConfig,
};
pub use deployment_config::{
    AddOnDeploymentConfig, AddOnDeploymentConfigSpec, ContainerResourceRequirements,
    CustomizedVariable, NodePlacement, ResourceRequirements, Toleration,
};
pub use keys::*;
pub use work::{
    DeleteOption, FeedbackRule, FeedbackValue, FieldValue, JsonPath, ManifestCondition,
    ManifestConfig, ManifestResourceMeta, ManifestResourceStatus, ManifestWork, ManifestWorkSpec,
    ManifestWorkStatus, OrphaningRule, ResourceIdentifier, SelectivelyOrphan, StatusFeedback,
    Workload,
};
