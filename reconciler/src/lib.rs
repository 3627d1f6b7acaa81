mod bundle;
mod config;
pub mod defs;
mod errors;
mod healer;
mod hub;
mod locks;
mod manifest;
#[cfg(any(test, feature = "test-mode"))]
mod memory;
mod namespaces;
mod placement;
mod settings;
mod status;

pub use bundle::{addon_labels, detect_drift, DesiredBundle, Drift, ManifestKey};
pub use config::{
    cluster_on_hub, default_resources, resolve, ConfigIssue, ContainerMatcher, DiagnosticFlags,
    EffectiveConfig, ResourceOverride,
};
pub use errors::{HubError, ReconcileError};
pub use healer::{PassOutcome, SelfHealer, TargetPhase, TargetStatus};
pub use hub::{HubApi, TargetRef, WorkLocation};
pub use locks::TargetLocks;
pub use manifest::{ClusterCapability, ManifestGenerator};
#[cfg(any(test, feature = "test-mode"))]
pub use memory::MemoryHub;
pub use namespaces::{
    delete_option, namespace_rule, namespaces_in, teardown_delete_option, NamespacePlan,
    NamespaceRole, PlannedNamespace,
};
pub use placement::Placement;
pub use settings::EngineSettings;
pub use status::{
    desired_conditions, evaluate, merge_conditions, AddonHealth, WorkloadObservation,
    CONDITION_AVAILABLE, CONDITION_DEGRADED, CONDITION_RECONCILE_ERROR,
};
