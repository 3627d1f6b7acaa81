use thiserror::Error;

/// Failures talking to the hub API server.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    #[error("{kind} {name} was not found")]
    NotFound { kind: String, name: String },

    #[error("Conflicting write to {0}, the object was modified concurrently")]
    Conflict(String),

    #[error("Transient API error: {0}")]
    Transient(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Failed to (de)serialize {0}")]
    Serialization(String),
}

impl HubError {
    pub fn is_transient(&self) -> bool {
        matches!(self, HubError::Conflict(_) | HubError::Transient(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("AddOnDeploymentConfig {namespace}/{name} referenced by ClusterManagementAddOn {addon} does not exist")]
    MissingDeploymentConfig {
        addon: String,
        namespace: String,
        name: String,
    },

    #[error("Cannot determine the Kubernetes version of cluster {cluster}: {reason}")]
    CapabilityUnknown { cluster: String, reason: String },

    #[error("The addon is deployed as {live} but is now requested as {requested}; delete and recreate the ManagedClusterAddOn to switch modes")]
    PlacementChanged { live: String, requested: String },

    #[error("Timed out after {seconds}s waiting for ManifestWork {namespace}/{name} to be removed")]
    TeardownTimeout {
        namespace: String,
        name: String,
        seconds: u64,
    },

    #[error("Gave up writing ManifestWork {0} after repeated conflicts")]
    ConflictRetriesExhausted(String),

    #[error(transparent)]
    Hub(#[from] HubError),
}

impl ReconcileError {
    /// Transient errors are retried with backoff, the others wait for an input to change.
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Hub(e) => e.is_transient(),
            ReconcileError::TeardownTimeout { .. }
            | ReconcileError::ConflictRetriesExhausted(_) => true,
            _ => false,
        }
    }

    /// Short CamelCase reason used in addon status conditions.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::MissingDeploymentConfig { .. } => "DeploymentConfigNotFound",
            ReconcileError::CapabilityUnknown { .. } => "ClusterVersionUnknown",
            ReconcileError::PlacementChanged { .. } => "PlacementChanged",
            ReconcileError::TeardownTimeout { .. } => "TeardownTimeout",
            ReconcileError::ConflictRetriesExhausted(_) => "WriteConflict",
            ReconcileError::Hub(_) => "HubUnavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_transient_classification() {
        assert_eq!(
            ReconcileError::Hub(HubError::Conflict("cluster1/work".into())).is_transient(),
            true
        );
        assert_eq!(
            ReconcileError::Hub(HubError::Api("forbidden".into())).is_transient(),
            false
        );
        assert_eq!(
            ReconcileError::MissingDeploymentConfig {
                addon: "a".into(),
                namespace: "b".into(),
                name: "c".into()
            }
            .is_transient(),
            false
        );
        assert_eq!(
            ReconcileError::TeardownTimeout {
                namespace: "cluster1".into(),
                name: "work".into(),
                seconds: 1
            }
            .is_transient(),
            true
        );
    }
}
