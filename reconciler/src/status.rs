use addon_defs::{AddonCondition, ManifestWork};

use crate::config::ConfigIssue;
use crate::errors::ReconcileError;

pub const CONDITION_AVAILABLE: &str = "Available";
pub const CONDITION_DEGRADED: &str = "Degraded";
pub const CONDITION_RECONCILE_ERROR: &str = "ReconcileError";

/// Replica counts the work agent reports back for the addon deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkloadObservation {
    pub replicas: Option<i64>,
    pub available_replicas: Option<i64>,
    pub ready_replicas: Option<i64>,
}

impl WorkloadObservation {
    pub fn from_work(work: &ManifestWork, deployment: &str) -> WorkloadObservation {
        WorkloadObservation {
            replicas: work.feedback_integer("Deployment", deployment, "Replicas"),
            available_replicas: work.feedback_integer(
                "Deployment",
                deployment,
                "AvailableReplicas",
            ),
            ready_replicas: work.feedback_integer("Deployment", deployment, "ReadyReplicas"),
        }
    }

    fn is_reported(&self) -> bool {
        self.replicas.is_some()
            || self.available_replicas.is_some()
            || self.ready_replicas.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonHealth {
    Available,
    Unavailable { message: String },
    /// No feedback from the work agent yet.
    Unknown,
}

/// The addon is available once every desired replica is available and at least
/// one pod passed its readiness gate. Missing counts read as zero.
pub fn evaluate(observation: Option<&WorkloadObservation>) -> AddonHealth {
    let Some(observation) = observation.filter(|o| o.is_reported()) else {
        return AddonHealth::Unknown;
    };
    let replicas = observation.replicas.unwrap_or(0);
    let available = observation.available_replicas.unwrap_or(0);
    let ready = observation.ready_replicas.unwrap_or(0);

    if replicas > 0 && available == replicas && ready >= 1 {
        AddonHealth::Available
    } else {
        AddonHealth::Unavailable {
            message: format!(
                "{} of {} replicas available, {} ready",
                available, replicas, ready
            ),
        }
    }
}

fn condition(type_: &str, status: &str, reason: &str, message: String) -> AddonCondition {
    AddonCondition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message,
        last_transition_time: None,
    }
}

/// The conditions this controller owns, without transition times.
pub fn desired_conditions(
    health: &AddonHealth,
    issues: &[ConfigIssue],
    error: Option<&ReconcileError>,
    paused: bool,
) -> Vec<AddonCondition> {
    let available = match health {
        AddonHealth::Available => condition(
            CONDITION_AVAILABLE,
            "True",
            "DeploymentAvailable",
            "the addon deployment is available".to_string(),
        ),
        AddonHealth::Unavailable { message } => condition(
            CONDITION_AVAILABLE,
            "False",
            "DeploymentUnavailable",
            message.clone(),
        ),
        AddonHealth::Unknown => condition(
            CONDITION_AVAILABLE,
            "Unknown",
            "NoStatusFeedback",
            "waiting for the work agent to report the deployment status".to_string(),
        ),
    };

    let degraded = if issues.is_empty() {
        condition(CONDITION_DEGRADED, "False", "ConfigurationValid", String::new())
    } else {
        condition(
            CONDITION_DEGRADED,
            "True",
            "InvalidConfiguration",
            issues
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<_>>()
                .join("; "),
        )
    };

    let reconcile = match (error, paused) {
        (Some(e), _) => condition(CONDITION_RECONCILE_ERROR, "True", e.reason(), e.to_string()),
        (None, true) => condition(
            CONDITION_RECONCILE_ERROR,
            "False",
            "Paused",
            "drift correction is paused by annotation".to_string(),
        ),
        (None, false) => condition(CONDITION_RECONCILE_ERROR, "False", "Reconciled", String::new()),
    };

    vec![available, degraded, reconcile]
}

/// Applies `desired` onto `existing`. Conditions owned by others are kept, and a
/// condition whose status did not change keeps its transition time.
pub fn merge_conditions(
    existing: &[AddonCondition],
    desired: Vec<AddonCondition>,
    now: &str,
) -> Vec<AddonCondition> {
    let mut merged: Vec<AddonCondition> = existing.to_vec();
    for mut wanted in desired {
        match merged.iter_mut().find(|c| c.type_ == wanted.type_) {
            Some(current) => {
                wanted.last_transition_time = if current.status == wanted.status {
                    current.last_transition_time.clone()
                } else {
                    Some(now.to_string())
                };
                *current = wanted;
            }
            None => {
                wanted.last_transition_time = Some(now.to_string());
                merged.push(wanted);
            }
        }
    }
    merged
}
