use std::collections::HashMap;
use std::sync::Arc;

use addon_defs::{
    AddOnDeploymentConfig, ManagedCluster, ManagedClusterAddOn, ManagedClusterAddOnStatus,
    ManifestWork, ADDON_FINALIZER,
};
use addon_utils::get_timestamp;
use futures::future::join_all;
use kube::ResourceExt;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::bundle::{detect_drift, DesiredBundle, Drift, ManifestKey};
use crate::config::{cluster_on_hub, resolve, ConfigIssue};
use crate::errors::{HubError, ReconcileError};
use crate::hub::{HubApi, TargetRef, WorkLocation};
use crate::locks::TargetLocks;
use crate::manifest::{ClusterCapability, ManifestGenerator};
use crate::namespaces::{namespaces_in, teardown_delete_option, NamespacePlan};
use crate::placement::Placement;
use crate::settings::EngineSettings;
use crate::status::{
    desired_conditions, evaluate, merge_conditions, AddonHealth, WorkloadObservation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TargetPhase {
    Absent,
    Reconciling,
    Steady,
    Paused,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PassOutcome {
    pub phase: TargetPhase,
    /// Writes made to the hub, bundle and addon status included.
    pub writes: usize,
    pub drift: Vec<Drift>,
    pub health: AddonHealth,
    pub issues: Vec<ConfigIssue>,
}

/// Last known state of a target, served to pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatus {
    pub phase: TargetPhase,
    pub available: bool,
    pub paused: bool,
    pub work: Option<WorkLocation>,
    pub issues: Vec<String>,
    pub last_error: Option<String>,
    pub last_drift: Vec<String>,
    pub updated_at: String,
}

struct Convergence {
    writes: usize,
    drift: Vec<Drift>,
    observation: Option<WorkloadObservation>,
    paused: bool,
}

struct Resolved {
    desired: DesiredBundle,
    deployment: String,
    issues: Vec<ConfigIssue>,
}

/// Drives every target of one addon towards its desired bundle.
pub struct SelfHealer<H: HubApi> {
    hub: Arc<H>,
    settings: EngineSettings,
    locks: TargetLocks,
    records: Mutex<HashMap<TargetRef, TargetStatus>>,
}

impl<H: HubApi> SelfHealer<H> {
    pub fn new(hub: Arc<H>, settings: EngineSettings) -> Self {
        SelfHealer {
            hub,
            settings,
            locks: TargetLocks::new(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn hub(&self) -> &Arc<H> {
        &self.hub
    }

    /// Runs one read-compute-write pass for the target. Passes for the same
    /// target never overlap.
    pub async fn reconcile(&self, target: &TargetRef) -> Result<PassOutcome, ReconcileError> {
        let guard = self.locks.acquire(target).await;
        let result = self.pass(target).await;
        self.record(target, &result).await;
        drop(guard);

        if matches!(&result, Ok(outcome) if outcome.phase == TargetPhase::Absent) {
            self.locks.forget(target).await;
        }
        result
    }

    /// All targets of the addon, as found on the hub.
    pub async fn targets(&self) -> Result<Vec<TargetRef>, ReconcileError> {
        let addons = self.hub.list_addons(&self.settings.addon_name).await?;
        let mut targets: Vec<TargetRef> = addons
            .iter()
            .map(|a| TargetRef::new(a.cluster_name(), a.name_any()))
            .collect();
        targets.sort();
        Ok(targets)
    }

    /// One pass over every target, concurrently. A failing target does not stop the others.
    pub async fn reconcile_all(
        &self,
    ) -> Result<Vec<(TargetRef, Result<PassOutcome, ReconcileError>)>, ReconcileError> {
        let targets = self.targets().await?;
        let results = join_all(targets.iter().map(|t| self.reconcile(t))).await;
        Ok(targets.into_iter().zip(results).collect())
    }

    /// The bundle currently on the hub for the target.
    pub async fn live_bundle(
        &self,
        target: &TargetRef,
    ) -> Result<Option<ManifestWork>, ReconcileError> {
        let works = self.hub.list_addon_works(target).await?;
        Ok(works
            .into_iter()
            .find(|w| w.metadata.deletion_timestamp.is_none()))
    }

    pub async fn status(&self, target: &TargetRef) -> Option<TargetStatus> {
        self.records.lock().await.get(target).cloned()
    }

    pub async fn statuses(&self) -> Vec<(TargetRef, TargetStatus)> {
        let records = self.records.lock().await;
        let mut all: Vec<(TargetRef, TargetStatus)> =
            records.iter().map(|(t, s)| (t.clone(), s.clone())).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    async fn pass(&self, target: &TargetRef) -> Result<PassOutcome, ReconcileError> {
        let Some(addon) = self.hub.get_addon(target).await? else {
            return self.teardown(target, None).await;
        };
        if addon.is_being_deleted() {
            return self.teardown(target, Some(&addon)).await;
        }

        let mut writes = self.ensure_finalizer(target, &addon).await?;

        let resolved = match self.resolve_bundle(target, &addon).await {
            Ok(resolved) => resolved,
            Err(e) => {
                // The previous bundle stays in place
                self.report_failure(target, &addon, &e).await;
                return Err(e);
            }
        };

        let convergence = if addon.is_paused() {
            self.observe_paused(&resolved).await?
        } else {
            match self.converge(target, &resolved).await {
                Ok(c) => c,
                Err(e) => {
                    self.report_failure(target, &addon, &e).await;
                    return Err(e);
                }
            }
        };
        writes += convergence.writes;

        let health = evaluate(convergence.observation.as_ref());
        writes += self
            .write_status(
                target,
                &addon,
                &health,
                &resolved.issues,
                None,
                convergence.paused,
            )
            .await?;

        let phase = if convergence.paused {
            TargetPhase::Paused
        } else if convergence.writes > 0 {
            TargetPhase::Reconciling
        } else {
            TargetPhase::Steady
        };
        Ok(PassOutcome {
            phase,
            writes,
            drift: convergence.drift,
            health,
            issues: resolved.issues,
        })
    }

    async fn ensure_finalizer(
        &self,
        target: &TargetRef,
        addon: &ManagedClusterAddOn,
    ) -> Result<usize, ReconcileError> {
        if addon.finalizers().iter().any(|f| f == ADDON_FINALIZER) {
            return Ok(0);
        }
        let mut finalizers = addon.finalizers().to_vec();
        finalizers.push(ADDON_FINALIZER.to_string());
        self.hub.set_addon_finalizers(target, finalizers).await?;
        debug!("Added finalizer to addon {}", target);
        Ok(1)
    }

    async fn deployment_config(
        &self,
        target: &TargetRef,
    ) -> Result<Option<AddOnDeploymentConfig>, ReconcileError> {
        let Some(cma) = self
            .hub
            .get_cluster_management_addon(&target.addon)
            .await?
        else {
            return Ok(None);
        };
        let Some(reference) = cma.deployment_config_ref() else {
            return Ok(None);
        };
        match self
            .hub
            .get_deployment_config(&reference.namespace, &reference.name)
            .await?
        {
            Some(config) => Ok(Some(config)),
            None => Err(ReconcileError::MissingDeploymentConfig {
                addon: target.addon.clone(),
                namespace: reference.namespace.clone(),
                name: reference.name.clone(),
            }),
        }
    }

    /// Recomputes the desired bundle from the current inputs.
    async fn resolve_bundle(
        &self,
        target: &TargetRef,
        addon: &ManagedClusterAddOn,
    ) -> Result<Resolved, ReconcileError> {
        let cluster = self.hub.get_cluster(&target.cluster).await?;
        let deployment_config = self.deployment_config(target).await?;
        let config = resolve(addon, cluster.as_ref(), deployment_config.as_ref());
        for issue in &config.issues {
            warn!("Addon {} has an invalid setting: {}", target, issue);
        }

        let placement = Placement::resolve(addon, &config);
        let execution_cluster: Option<ManagedCluster> = if placement.is_hosted() {
            self.hub.get_cluster(placement.execution_cluster()).await?
        } else {
            cluster
        };
        let capability = ClusterCapability::from_cluster(
            placement.execution_cluster(),
            execution_cluster.as_ref(),
        )?;

        let namespaces = NamespacePlan::for_target(&placement, &config);
        let generator = ManifestGenerator {
            addon_name: &target.addon,
            image: &self.settings.image,
            config: &config,
            placement: &placement,
            capability,
        };
        let desired = DesiredBundle::build(target, &generator, &namespaces)?;
        let deployment = generator.deployment_name().to_string();

        self.check_placement(target, &desired, &placement).await?;

        Ok(Resolved {
            desired,
            deployment,
            issues: config.issues,
        })
    }

    /// A bundle left at another location means the mode changed under a live addon.
    async fn check_placement(
        &self,
        target: &TargetRef,
        desired: &DesiredBundle,
        placement: &Placement,
    ) -> Result<(), ReconcileError> {
        let works = self.hub.list_addon_works(target).await?;
        for work in works {
            if work.metadata.deletion_timestamp.is_some() {
                continue;
            }
            let location = WorkLocation::of(&work);
            if location != desired.location {
                let live = if location.name.contains("-deploy-hosting-") {
                    format!("hosted mode on {}", location.namespace)
                } else {
                    format!("standard mode on {}", location.namespace)
                };
                return Err(ReconcileError::PlacementChanged {
                    live,
                    requested: placement.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn observe_paused(&self, resolved: &Resolved) -> Result<Convergence, ReconcileError> {
        let live = self.hub.get_work(&resolved.desired.location).await?;
        let drift = match &live {
            Some(work) => detect_drift(&resolved.desired, work),
            None => missing_all(&resolved.desired),
        };
        if !drift.is_empty() {
            info!(
                "Bundle {} has drifted but reconciliation is paused",
                resolved.desired.location
            );
        }
        Ok(Convergence {
            writes: 0,
            drift,
            observation: live
                .as_ref()
                .map(|w| WorkloadObservation::from_work(w, &resolved.deployment)),
            paused: true,
        })
    }

    /// Re-reads the live bundle, diffs, and writes until the write sticks.
    /// Conflicts restart from a fresh read.
    async fn converge(
        &self,
        target: &TargetRef,
        resolved: &Resolved,
    ) -> Result<Convergence, ReconcileError> {
        let desired = &resolved.desired;
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                // No new corrective write once a pause is observed
                let addon = self.hub.get_addon(target).await?;
                if addon.map(|a| a.is_paused()).unwrap_or(true) {
                    return self.observe_paused(resolved).await;
                }
            }

            let live = self.hub.get_work(&desired.location).await?;
            let observation = live
                .as_ref()
                .map(|w| WorkloadObservation::from_work(w, &resolved.deployment));

            let (drift, result) = match &live {
                None => {
                    info!("Creating bundle {} for {}", desired.location, target);
                    (
                        missing_all(desired),
                        self.hub.create_work(&desired.to_manifest_work()).await,
                    )
                }
                Some(work) => {
                    let drift = detect_drift(desired, work);
                    if drift.is_empty() {
                        return Ok(Convergence {
                            writes: 0,
                            drift,
                            observation,
                            paused: false,
                        });
                    }
                    for d in &drift {
                        info!("Correcting bundle {}: {}", desired.location, d);
                    }
                    (drift, self.hub.replace_work(&desired.apply_to(work)).await)
                }
            };

            match result {
                Ok(()) => {
                    return Ok(Convergence {
                        writes: 1,
                        drift,
                        observation,
                        paused: false,
                    })
                }
                Err(HubError::Conflict(msg)) if attempt < self.settings.conflict_retries => {
                    debug!("Conflict writing {}: {}, retrying", desired.location, msg);
                    tokio::time::sleep(self.settings.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(HubError::Conflict(_)) => {
                    return Err(ReconcileError::ConflictRetriesExhausted(
                        desired.location.to_string(),
                    ))
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Removes every bundle of the target and waits for each to disappear,
    /// then releases the addon.
    async fn teardown(
        &self,
        target: &TargetRef,
        addon: Option<&ManagedClusterAddOn>,
    ) -> Result<PassOutcome, ReconcileError> {
        let works = self.hub.list_addon_works(target).await?;
        let mut writes = 0;

        if !works.is_empty() {
            info!("Removing {} bundle(s) of {}", works.len(), target);
            let cluster = self.hub.get_cluster(&target.cluster).await?;
            let orphan_preference = match addon {
                Some(addon) => {
                    // A missing config must not block removal
                    let deployment_config =
                        self.deployment_config(target).await.unwrap_or_else(|e| {
                            warn!("Ignoring deployment config for teardown of {}: {}", target, e);
                            None
                        });
                    resolve(addon, cluster.as_ref(), deployment_config.as_ref())
                        .orphan_preference()
                }
                None => cluster_on_hub(cluster.as_ref()),
            };

            for work in works {
                let location = WorkLocation::of(&work);
                if work.metadata.deletion_timestamp.is_none() {
                    let keep = orphan_preference
                        || self.cluster_namespace_shared(&work, &target.cluster).await?;
                    let delete_option = teardown_delete_option(&work, &target.cluster, keep);
                    if work.spec.delete_option.as_ref() != Some(&delete_option) {
                        let mut updated = work.clone();
                        updated.spec.delete_option = Some(delete_option);
                        self.hub.replace_work(&updated).await?;
                        writes += 1;
                    }
                    self.hub.delete_work(&location).await?;
                    writes += 1;
                }
                self.wait_for_removal(&location).await?;
                info!("Bundle {} removed", location);
            }
        }

        if let Some(addon) = addon {
            if addon.finalizers().iter().any(|f| f == ADDON_FINALIZER) {
                let finalizers: Vec<String> = addon
                    .finalizers()
                    .iter()
                    .filter(|f| f.as_str() != ADDON_FINALIZER)
                    .cloned()
                    .collect();
                self.hub.set_addon_finalizers(target, finalizers).await?;
                writes += 1;
            }
        }

        Ok(PassOutcome {
            phase: TargetPhase::Absent,
            writes,
            drift: Vec::new(),
            health: AddonHealth::Unknown,
            issues: Vec::new(),
        })
    }

    /// Other works in the same hub namespace also carry the cluster-identity namespace.
    async fn cluster_namespace_shared(
        &self,
        work: &ManifestWork,
        cluster_namespace: &str,
    ) -> Result<bool, ReconcileError> {
        if !namespaces_in(work).iter().any(|n| n == cluster_namespace) {
            return Ok(false);
        }
        let location = WorkLocation::of(work);
        let neighbours = self.hub.list_works_in(&location.namespace).await?;
        Ok(neighbours.iter().any(|other| {
            other.metadata.name.as_deref() != Some(location.name.as_str())
                && other.metadata.deletion_timestamp.is_none()
                && namespaces_in(other).iter().any(|n| n == cluster_namespace)
        }))
    }

    async fn wait_for_removal(&self, location: &WorkLocation) -> Result<(), ReconcileError> {
        let timeout = self.settings.teardown_timeout;
        match tokio::time::timeout(timeout, self.poll_until_gone(location)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::TeardownTimeout {
                namespace: location.namespace.clone(),
                name: location.name.clone(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    async fn poll_until_gone(&self, location: &WorkLocation) -> Result<(), ReconcileError> {
        loop {
            if self.hub.get_work(location).await?.is_none() {
                return Ok(());
            }
            tokio::time::sleep(self.settings.teardown_poll_interval).await;
        }
    }

    /// Writes the addon conditions if they changed. Returns the number of writes.
    async fn write_status(
        &self,
        target: &TargetRef,
        addon: &ManagedClusterAddOn,
        health: &AddonHealth,
        issues: &[ConfigIssue],
        error: Option<&ReconcileError>,
        paused: bool,
    ) -> Result<usize, ReconcileError> {
        let existing = addon
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default();
        let merged = merge_conditions(
            &existing,
            desired_conditions(health, issues, error, paused),
            &get_timestamp(),
        );
        if merged == existing {
            return Ok(0);
        }
        self.hub
            .update_addon_status(target, ManagedClusterAddOnStatus { conditions: merged })
            .await?;
        Ok(1)
    }

    async fn report_failure(
        &self,
        target: &TargetRef,
        addon: &ManagedClusterAddOn,
        error: &ReconcileError,
    ) {
        warn!("Reconciliation of {} failed: {}", target, error);
        let observation = match self.live_bundle(target).await {
            Ok(Some(work)) => Some(WorkloadObservation::from_work(&work, &target.addon)),
            _ => None,
        };
        let health = evaluate(observation.as_ref());
        if let Err(e) = self
            .write_status(target, addon, &health, &[], Some(error), addon.is_paused())
            .await
        {
            warn!("Could not record the failure on {}: {}", target, e);
        }
    }

    /// Keeps the last known status of live targets. A removed target, or a
    /// cluster that never had the addon, leaves no record behind.
    async fn record(&self, target: &TargetRef, result: &Result<PassOutcome, ReconcileError>) {
        let work = match result {
            Ok(outcome) if outcome.phase == TargetPhase::Absent => {
                self.records.lock().await.remove(target);
                return;
            }
            Ok(_) => self.current_location(target).await,
            Err(_) => None,
        };

        let mut records = self.records.lock().await;
        let status = match result {
            Ok(outcome) => TargetStatus {
                phase: outcome.phase,
                available: outcome.health == AddonHealth::Available,
                paused: outcome.phase == TargetPhase::Paused,
                work,
                issues: outcome.issues.iter().map(|i| i.to_string()).collect(),
                last_error: None,
                last_drift: outcome.drift.iter().map(|d| d.to_string()).collect(),
                updated_at: get_timestamp(),
            },
            Err(e) => {
                let mut status = records.get(target).cloned().unwrap_or(TargetStatus {
                    phase: TargetPhase::Reconciling,
                    available: false,
                    paused: false,
                    work: None,
                    issues: Vec::new(),
                    last_error: None,
                    last_drift: Vec::new(),
                    updated_at: String::new(),
                });
                status.last_error = Some(e.to_string());
                status.updated_at = get_timestamp();
                status
            }
        };
        records.insert(target.clone(), status);
    }

    async fn current_location(&self, target: &TargetRef) -> Option<WorkLocation> {
        match self.live_bundle(target).await {
            Ok(work) => work.as_ref().map(WorkLocation::of),
            Err(_) => None,
        }
    }
}

fn missing_all(desired: &DesiredBundle) -> Vec<Drift> {
    desired
        .manifests
        .iter()
        .map(|m| Drift::Missing(ManifestKey::of(m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use addon_defs::PAUSE_ANNOTATION;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    const ADDON: &str = "governance-policy-framework";

    fn setup() -> (Arc<MemoryHub>, SelfHealer<MemoryHub>, TargetRef) {
        let hub = Arc::new(MemoryHub::new());
        hub.add_cluster("cluster1", "v1.29.3");
        let mut addon = ManagedClusterAddOn::new(ADDON, Default::default());
        addon.metadata.namespace = Some("cluster1".to_string());
        hub.put_addon(addon);
        let settings = EngineSettings {
            teardown_timeout: Duration::from_millis(200),
            teardown_poll_interval: Duration::from_millis(10),
            conflict_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let healer = SelfHealer::new(hub.clone(), settings);
        (hub, healer, TargetRef::new("cluster1", ADDON))
    }

    fn location() -> WorkLocation {
        WorkLocation {
            namespace: "cluster1".to_string(),
            name: format!("addon-{}-deploy-0", ADDON),
        }
    }

    async fn settle(healer: &SelfHealer<MemoryHub>, target: &TargetRef) -> PassOutcome {
        for _ in 0..5 {
            let outcome = healer.reconcile(target).await.unwrap();
            if outcome.writes == 0 {
                return outcome;
            }
        }
        panic!("target did not settle");
    }

    #[tokio::test]
    async fn test_first_pass_creates_bundle() {
        let (hub, healer, target) = setup();
        let outcome = healer.reconcile(&target).await.unwrap();
        assert_eq!(outcome.phase, TargetPhase::Reconciling);

        let work = hub.work(&location()).unwrap();
        assert_eq!(work.manifests().len(), 10);
        assert_eq!(
            hub.addon(&target).unwrap().metadata.finalizers,
            Some(vec![ADDON_FINALIZER.to_string()])
        );
        assert!(hub.has_object(
            "cluster1",
            "Deployment",
            "open-cluster-management-agent-addon",
            ADDON
        ));
    }

    #[tokio::test]
    async fn test_steady_target_makes_no_writes() {
        let (hub, healer, target) = setup();
        let outcome = settle(&healer, &target).await;
        assert_eq!(outcome.phase, TargetPhase::Steady);
        assert_eq!(outcome.health, AddonHealth::Available);

        let before = hub.write_count();
        healer.reconcile(&target).await.unwrap();
        assert_eq!(hub.write_count(), before);
        assert_eq!(healer.status(&target).await.unwrap().available, true);
    }

    #[tokio::test]
    async fn test_drift_is_reverted_unless_paused() {
        let (hub, healer, target) = setup();
        settle(&healer, &target).await;
        let extra = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "extra", "namespace": "default"}});

        hub.annotate_addon(&target, PAUSE_ANNOTATION, Some("true"));
        hub.patch_work_manifests(&location(), |m| m.push(extra.clone()));
        let outcome = healer.reconcile(&target).await.unwrap();
        assert_eq!(outcome.phase, TargetPhase::Paused);
        assert_eq!(hub.work(&location()).unwrap().manifests().len(), 11);

        hub.annotate_addon(&target, PAUSE_ANNOTATION, None);
        let outcome = healer.reconcile(&target).await.unwrap();
        assert_eq!(outcome.phase, TargetPhase::Reconciling);
        assert_eq!(hub.work(&location()).unwrap().manifests().len(), 10);
        assert_eq!(hub.has_object("cluster1", "ConfigMap", "default", "extra"), false);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let (hub, healer, target) = setup();
        settle(&healer, &target).await;
        hub.patch_work_manifests(&location(), |m| {
            m.pop();
        });
        hub.conflict_next_replaces(2);
        healer.reconcile(&target).await.unwrap();
        assert_eq!(hub.work(&location()).unwrap().manifests().len(), 10);

        hub.patch_work_manifests(&location(), |m| {
            m.pop();
        });
        hub.conflict_next_replaces(10);
        assert_eq!(
            healer.reconcile(&target).await,
            Err(ReconcileError::ConflictRetriesExhausted(location().to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_version_blocks_generation() {
        let (hub, healer, target) = setup();
        hub.add_cluster("cluster1", "");
        let err = healer.reconcile(&target).await.unwrap_err();
        assert_eq!(err.reason(), "ClusterVersionUnknown");
        assert_eq!(hub.work(&location()), None);
        let condition = hub
            .addon(&target)
            .unwrap()
            .condition("ReconcileError")
            .cloned()
            .unwrap();
        assert_eq!(condition.status, "True");
        assert_eq!(
            healer.status(&target).await.unwrap().last_error.is_some(),
            true
        );
    }

    #[tokio::test]
    async fn test_teardown_removes_bundle_and_finalizer() {
        let (hub, healer, target) = setup();
        settle(&healer, &target).await;
        hub.delete_addon(&target);

        let outcome = healer.reconcile(&target).await.unwrap();
        assert_eq!(outcome.phase, TargetPhase::Absent);
        assert_eq!(hub.work(&location()), None);
        assert_eq!(hub.addon(&target), None);
        assert_eq!(hub.has_namespace("cluster1", "cluster1"), false);
        assert_eq!(
            hub.has_namespace("cluster1", "open-cluster-management-agent-addon"),
            true
        );
    }

    #[tokio::test]
    async fn test_absent_targets_leave_no_status() {
        let (hub, healer, target) = setup();
        let stranger = TargetRef::new("cluster2", ADDON);
        let outcome = healer.reconcile(&stranger).await.unwrap();
        assert_eq!(outcome.phase, TargetPhase::Absent);
        assert_eq!(healer.status(&stranger).await, None);

        settle(&healer, &target).await;
        assert_eq!(healer.statuses().await.len(), 1);
        hub.delete_addon(&target);
        healer.reconcile(&target).await.unwrap();
        assert_eq!(healer.status(&target).await, None);
        assert_eq!(healer.statuses().await, vec![]);
    }

    #[tokio::test]
    async fn test_teardown_times_out_while_work_lingers() {
        let (hub, healer, target) = setup();
        settle(&healer, &target).await;
        hub.hold_work_deletion(true);
        hub.delete_addon(&target);

        let err = healer.reconcile(&target).await.unwrap_err();
        assert!(matches!(err, ReconcileError::TeardownTimeout { .. }));
        assert_eq!(err.is_transient(), true);
        assert!(hub.addon(&target).is_some());

        hub.release_work_deletions();
        let outcome = healer.reconcile(&target).await.unwrap();
        assert_eq!(outcome.phase, TargetPhase::Absent);
        assert_eq!(hub.addon(&target), None);
    }
}
