use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use addon_defs::{
    AddOnDeploymentConfig, ClusterManagementAddOn, FeedbackValue, FieldValue, ManagedCluster,
    ManagedClusterAddOn, ManagedClusterAddOnStatus, ManagedClusterStatus, ManagedClusterVersion,
    ManifestCondition, ManifestResourceMeta, ManifestResourceStatus, ManifestWork,
    ManifestWorkStatus, StatusFeedback, ADDON_NAMESPACE_LABEL, ADDON_NAME_LABEL,
    DELETION_ORPHAN_ANNOTATION,
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use serde_json::Value;

use crate::bundle::ManifestKey;
use crate::errors::HubError;
use crate::hub::{HubApi, TargetRef, WorkLocation};

/// An object the simulated work agent applied on a cluster.
#[derive(Debug, Clone, Default)]
struct AppliedObject {
    owners: BTreeSet<WorkLocation>,
}

#[derive(Default)]
struct State {
    addons: BTreeMap<(String, String), ManagedClusterAddOn>,
    clusters: BTreeMap<String, ManagedCluster>,
    cluster_management_addons: BTreeMap<String, ClusterManagementAddOn>,
    deployment_configs: BTreeMap<(String, String), AddOnDeploymentConfig>,
    works: BTreeMap<WorkLocation, ManifestWork>,
    /// Objects on each execution cluster, keyed by cluster name.
    applied: BTreeMap<String, BTreeMap<ManifestKey, AppliedObject>>,
    version: u64,
    writes: usize,
    pending_conflicts: usize,
    hold_deletions: bool,
    auto_ready: bool,
    unavailable_clusters: BTreeSet<String>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// A hub kept in memory, with a work agent that applies bundles to simulated
/// clusters as soon as they are written.
pub struct MemoryHub {
    state: Mutex<State>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        MemoryHub {
            state: Mutex::new(State {
                auto_ready: true,
                ..Default::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn put_addon(&self, mut addon: ManagedClusterAddOn) {
        let mut state = self.state();
        let key = (
            addon.metadata.namespace.clone().unwrap_or_default(),
            addon.metadata.name.clone().unwrap_or_default(),
        );
        if let Some(existing) = state.addons.get(&key) {
            addon.metadata.finalizers = existing.metadata.finalizers.clone();
            addon.status = existing.status.clone();
        }
        addon.metadata.resource_version = Some(state.next_version());
        state.addons.insert(key, addon);
    }

    pub fn addon(&self, target: &TargetRef) -> Option<ManagedClusterAddOn> {
        self.state()
            .addons
            .get(&(target.cluster.clone(), target.addon.clone()))
            .cloned()
    }

    /// Sets or, with `None`, removes an annotation on the addon.
    pub fn annotate_addon(&self, target: &TargetRef, key: &str, value: Option<&str>) {
        let mut state = self.state();
        let version = state.next_version();
        if let Some(addon) = state
            .addons
            .get_mut(&(target.cluster.clone(), target.addon.clone()))
        {
            let annotations = addon.metadata.annotations.get_or_insert_with(BTreeMap::new);
            match value {
                Some(v) => annotations.insert(key.to_string(), v.to_string()),
                None => annotations.remove(key),
            };
            addon.metadata.resource_version = Some(version);
        }
    }

    /// Deletes the addon the way the API server does: finalizers hold it in a
    /// terminating state until they are removed.
    pub fn delete_addon(&self, target: &TargetRef) {
        let mut state = self.state();
        let key = (target.cluster.clone(), target.addon.clone());
        let has_finalizers = state
            .addons
            .get(&key)
            .map(|a| a.metadata.finalizers.as_ref().is_some_and(|f| !f.is_empty()))
            .unwrap_or(false);
        if has_finalizers {
            if let Some(addon) = state.addons.get_mut(&key) {
                addon.metadata.deletion_timestamp = Some(Time(Utc::now()));
            }
        } else {
            state.addons.remove(&key);
        }
    }

    pub fn put_cluster(&self, cluster: ManagedCluster) {
        let name = cluster.metadata.name.clone().unwrap_or_default();
        self.state().clusters.insert(name, cluster);
    }

    /// Registers a cluster reporting the given Kubernetes version.
    pub fn add_cluster(&self, name: &str, kubernetes_version: &str) {
        let mut cluster = ManagedCluster::new(name, Default::default());
        cluster.status = Some(ManagedClusterStatus {
            version: Some(ManagedClusterVersion {
                kubernetes: kubernetes_version.to_string(),
            }),
        });
        self.put_cluster(cluster);
    }

    pub fn annotate_cluster(&self, name: &str, key: &str, value: Option<&str>) {
        let mut state = self.state();
        if let Some(cluster) = state.clusters.get_mut(name) {
            let annotations = cluster.metadata.annotations.get_or_insert_with(BTreeMap::new);
            match value {
                Some(v) => annotations.insert(key.to_string(), v.to_string()),
                None => annotations.remove(key),
            };
        }
    }

    pub fn put_cluster_management_addon(&self, cma: ClusterManagementAddOn) {
        let name = cma.metadata.name.clone().unwrap_or_default();
        self.state().cluster_management_addons.insert(name, cma);
    }

    pub fn put_deployment_config(&self, config: AddOnDeploymentConfig) {
        let key = (
            config.metadata.namespace.clone().unwrap_or_default(),
            config.metadata.name.clone().unwrap_or_default(),
        );
        self.state().deployment_configs.insert(key, config);
    }

    pub fn remove_deployment_config(&self, namespace: &str, name: &str) {
        self.state()
            .deployment_configs
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub fn work(&self, location: &WorkLocation) -> Option<ManifestWork> {
        self.state().works.get(location).cloned()
    }

    pub fn works(&self) -> Vec<ManifestWork> {
        self.state().works.values().cloned().collect()
    }

    /// Edits a work's manifests out of band, as a user with kubectl would.
    pub fn patch_work_manifests(
        &self,
        location: &WorkLocation,
        edit: impl FnOnce(&mut Vec<Value>),
    ) {
        let mut state = self.state();
        let version = state.next_version();
        let Some(work) = state.works.get_mut(location) else {
            return;
        };
        edit(&mut work.spec.workload.manifests);
        work.metadata.resource_version = Some(version);
        let work = work.clone();
        apply_on_cluster(&mut state, &work);
    }

    /// Replaces the work's status feedback for its deployment.
    pub fn set_feedback(&self, location: &WorkLocation, replicas: i64, available: i64, ready: i64) {
        let mut state = self.state();
        if let Some(work) = state.works.get_mut(location) {
            work.status = Some(feedback_status(work, replicas, available, ready));
        }
    }

    pub fn set_auto_ready(&self, ready: bool) {
        self.state().auto_ready = ready;
    }

    /// Deleted works linger until [`MemoryHub::release_work_deletions`].
    pub fn hold_work_deletion(&self, hold: bool) {
        self.state().hold_deletions = hold;
    }

    pub fn release_work_deletions(&self) {
        let mut state = self.state();
        state.hold_deletions = false;
        let terminating: Vec<WorkLocation> = state
            .works
            .iter()
            .filter(|(_, w)| w.metadata.deletion_timestamp.is_some())
            .map(|(l, _)| l.clone())
            .collect();
        for location in terminating {
            finish_work_deletion(&mut state, &location);
        }
    }

    /// The next `count` work replacements fail with a conflict.
    pub fn conflict_next_replaces(&self, count: usize) {
        self.state().pending_conflicts = count;
    }

    /// Reads of the cluster's addons fail as if the API server timed out.
    pub fn set_cluster_unavailable(&self, cluster: &str, unavailable: bool) {
        let mut state = self.state();
        if unavailable {
            state.unavailable_clusters.insert(cluster.to_string());
        } else {
            state.unavailable_clusters.remove(cluster);
        }
    }

    /// Number of writes made through [`HubApi`].
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    pub fn has_object(&self, cluster: &str, kind: &str, namespace: &str, name: &str) -> bool {
        self.state()
            .applied
            .get(cluster)
            .map(|objects| {
                objects
                    .keys()
                    .any(|k| k.kind == kind && k.namespace == namespace && k.name == name)
            })
            .unwrap_or(false)
    }

    pub fn has_namespace(&self, cluster: &str, name: &str) -> bool {
        self.has_object(cluster, "Namespace", "", name)
    }

    pub fn objects_on(&self, cluster: &str) -> Vec<ManifestKey> {
        self.state()
            .applied
            .get(cluster)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn resource_for(key: &ManifestKey) -> (String, String) {
    let group = match key.api_version.split_once('/') {
        Some((group, _)) => group.to_string(),
        None => String::new(),
    };
    (group, format!("{}s", key.kind.to_lowercase()))
}

fn is_orphaned(work: &ManifestWork, key: &ManifestKey) -> bool {
    let annotated = work.manifests().iter().any(|m| {
        ManifestKey::of(m) == *key
            && m["metadata"]["annotations"]
                .get(DELETION_ORPHAN_ANNOTATION)
                .is_some()
    });
    if annotated {
        return true;
    }
    let Some(option) = &work.spec.delete_option else {
        return false;
    };
    match option.propagation_policy.as_str() {
        "Orphan" => true,
        "SelectivelyOrphan" => {
            let (group, resource) = resource_for(key);
            option
                .selectively_orphans
                .as_ref()
                .map(|s| {
                    s.orphaning_rules.iter().any(|r| {
                        r.group == group
                            && r.resource == resource
                            && r.namespace == key.namespace
                            && r.name == key.name
                    })
                })
                .unwrap_or(false)
        }
        _ => false,
    }
}

/// Brings the execution cluster in line with the work: its manifests exist and
/// objects it dropped are garbage collected.
fn apply_on_cluster(state: &mut State, work: &ManifestWork) {
    let location = WorkLocation::of(work);
    let wanted: BTreeSet<ManifestKey> = work.manifests().iter().map(ManifestKey::of).collect();
    let objects = state.applied.entry(location.namespace.clone()).or_default();

    for key in &wanted {
        objects.entry(key.clone()).or_default().owners.insert(location.clone());
    }
    objects.retain(|key, object| {
        if wanted.contains(key) || !object.owners.remove(&location) {
            return true;
        }
        !object.owners.is_empty()
    });

    if state.auto_ready {
        if let Some(stored) = state.works.get_mut(&location) {
            stored.status = Some(feedback_status(stored, 1, 1, 1));
        }
    }
}

fn finish_work_deletion(state: &mut State, location: &WorkLocation) {
    let Some(work) = state.works.remove(location) else {
        return;
    };
    if let Some(objects) = state.applied.get_mut(&location.namespace) {
        objects.retain(|key, object| {
            if !object.owners.remove(location) {
                return true;
            }
            !object.owners.is_empty() || is_orphaned(&work, key)
        });
    }
}

fn feedback_status(
    work: &ManifestWork,
    replicas: i64,
    available: i64,
    ready: i64,
) -> ManifestWorkStatus {
    let integer = |name: &str, value: i64| FeedbackValue {
        name: name.to_string(),
        field_value: FieldValue {
            type_: "Integer".to_string(),
            integer: Some(value),
            string: None,
        },
    };
    let manifests = work
        .manifests()
        .iter()
        .map(ManifestKey::of)
        .filter(|k| k.kind == "Deployment")
        .map(|k| ManifestCondition {
            resource_meta: ManifestResourceMeta {
                group: "apps".to_string(),
                kind: k.kind.clone(),
                resource: "deployments".to_string(),
                name: k.name.clone(),
                namespace: k.namespace.clone(),
            },
            status_feedback: StatusFeedback {
                values: vec![
                    integer("Replicas", replicas),
                    integer("AvailableReplicas", available),
                    integer("ReadyReplicas", ready),
                ],
            },
        })
        .collect();
    ManifestWorkStatus {
        resource_status: ManifestResourceStatus { manifests },
    }
}

#[async_trait]
impl HubApi for MemoryHub {
    async fn get_addon(&self, target: &TargetRef) -> Result<Option<ManagedClusterAddOn>, HubError> {
        let state = self.state();
        if state.unavailable_clusters.contains(&target.cluster) {
            return Err(HubError::Transient(format!(
                "timed out reading addons in {}",
                target.cluster
            )));
        }
        Ok(state
            .addons
            .get(&(target.cluster.clone(), target.addon.clone()))
            .cloned())
    }

    async fn list_addons(&self, addon: &str) -> Result<Vec<ManagedClusterAddOn>, HubError> {
        Ok(self
            .state()
            .addons
            .values()
            .filter(|a| a.metadata.name.as_deref() == Some(addon))
            .cloned()
            .collect())
    }

    async fn set_addon_finalizers(
        &self,
        target: &TargetRef,
        finalizers: Vec<String>,
    ) -> Result<(), HubError> {
        let mut state = self.state();
        state.writes += 1;
        let version = state.next_version();
        let key = (target.cluster.clone(), target.addon.clone());
        let Some(addon) = state.addons.get_mut(&key) else {
            return Err(HubError::NotFound {
                kind: "ManagedClusterAddOn".to_string(),
                name: target.to_string(),
            });
        };
        let released = finalizers.is_empty() && addon.metadata.deletion_timestamp.is_some();
        addon.metadata.finalizers = Some(finalizers);
        addon.metadata.resource_version = Some(version);
        if released {
            state.addons.remove(&key);
        }
        Ok(())
    }

    async fn update_addon_status(
        &self,
        target: &TargetRef,
        status: ManagedClusterAddOnStatus,
    ) -> Result<(), HubError> {
        let mut state = self.state();
        state.writes += 1;
        match state
            .addons
            .get_mut(&(target.cluster.clone(), target.addon.clone()))
        {
            Some(addon) => {
                addon.status = Some(status);
                Ok(())
            }
            None => Err(HubError::NotFound {
                kind: "ManagedClusterAddOn".to_string(),
                name: target.to_string(),
            }),
        }
    }

    async fn get_cluster(&self, name: &str) -> Result<Option<ManagedCluster>, HubError> {
        Ok(self.state().clusters.get(name).cloned())
    }

    async fn get_cluster_management_addon(
        &self,
        name: &str,
    ) -> Result<Option<ClusterManagementAddOn>, HubError> {
        Ok(self.state().cluster_management_addons.get(name).cloned())
    }

    async fn get_deployment_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<AddOnDeploymentConfig>, HubError> {
        Ok(self
            .state()
            .deployment_configs
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_work(&self, location: &WorkLocation) -> Result<Option<ManifestWork>, HubError> {
        Ok(self.state().works.get(location).cloned())
    }

    async fn list_addon_works(&self, target: &TargetRef) -> Result<Vec<ManifestWork>, HubError> {
        Ok(self
            .state()
            .works
            .values()
            .filter(|w| {
                let labels = w.metadata.labels.clone().unwrap_or_default();
                labels.get(ADDON_NAME_LABEL) == Some(&target.addon)
                    && labels.get(ADDON_NAMESPACE_LABEL) == Some(&target.cluster)
            })
            .cloned()
            .collect())
    }

    async fn list_works_in(&self, namespace: &str) -> Result<Vec<ManifestWork>, HubError> {
        Ok(self
            .state()
            .works
            .iter()
            .filter(|(l, _)| l.namespace == namespace)
            .map(|(_, w)| w.clone())
            .collect())
    }

    async fn create_work(&self, work: &ManifestWork) -> Result<(), HubError> {
        let mut state = self.state();
        state.writes += 1;
        let location = WorkLocation::of(work);
        if state.works.contains_key(&location) {
            return Err(HubError::Conflict(format!("{} already exists", location)));
        }
        let mut stored = work.clone();
        stored.metadata.resource_version = Some(state.next_version());
        stored.status = None;
        state.works.insert(location, stored.clone());
        apply_on_cluster(&mut state, &stored);
        Ok(())
    }

    async fn replace_work(&self, work: &ManifestWork) -> Result<(), HubError> {
        let mut state = self.state();
        state.writes += 1;
        let location = WorkLocation::of(work);
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(HubError::Conflict(location.to_string()));
        }
        let version = state.next_version();
        let Some(current) = state.works.get_mut(&location) else {
            return Err(HubError::NotFound {
                kind: "ManifestWork".to_string(),
                name: location.to_string(),
            });
        };
        if current.metadata.resource_version != work.metadata.resource_version {
            return Err(HubError::Conflict(location.to_string()));
        }
        // Status is a subresource and survives spec replacement
        current.spec = work.spec.clone();
        current.metadata.labels = work.metadata.labels.clone();
        current.metadata.resource_version = Some(version);
        let stored = current.clone();
        apply_on_cluster(&mut state, &stored);
        Ok(())
    }

    async fn delete_work(&self, location: &WorkLocation) -> Result<(), HubError> {
        let mut state = self.state();
        state.writes += 1;
        if !state.works.contains_key(location) {
            return Ok(());
        }
        if state.hold_deletions {
            if let Some(work) = state.works.get_mut(location) {
                work.metadata.deletion_timestamp = Some(Time(Utc::now()));
            }
        } else {
            finish_work_deletion(&mut state, location);
        }
        Ok(())
    }
}
