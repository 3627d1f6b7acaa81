use addon_defs::{DeleteOption, ManifestWork, OrphaningRule, SelectivelyOrphan};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

use crate::config::EffectiveConfig;
use crate::defs::POLICY_NAMESPACE;
use crate::errors::HubError;
use crate::manifest::to_manifest;
use crate::placement::Placement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceRole {
    Install,
    /// Named after the managed cluster, holds its replicated policies.
    ClusterIdentity,
    Policy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedNamespace {
    pub name: String,
    pub role: NamespaceRole,
    /// Left behind when the bundle is deleted.
    pub orphan: bool,
}

/// The namespaces a bundle carries and which of them survive its removal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespacePlan {
    pub entries: Vec<PlannedNamespace>,
}

impl NamespacePlan {
    pub fn for_target(placement: &Placement, config: &EffectiveConfig) -> NamespacePlan {
        let mut plan = NamespacePlan::default();
        match placement {
            Placement::Standard {
                cluster,
                install_namespace,
            } => {
                // Shared with other addons on the cluster
                plan.add(install_namespace, NamespaceRole::Install, true);
                if !config.on_hub || config.spec_sync {
                    plan.add(
                        cluster,
                        NamespaceRole::ClusterIdentity,
                        config.orphan_preference(),
                    );
                }
                plan.add(POLICY_NAMESPACE, NamespaceRole::Policy, false);
            }
            Placement::Hosted {
                install_namespace, ..
            } => {
                plan.add(
                    install_namespace,
                    NamespaceRole::Install,
                    config.install_namespace_externally_managed,
                );
            }
        }
        plan
    }

    fn add(&mut self, name: &str, role: NamespaceRole, orphan: bool) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(existing) => existing.orphan |= orphan,
            None => self.entries.push(PlannedNamespace {
                name: name.to_string(),
                role,
                orphan,
            }),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, role: NamespaceRole) -> bool {
        self.entries.iter().any(|e| e.role == role)
    }

    pub fn manifests(&self) -> Result<Vec<Value>, HubError> {
        self.entries
            .iter()
            .map(|e| {
                to_manifest(&Namespace {
                    metadata: ObjectMeta {
                        name: Some(e.name.clone()),
                        ..Default::default()
                    },
                    ..Default::default()
                })
            })
            .collect()
    }

    pub fn orphaning_rules(&self) -> Vec<OrphaningRule> {
        let mut rules: Vec<OrphaningRule> = self
            .entries
            .iter()
            .filter(|e| e.orphan)
            .map(|e| namespace_rule(&e.name))
            .collect();
        rules.sort();
        rules
    }

    pub fn delete_option(&self) -> DeleteOption {
        delete_option(self.orphaning_rules())
    }
}

pub fn namespace_rule(name: &str) -> OrphaningRule {
    OrphaningRule {
        group: String::new(),
        resource: "namespaces".to_string(),
        namespace: String::new(),
        name: name.to_string(),
    }
}

pub fn delete_option(rules: Vec<OrphaningRule>) -> DeleteOption {
    DeleteOption {
        propagation_policy: "SelectivelyOrphan".to_string(),
        selectively_orphans: Some(SelectivelyOrphan {
            orphaning_rules: rules,
        }),
    }
}

/// Names of the Namespace manifests a work carries.
pub fn namespaces_in(work: &ManifestWork) -> Vec<String> {
    work.manifests()
        .iter()
        .filter(|m| m.get("apiVersion") == Some(&Value::from("v1")))
        .filter(|m| m.get("kind") == Some(&Value::from("Namespace")))
        .filter_map(|m| m.pointer("/metadata/name").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Delete option for removing `work`, with the rule for the cluster-identity
/// namespace recomputed from the signals current at teardown time. Other
/// namespaces keep the rules they were applied with.
pub fn teardown_delete_option(
    work: &ManifestWork,
    cluster_namespace: &str,
    keep: bool,
) -> DeleteOption {
    let mut rules: Vec<OrphaningRule> = work
        .spec
        .delete_option
        .as_ref()
        .and_then(|d| d.selectively_orphans.as_ref())
        .map(|s| s.orphaning_rules.clone())
        .unwrap_or_default();

    let carries_cluster_namespace = namespaces_in(work).iter().any(|n| n == cluster_namespace);
    let rule = namespace_rule(cluster_namespace);
    rules.retain(|r| r != &rule);
    if carries_cluster_namespace && keep {
        rules.push(rule);
    }
    rules.sort();
    delete_option(rules)
}
