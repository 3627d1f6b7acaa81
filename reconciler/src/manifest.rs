use std::collections::BTreeMap;

use addon_defs::{ManagedCluster, ResourceRequirements, DELETION_ORPHAN_ANNOTATION};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements as ContainerResources, SecretVolumeSource, ServiceAccount,
    Toleration as PodToleration, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, CustomResourceDefinitionNames, CustomResourceDefinitionSpec,
    CustomResourceDefinitionVersion, CustomResourceSubresourceStatus, CustomResourceSubresources,
    CustomResourceValidation, JSONSchemaProps,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;
use serde_json::Value;

use crate::config::EffectiveConfig;
use crate::defs::{
    HEALTH_PORT, HUB_KUBECONFIG_MOUNT, LIVENESS_INITIAL_DELAY_SECONDS, MANAGED_KUBECONFIG_MOUNT,
    POLICY_CRD_NAME, POLICY_GROUP, STARTUP_PROBE_MIN_MINOR,
};
use crate::errors::{HubError, ReconcileError};
use crate::placement::Placement;

/// What the generator needs to know about the cluster running the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterCapability {
    pub minor: u32,
}

impl ClusterCapability {
    pub fn from_cluster(
        name: &str,
        cluster: Option<&ManagedCluster>,
    ) -> Result<ClusterCapability, ReconcileError> {
        let cluster = cluster.ok_or_else(|| ReconcileError::CapabilityUnknown {
            cluster: name.to_string(),
            reason: "ManagedCluster not found".to_string(),
        })?;
        let minor = cluster
            .minor_version()
            .ok_or_else(|| ReconcileError::CapabilityUnknown {
                cluster: name.to_string(),
                reason: "status.version.kubernetes is missing or unparseable".to_string(),
            })?;
        Ok(ClusterCapability { minor })
    }

    pub fn supports_startup_probe(&self) -> bool {
        self.minor >= STARTUP_PROBE_MIN_MINOR
    }
}

/// Inputs shared by every manifest of one bundle.
pub struct ManifestGenerator<'a> {
    pub addon_name: &'a str,
    pub image: &'a str,
    pub config: &'a EffectiveConfig,
    pub placement: &'a Placement,
    pub capability: ClusterCapability,
}

impl ManifestGenerator<'_> {
    /// Workload manifests in apply order: the Policy CRD, service account, RBAC,
    /// then the deployment.
    pub fn workload_manifests(&self) -> Result<Vec<Value>, HubError> {
        Ok(vec![
            to_manifest(&self.policy_crd())?,
            to_manifest(&self.service_account())?,
            to_manifest(&self.cluster_role())?,
            to_manifest(&self.cluster_role_binding())?,
            to_manifest(&self.role())?,
            to_manifest(&self.role_binding())?,
            to_manifest(&self.deployment())?,
        ])
    }

    pub fn deployment_name(&self) -> &str {
        self.addon_name
    }

    fn namespace(&self) -> String {
        self.placement.install_namespace().to_string()
    }

    fn service_account_name(&self) -> String {
        format!("{}-sa", self.addon_name)
    }

    fn cluster_role_name(&self) -> String {
        match self.placement {
            Placement::Standard { .. } => format!("open-cluster-management:{}", self.addon_name),
            // Several hosted targets may share one hosting cluster
            Placement::Hosted { cluster, .. } => {
                format!("open-cluster-management:{}:{}", self.addon_name, cluster)
            }
        }
    }

    fn labels(&self) -> BTreeMap<String, String> {
        [("app".to_string(), self.addon_name.to_string())]
            .into_iter()
            .collect()
    }

    fn metadata(&self, name: String, namespaced: bool) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: namespaced.then(|| self.namespace()),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    fn subject(&self) -> Subject {
        Subject {
            kind: "ServiceAccount".to_string(),
            name: self.service_account_name(),
            namespace: Some(self.namespace()),
            ..Default::default()
        }
    }

    /// The Policy CRD. On the hub it belongs to the policy controllers and is
    /// left behind when the bundle goes.
    fn policy_crd(&self) -> CustomResourceDefinition {
        let mut metadata = self.metadata(POLICY_CRD_NAME.to_string(), false);
        if self.config.on_hub {
            metadata.annotations = Some(
                [(DELETION_ORPHAN_ANNOTATION.to_string(), String::new())]
                    .into_iter()
                    .collect(),
            );
        }
        CustomResourceDefinition {
            metadata,
            spec: CustomResourceDefinitionSpec {
                group: POLICY_GROUP.to_string(),
                names: CustomResourceDefinitionNames {
                    kind: "Policy".to_string(),
                    list_kind: Some("PolicyList".to_string()),
                    plural: "policies".to_string(),
                    singular: Some("policy".to_string()),
                    short_names: Some(vec!["plc".to_string()]),
                    ..Default::default()
                },
                scope: "Namespaced".to_string(),
                versions: vec![CustomResourceDefinitionVersion {
                    name: "v1".to_string(),
                    served: true,
                    storage: true,
                    schema: Some(CustomResourceValidation {
                        open_api_v3_schema: Some(JSONSchemaProps {
                            type_: Some("object".to_string()),
                            x_kubernetes_preserve_unknown_fields: Some(true),
                            ..Default::default()
                        }),
                    }),
                    subresources: Some(CustomResourceSubresources {
                        status: Some(CustomResourceSubresourceStatus(Value::Object(
                            Default::default(),
                        ))),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(self.service_account_name(), true),
            ..Default::default()
        }
    }

    fn cluster_role(&self) -> ClusterRole {
        ClusterRole {
            metadata: self.metadata(self.cluster_role_name(), false),
            rules: Some(vec![
                rule(
                    "policy.open-cluster-management.io",
                    &["policies", "policies/status", "policies/finalizers"],
                    &["create", "delete", "get", "list", "patch", "update", "watch"],
                ),
                rule("", &["events"], &["create", "patch", "update"]),
                rule("", &["namespaces", "secrets"], &["get", "list", "watch"]),
                rule(
                    "apiextensions.k8s.io",
                    &["customresourcedefinitions"],
                    &["get", "list", "watch"],
                ),
            ]),
            ..Default::default()
        }
    }

    fn cluster_role_binding(&self) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: self.metadata(self.cluster_role_name(), false),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: self.cluster_role_name(),
            },
            subjects: Some(vec![self.subject()]),
        }
    }

    fn role_name(&self) -> String {
        format!("{}-leader-election", self.addon_name)
    }

    fn role(&self) -> Role {
        Role {
            metadata: self.metadata(self.role_name(), true),
            rules: Some(vec![
                rule(
                    "coordination.k8s.io",
                    &["leases"],
                    &["create", "get", "list", "update", "watch"],
                ),
                rule("", &["configmaps"], &["create", "get", "list", "update", "watch"]),
            ]),
        }
    }

    fn role_binding(&self) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(self.role_name(), true),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: self.role_name(),
            },
            subjects: Some(vec![self.subject()]),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = self.placement.cluster_args();
        args.push("--leader-elect=false".to_string());
        args.extend(self.config.diagnostics.args());
        args.push(format!("--disable-spec-sync={}", !self.config.spec_sync));
        args
    }

    fn volumes(&self) -> (Vec<Volume>, Vec<VolumeMount>) {
        let mut secrets = vec![(
            "hub-kubeconfig",
            format!("{}-hub-kubeconfig", self.addon_name),
            HUB_KUBECONFIG_MOUNT,
        )];
        if self.placement.is_hosted() {
            secrets.push((
                "managed-kubeconfig",
                format!("{}-managed-kubeconfig", self.addon_name),
                MANAGED_KUBECONFIG_MOUNT,
            ));
        }

        secrets
            .into_iter()
            .map(|(volume, secret, mount)| {
                (
                    Volume {
                        name: volume.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(secret),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    VolumeMount {
                        name: volume.to_string(),
                        mount_path: mount.to_string(),
                        read_only: Some(true),
                        ..Default::default()
                    },
                )
            })
            .unzip()
    }

    /// Startup probe on clusters that support it, otherwise a liveness probe
    /// that waits before its first check.
    fn probes(&self) -> (Option<Probe>, Option<Probe>, Option<Probe>) {
        let readiness = Some(http_probe("/readyz"));
        if self.capability.supports_startup_probe() {
            let startup = Probe {
                failure_threshold: Some(30),
                period_seconds: Some(10),
                ..http_probe("/healthz")
            };
            (Some(startup), Some(http_probe("/healthz")), readiness)
        } else {
            let liveness = Probe {
                initial_delay_seconds: Some(LIVENESS_INITIAL_DELAY_SECONDS),
                ..http_probe("/healthz")
            };
            (None, Some(liveness), readiness)
        }
    }

    fn container_resources(&self, container: &str) -> ContainerResources {
        let resolved =
            self.config
                .resources_for("deployments", self.deployment_name(), container);
        to_container_resources(&resolved)
    }

    fn deployment(&self) -> Deployment {
        let (volumes, volume_mounts) = self.volumes();
        let (startup_probe, liveness_probe, readiness_probe) = self.probes();
        let container_name = self.addon_name.to_string();

        let container = Container {
            name: container_name.clone(),
            image: Some(self.image.to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            args: Some(self.args()),
            ports: Some(vec![ContainerPort {
                name: Some("health".to_string()),
                container_port: HEALTH_PORT,
                ..Default::default()
            }]),
            resources: Some(self.container_resources(&container_name)),
            volume_mounts: Some(volume_mounts),
            startup_probe,
            liveness_probe,
            readiness_probe,
            ..Default::default()
        };

        let tolerations: Vec<PodToleration> = self
            .config
            .tolerations
            .iter()
            .map(|t| PodToleration {
                key: t.key.clone(),
                operator: t.operator.clone(),
                value: t.value.clone(),
                effect: t.effect.clone(),
                toleration_seconds: t.toleration_seconds,
            })
            .collect();

        Deployment {
            metadata: self.metadata(self.deployment_name().to_string(), true),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(self.labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(self.service_account_name()),
                        containers: vec![container],
                        volumes: Some(volumes),
                        node_selector: (!self.config.node_selector.is_empty())
                            .then(|| self.config.node_selector.clone()),
                        tolerations: (!tolerations.is_empty()).then_some(tolerations),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn rule(api_group: &str, resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(HEALTH_PORT),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn to_container_resources(resolved: &ResourceRequirements) -> ContainerResources {
    let quantities = |m: &BTreeMap<String, String>| {
        (!m.is_empty()).then(|| {
            m.iter()
                .map(|(k, v)| (k.clone(), Quantity(v.trim().to_string())))
                .collect::<BTreeMap<_, _>>()
        })
    };
    ContainerResources {
        requests: quantities(&resolved.requests),
        limits: quantities(&resolved.limits),
        ..Default::default()
    }
}

pub(crate) fn to_manifest<T: Serialize>(object: &T) -> Result<Value, HubError> {
    serde_json::to_value(object).map_err(|e| HubError::Serialization(e.to_string()))
}
