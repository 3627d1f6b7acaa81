use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use addon_defs::{
    AddOnDeploymentConfig, ManagedCluster, ManagedClusterAddOn, ResourceRequirements, Toleration,
    CLIENT_BURST_ANNOTATION, CLIENT_QPS_ANNOTATION, EVALUATION_CONCURRENCY_ANNOTATION,
    LOG_LEVEL_ANNOTATION, ON_MULTICLUSTER_HUB_ANNOTATION, SYNC_POLICIES_ON_HUB_ANNOTATION,
    VALUES_ANNOTATION,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::defs::{
    DEFAULT_CLIENT_BURST, DEFAULT_CLIENT_QPS, DEFAULT_EVALUATION_CONCURRENCY,
    DEFAULT_MEMORY_LIMIT, DEFAULT_MEMORY_REQUEST, VAR_CLIENT_BURST, VAR_CLIENT_QPS,
    VAR_EVALUATION_CONCURRENCY, VAR_INSTALL_NAMESPACE_EXTERNALLY_MANAGED, VAR_LOG_LEVEL,
    VAR_ON_MULTICLUSTER_HUB,
};

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+|Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E)?$")
        .expect("quantity pattern compiles")
});

/// The typed configuration of one addon target. Nothing past the resolver
/// looks at raw annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    /// Explicit install namespace, if any source set one.
    pub install_namespace: Option<String>,
    pub node_selector: BTreeMap<String, String>,
    pub tolerations: Vec<Toleration>,
    pub resource_overrides: Vec<ResourceOverride>,
    pub custom_variables: BTreeMap<String, String>,
    pub diagnostics: DiagnosticFlags,
    /// Whether the framework addon syncs policy specs from the hub.
    pub spec_sync: bool,
    /// The target cluster is the hub itself.
    pub on_hub: bool,
    pub install_namespace_externally_managed: bool,
    pub issues: Vec<ConfigIssue>,
}

impl EffectiveConfig {
    /// Whether the cluster-identity namespace should be left behind on removal.
    pub fn orphan_preference(&self) -> bool {
        self.on_hub
    }

    /// Resources for one container of the workload. The most specific matching
    /// override wins, the first listed on ties, and each of requests/limits
    /// falls back to the defaults when the override leaves it empty.
    pub fn resources_for(
        &self,
        resource: &str,
        name: &str,
        container: &str,
    ) -> ResourceRequirements {
        let mut best: Option<(u8, &ResourceOverride)> = None;
        for candidate in &self.resource_overrides {
            if let Some(score) = candidate.matcher.specificity(resource, name, container) {
                if best.map(|(s, _)| score > s).unwrap_or(true) {
                    best = Some((score, candidate));
                }
            }
        }

        let mut resolved = default_resources();
        if let Some((_, chosen)) = best {
            if !chosen.resources.requests.is_empty() {
                resolved.requests = chosen.resources.requests.clone();
            }
            if !chosen.resources.limits.is_empty() {
                resolved.limits = chosen.resources.limits.clone();
            }
        }
        resolved
    }
}

pub fn default_resources() -> ResourceRequirements {
    ResourceRequirements {
        requests: [("memory".to_string(), DEFAULT_MEMORY_REQUEST.to_string())]
            .into_iter()
            .collect(),
        limits: [("memory".to_string(), DEFAULT_MEMORY_LIMIT.to_string())]
            .into_iter()
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticFlags {
    pub log_level: Option<u32>,
    pub evaluation_concurrency: u8,
    pub client_qps: u32,
    pub client_burst: u32,
}

impl Default for DiagnosticFlags {
    fn default() -> Self {
        DiagnosticFlags {
            log_level: None,
            evaluation_concurrency: DEFAULT_EVALUATION_CONCURRENCY,
            client_qps: DEFAULT_CLIENT_QPS,
            client_burst: DEFAULT_CLIENT_BURST,
        }
    }
}

impl DiagnosticFlags {
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(level) = self.log_level {
            args.push("--log-encoder=console".to_string());
            args.push(format!("--log-level={}", level));
            args.push(format!("--v={}", level.saturating_sub(2)));
        }
        args.push(format!(
            "--evaluation-concurrency={}",
            self.evaluation_concurrency
        ));
        args.push(format!("--client-max-qps={}", self.client_qps));
        args.push(format!("--client-burst={}", self.client_burst));
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOverride {
    pub matcher: ContainerMatcher,
    pub resources: ResourceRequirements,
}

/// Selects containers by `resource:name:container`, each part optionally `*`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerMatcher {
    Universal,
    Qualified {
        resource: String,
        name: String,
        container: String,
    },
    Container(String),
}

impl ContainerMatcher {
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        if id == "*" {
            return Some(ContainerMatcher::Universal);
        }
        let parts: Vec<&str> = id.split(':').collect();
        match parts.as_slice() {
            [container] => Some(ContainerMatcher::Container(container.to_string())),
            [resource, name, container] => {
                if parts.iter().any(|p| p.is_empty()) {
                    return None;
                }
                if parts.iter().all(|p| *p == "*") {
                    return Some(ContainerMatcher::Universal);
                }
                Some(ContainerMatcher::Qualified {
                    resource: resource.to_string(),
                    name: name.to_string(),
                    container: container.to_string(),
                })
            }
            _ => None,
        }
    }

    /// Number of literal parts that matched, or `None` when the container is not selected.
    fn specificity(&self, resource: &str, name: &str, container: &str) -> Option<u8> {
        fn part(pattern: &str, value: &str) -> Option<u8> {
            match pattern {
                "*" => Some(0),
                p if p == value => Some(1),
                _ => None,
            }
        }
        match self {
            ContainerMatcher::Universal => Some(0),
            ContainerMatcher::Container(c) => (c == container).then_some(1),
            ContainerMatcher::Qualified {
                resource: r,
                name: n,
                container: c,
            } => Some(part(r, resource)? + part(n, name)? + part(c, container)?),
        }
    }
}

/// A configuration value that could not be used. The field falls back to its default.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub field: String,
    pub source: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.source, self.message)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct HubValues {
    #[serde(default)]
    on_multicluster_hub: Option<Value>,
    #[serde(default)]
    args: BTreeMap<String, Value>,
}

struct RawSetting {
    source: String,
    value: String,
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

struct Resolver<'a> {
    addon: &'a ManagedClusterAddOn,
    cluster: Option<&'a ManagedCluster>,
    variables: BTreeMap<String, String>,
    values: HubValues,
    issues: Vec<ConfigIssue>,
}

impl<'a> Resolver<'a> {
    fn new(
        addon: &'a ManagedClusterAddOn,
        cluster: Option<&'a ManagedCluster>,
        deployment_config: Option<&'a AddOnDeploymentConfig>,
    ) -> Self {
        let mut issues = Vec::new();
        let values = match addon.annotation(VALUES_ANNOTATION) {
            Some(raw) => serde_json::from_str::<HubValues>(raw).unwrap_or_else(|e| {
                issues.push(ConfigIssue {
                    field: "values".to_string(),
                    source: format!("annotation {}", VALUES_ANNOTATION),
                    message: format!("not a valid values document: {}", e),
                });
                HubValues::default()
            }),
            None => HubValues::default(),
        };
        let variables = deployment_config
            .map(|c| {
                c.spec
                    .customized_variables
                    .iter()
                    .map(|v| (v.name.clone(), v.value.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Resolver {
            addon,
            cluster,
            variables,
            values,
            issues,
        }
    }

    /// First source that sets the field: annotation, then values args, then deployment config.
    fn raw(&self, annotation: &str, values_key: &str, variable: &str) -> Option<RawSetting> {
        if let Some(v) = self.addon.annotation(annotation) {
            return Some(RawSetting {
                source: format!("annotation {}", annotation),
                value: v.to_string(),
            });
        }
        if let Some(v) = self.values.args.get(values_key).and_then(scalar_to_string) {
            return Some(RawSetting {
                source: format!("values args.{}", values_key),
                value: v,
            });
        }
        self.variables.get(variable).map(|v| RawSetting {
            source: format!("customized variable {}", variable),
            value: v.clone(),
        })
    }

    fn parse<T: FromStr>(
        &mut self,
        field: &str,
        raw: Option<RawSetting>,
        valid: impl Fn(&T) -> bool,
    ) -> Option<T> {
        let raw = raw?;
        match raw.value.trim().parse::<T>() {
            Ok(v) if valid(&v) => Some(v),
            _ => {
                self.issues.push(ConfigIssue {
                    field: field.to_string(),
                    source: raw.source,
                    message: format!("invalid value {:?}, using the default", raw.value),
                });
                None
            }
        }
    }

    fn bool_setting(&mut self, field: &str, raw: Option<RawSetting>) -> Option<bool> {
        let raw = raw?;
        match parse_bool(&raw.value) {
            Some(b) => Some(b),
            None => {
                self.issues.push(ConfigIssue {
                    field: field.to_string(),
                    source: raw.source,
                    message: format!("expected true or false, got {:?}", raw.value),
                });
                None
            }
        }
    }

    fn diagnostics(&mut self) -> DiagnosticFlags {
        let raw = self.raw(LOG_LEVEL_ANNOTATION, "logLevel", VAR_LOG_LEVEL);
        let log_level = self.parse::<u32>("log-level", raw, |_| true);

        let raw = self.raw(
            EVALUATION_CONCURRENCY_ANNOTATION,
            "evaluationConcurrency",
            VAR_EVALUATION_CONCURRENCY,
        );
        let evaluation_concurrency = self
            .parse::<u8>("evaluation-concurrency", raw, |v| *v > 0)
            .unwrap_or(DEFAULT_EVALUATION_CONCURRENCY);

        let raw = self.raw(CLIENT_QPS_ANNOTATION, "clientQPS", VAR_CLIENT_QPS);
        let client_qps = self.parse::<u32>("client-qps", raw, |v| *v > 0);

        let raw = self.raw(CLIENT_BURST_ANNOTATION, "clientBurst", VAR_CLIENT_BURST);
        let client_burst = self.parse::<u32>("client-burst", raw, |v| *v > 0);

        // Burst follows an explicit QPS unless it is set itself
        let client_burst = match (client_burst, client_qps) {
            (Some(burst), _) => burst,
            (None, Some(qps)) => qps.saturating_add(qps / 2),
            (None, None) => DEFAULT_CLIENT_BURST,
        };

        DiagnosticFlags {
            log_level,
            evaluation_concurrency,
            client_qps: client_qps.unwrap_or(DEFAULT_CLIENT_QPS),
            client_burst,
        }
    }

    /// The addon's own on-hub marker: annotation, values document, then deployment config.
    fn addon_on_hub(&mut self) -> Option<bool> {
        let raw = self
            .addon
            .annotation(ON_MULTICLUSTER_HUB_ANNOTATION)
            .map(|v| RawSetting {
                source: format!("annotation {}", ON_MULTICLUSTER_HUB_ANNOTATION),
                value: v.to_string(),
            })
            .or_else(|| {
                self.values
                    .on_multicluster_hub
                    .as_ref()
                    .and_then(scalar_to_string)
                    .map(|v| RawSetting {
                        source: "values onMulticlusterHub".to_string(),
                        value: v,
                    })
            })
            .or_else(|| {
                self.variables
                    .get(VAR_ON_MULTICLUSTER_HUB)
                    .map(|v| RawSetting {
                        source: format!("customized variable {}", VAR_ON_MULTICLUSTER_HUB),
                        value: v.clone(),
                    })
            });
        self.bool_setting("on-multicluster-hub", raw)
    }

    fn cluster_annotation(&mut self, key: &str) -> Option<bool> {
        let value = self.cluster.and_then(|c| c.annotation(key))?.to_string();
        self.bool_setting(
            key,
            Some(RawSetting {
                source: "ManagedCluster annotation".to_string(),
                value,
            }),
        )
    }

    fn addon_annotation(&mut self, key: &str) -> Option<bool> {
        let value = self.addon.annotation(key)?.to_string();
        self.bool_setting(
            key,
            Some(RawSetting {
                source: "annotation".to_string(),
                value,
            }),
        )
    }
}

/// The cluster marks itself as the hub. Used when the addon object is already gone.
pub fn cluster_on_hub(cluster: Option<&ManagedCluster>) -> bool {
    cluster
        .and_then(|c| c.annotation(ON_MULTICLUSTER_HUB_ANNOTATION))
        .and_then(parse_bool)
        .unwrap_or(false)
}

/// Merges the addon's annotations, its deployment config and the cluster's own
/// signals into one typed configuration.
pub fn resolve(
    addon: &ManagedClusterAddOn,
    cluster: Option<&ManagedCluster>,
    deployment_config: Option<&AddOnDeploymentConfig>,
) -> EffectiveConfig {
    let mut resolver = Resolver::new(addon, cluster, deployment_config);

    let diagnostics = resolver.diagnostics();

    let addon_on_hub = resolver.addon_on_hub();
    let cluster_on_hub = resolver.cluster_annotation(ON_MULTICLUSTER_HUB_ANNOTATION);
    let on_hub = addon_on_hub.unwrap_or(false) || cluster_on_hub.unwrap_or(false);

    let addon_sync = resolver
        .addon_annotation(SYNC_POLICIES_ON_HUB_ANNOTATION)
        .or(addon_on_hub.map(|hub| !hub));
    let cluster_sync = resolver
        .cluster_annotation(SYNC_POLICIES_ON_HUB_ANNOTATION)
        .or(cluster_on_hub.map(|hub| !hub));
    let spec_sync = addon_sync.or(cluster_sync).unwrap_or(true);

    let externally_managed = resolver
        .variables
        .get(VAR_INSTALL_NAMESPACE_EXTERNALLY_MANAGED)
        .map(|v| RawSetting {
            source: format!(
                "customized variable {}",
                VAR_INSTALL_NAMESPACE_EXTERNALLY_MANAGED
            ),
            value: v.clone(),
        });
    let install_namespace_externally_managed = resolver
        .bool_setting(VAR_INSTALL_NAMESPACE_EXTERNALLY_MANAGED, externally_managed)
        .unwrap_or(false);

    let install_namespace = deployment_config
        .and_then(|c| c.spec.agent_install_namespace.as_deref())
        .or(addon.spec.install_namespace.as_deref())
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string);

    let (node_selector, tolerations) = deployment_config
        .and_then(|c| c.spec.node_placement.clone())
        .map(|p| (p.node_selector, p.tolerations))
        .unwrap_or_default();

    let mut resource_overrides = Vec::new();
    for requirement in deployment_config
        .map(|c| c.spec.resource_requirements.as_slice())
        .unwrap_or_default()
    {
        let Some(matcher) = ContainerMatcher::parse(&requirement.container_id) else {
            resolver.issues.push(ConfigIssue {
                field: "resourceRequirements".to_string(),
                source: "AddOnDeploymentConfig".to_string(),
                message: format!("invalid containerID {:?}", requirement.container_id),
            });
            continue;
        };
        let invalid: Vec<String> = requirement
            .resources
            .requests
            .iter()
            .chain(requirement.resources.limits.iter())
            .filter(|(_, quantity)| !QUANTITY.is_match(quantity.trim()))
            .map(|(name, quantity)| format!("{}={}", name, quantity))
            .collect();
        if !invalid.is_empty() {
            resolver.issues.push(ConfigIssue {
                field: "resourceRequirements".to_string(),
                source: format!("containerID {}", requirement.container_id),
                message: format!("invalid resource quantities {}", invalid.join(", ")),
            });
            continue;
        }
        resource_overrides.push(ResourceOverride {
            matcher,
            resources: requirement.resources.clone(),
        });
    }

    EffectiveConfig {
        install_namespace,
        node_selector,
        tolerations,
        resource_overrides,
        custom_variables: resolver.variables,
        diagnostics,
        spec_sync,
        on_hub,
        install_namespace_externally_managed,
        issues: resolver.issues,
    }
}
