use std::fmt;

use addon_defs::ManagedClusterAddOn;

use crate::config::EffectiveConfig;
use crate::defs::{
    DEFAULT_INSTALL_NAMESPACE, HOSTED_NAMESPACE_SUFFIX, HUB_KUBECONFIG_MOUNT,
    MANAGED_KUBECONFIG_MOUNT,
};
use crate::hub::WorkLocation;

/// Where the addon workload runs and which namespace it is installed into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The workload runs on the managed cluster itself.
    Standard {
        cluster: String,
        install_namespace: String,
    },
    /// The workload runs on the hosting cluster and acts on behalf of `cluster`.
    Hosted {
        cluster: String,
        hosting_cluster: String,
        install_namespace: String,
    },
}

impl Placement {
    pub fn resolve(addon: &ManagedClusterAddOn, config: &EffectiveConfig) -> Placement {
        let cluster = addon.cluster_name();
        match addon.hosting_cluster() {
            Some(hosting_cluster) => Placement::Hosted {
                install_namespace: config
                    .install_namespace
                    .clone()
                    .unwrap_or_else(|| format!("{}{}", cluster, HOSTED_NAMESPACE_SUFFIX)),
                hosting_cluster: hosting_cluster.to_string(),
                cluster,
            },
            None => Placement::Standard {
                install_namespace: config
                    .install_namespace
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INSTALL_NAMESPACE.to_string()),
                cluster,
            },
        }
    }

    pub fn cluster(&self) -> &str {
        match self {
            Placement::Standard { cluster, .. } | Placement::Hosted { cluster, .. } => cluster,
        }
    }

    pub fn install_namespace(&self) -> &str {
        match self {
            Placement::Standard {
                install_namespace, ..
            }
            | Placement::Hosted {
                install_namespace, ..
            } => install_namespace,
        }
    }

    /// The cluster whose agent applies the bundle.
    pub fn execution_cluster(&self) -> &str {
        match self {
            Placement::Standard { cluster, .. } => cluster,
            Placement::Hosted {
                hosting_cluster, ..
            } => hosting_cluster,
        }
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, Placement::Hosted { .. })
    }

    pub fn work_location(&self, addon_name: &str) -> WorkLocation {
        let name = match self {
            Placement::Standard { .. } => format!("addon-{}-deploy-0", addon_name),
            Placement::Hosted { cluster, .. } => {
                format!("addon-{}-deploy-hosting-{}-0", addon_name, cluster)
            }
        };
        WorkLocation {
            namespace: self.execution_cluster().to_string(),
            name,
        }
    }

    /// Flags telling the workload which cluster it acts for and how to reach it.
    pub fn cluster_args(&self) -> Vec<String> {
        let mut args = vec![format!(
            "--hub-cluster-configfile={}/kubeconfig",
            HUB_KUBECONFIG_MOUNT
        )];
        match self {
            Placement::Standard { cluster, .. } => {
                args.push(format!("--cluster-namespace={}", cluster));
            }
            Placement::Hosted {
                cluster,
                install_namespace,
                ..
            } => {
                args.push(format!("--cluster-namespace={}", install_namespace));
                args.push(format!("--cluster-namespace-on-hub={}", cluster));
                args.push(format!(
                    "--target-kubeconfig-path={}/kubeconfig",
                    MANAGED_KUBECONFIG_MOUNT
                ));
            }
        }
        args
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Standard { cluster, .. } => write!(f, "standard mode on {}", cluster),
            Placement::Hosted {
                hosting_cluster, ..
            } => write!(f, "hosted mode on {}", hosting_cluster),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve;
    use addon_defs::HOSTING_CLUSTER_ANNOTATION;
    use pretty_assertions::assert_eq;

    fn addon(hosting: Option<&str>) -> ManagedClusterAddOn {
        let mut addon = ManagedClusterAddOn::new("governance-policy-framework", Default::default());
        addon.metadata.namespace = Some("cluster2".to_string());
        if let Some(h) = hosting {
            addon.metadata.annotations = Some(
                [(HOSTING_CLUSTER_ANNOTATION.to_string(), h.to_string())]
                    .into_iter()
                    .collect(),
            );
        }
        addon
    }

    #[test]
    fn test_standard_placement() {
        let addon = addon(None);
        let placement = Placement::resolve(&addon, &resolve(&addon, None, None));
        assert_eq!(placement.install_namespace(), "open-cluster-management-agent-addon");
        assert_eq!(
            placement.work_location("governance-policy-framework"),
            WorkLocation {
                namespace: "cluster2".to_string(),
                name: "addon-governance-policy-framework-deploy-0".to_string()
            }
        );
        assert_eq!(
            placement.cluster_args(),
            vec![
                "--hub-cluster-configfile=/var/run/klusterlet/kubeconfig",
                "--cluster-namespace=cluster2"
            ]
        );
    }

    #[test]
    fn test_hosted_placement() {
        let addon = addon(Some("local-cluster"));
        let placement = Placement::resolve(&addon, &resolve(&addon, None, None));
        assert_eq!(placement.install_namespace(), "cluster2-hosted");
        assert_eq!(placement.execution_cluster(), "local-cluster");
        assert_eq!(
            placement.work_location("governance-policy-framework"),
            WorkLocation {
                namespace: "local-cluster".to_string(),
                name: "addon-governance-policy-framework-deploy-hosting-cluster2-0".to_string()
            }
        );
        assert_eq!(
            placement.cluster_args(),
            vec![
                "--hub-cluster-configfile=/var/run/klusterlet/kubeconfig",
                "--cluster-namespace=cluster2-hosted",
                "--cluster-namespace-on-hub=cluster2",
                "--target-kubeconfig-path=/var/run/managed-kubeconfig/kubeconfig"
            ]
        );
        assert_eq!(placement.to_string(), "hosted mode on local-cluster");
    }

    #[test]
    fn test_hosted_install_namespace_override() {
        let mut addon = addon(Some("local-cluster"));
        addon.spec.install_namespace = Some("custom-ns".to_string());
        let placement = Placement::resolve(&addon, &resolve(&addon, None, None));
        assert_eq!(placement.install_namespace(), "custom-ns");
    }
}
