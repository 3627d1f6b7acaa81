use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The hub's identity object for a managed cluster. Cluster scoped.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "ManagedCluster",
    derive = "PartialEq",
    group = "cluster.open-cluster-management.io",
    version = "v1",
    status = "ManagedClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    #[serde(default)]
    pub hub_accepts_client: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<ManagedClusterVersion>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterVersion {
    #[serde(default)]
    pub kubernetes: String,
}

impl ManagedCluster {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(|v| v.as_str())
    }

    /// Minor version of the cluster's API server as reported by the registration agent,
    /// e.g. `v1.29.3+k3s1` yields 29.
    pub fn minor_version(&self) -> Option<u32> {
        let version = self.status.as_ref()?.version.as_ref()?;
        parse_minor_version(&version.kubernetes)
    }
}

pub fn parse_minor_version(version: &str) -> Option<u32> {
    let trimmed = version.trim().trim_start_matches('v');
    let mut parts = trimmed.split('.');
    let major = parts.next()?;
    if major.parse::<u32>().is_err() {
        return None;
    }
    let minor: String = parts
        .next()?
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    minor.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minor_version() {
        assert_eq!(parse_minor_version("v1.29.3+k3s1"), Some(29));
        assert_eq!(parse_minor_version("v1.19.16"), Some(19));
        assert_eq!(parse_minor_version("1.20+"), Some(20));
        assert_eq!(parse_minor_version(""), None);
        assert_eq!(parse_minor_version("vX.20.1"), None);
        assert_eq!(parse_minor_version("v1"), None);
    }

    #[test]
    fn test_cluster_without_status_has_no_version() {
        let cluster = ManagedCluster::new("cluster1", Default::default());
        assert_eq!(cluster.minor_version(), None);
    }
}
