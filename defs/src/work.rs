use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A bundle of manifests applied to a cluster by the work agent running there.
/// Lives in the hub namespace of the cluster it is applied to.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "ManifestWork",
    derive = "PartialEq",
    group = "work.open-cluster-management.io",
    version = "v1",
    namespaced,
    status = "ManifestWorkStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    #[serde(default)]
    pub workload: Workload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_option: Option<DeleteOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifest_configs: Vec<ManifestConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(default)]
    pub manifests: Vec<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOption {
    pub propagation_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectively_orphans: Option<SelectivelyOrphan>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SelectivelyOrphan {
    #[serde(default)]
    pub orphaning_rules: Vec<OrphaningRule>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrphaningRule {
    #[serde(default)]
    pub group: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestConfig {
    pub resource_identifier: ResourceIdentifier,
    #[serde(default)]
    pub feedback_rules: Vec<FeedbackRule>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    #[serde(default)]
    pub group: String,
    pub resource: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRule {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_paths: Vec<JsonPath>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JsonPath {
    pub name: String,
    pub path: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkStatus {
    #[serde(default)]
    pub resource_status: ManifestResourceStatus,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResourceStatus {
    #[serde(default)]
    pub manifests: Vec<ManifestCondition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestCondition {
    pub resource_meta: ManifestResourceMeta,
    #[serde(default)]
    pub status_feedback: StatusFeedback,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResourceMeta {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusFeedback {
    #[serde(default)]
    pub values: Vec<FeedbackValue>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackValue {
    pub name: String,
    pub field_value: FieldValue,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
}

impl ManifestWork {
    pub fn manifests(&self) -> &[Value] {
        &self.spec.workload.manifests
    }

    /// Integer feedback reported by the work agent for one applied resource.
    pub fn feedback_integer(&self, kind: &str, name: &str, field: &str) -> Option<i64> {
        self.status
            .as_ref()?
            .resource_status
            .manifests
            .iter()
            .filter(|m| m.resource_meta.kind == kind && m.resource_meta.name == name)
            .flat_map(|m| m.status_feedback.values.iter())
            .find(|v| v.name == field)
            .and_then(|v| v.field_value.integer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_feedback_integer() {
        let work: ManifestWork = serde_yaml::from_str(
            r#"
apiVersion: work.open-cluster-management.io/v1
kind: ManifestWork
metadata:
  name: addon-governance-policy-framework-deploy-0
  namespace: cluster1
spec:
  workload:
    manifests:
      - apiVersion: v1
        kind: Namespace
        metadata:
          name: cluster1
status:
  resourceStatus:
    manifests:
      - resourceMeta:
          group: apps
          kind: Deployment
          resource: deployments
          name: governance-policy-framework
          namespace: open-cluster-management-agent-addon
        statusFeedback:
          values:
            - name: AvailableReplicas
              fieldValue:
                type: Integer
                integer: 1
"#,
        )
        .unwrap();

        assert_eq!(work.manifests().len(), 1);
        assert_eq!(
            work.feedback_integer("Deployment", "governance-policy-framework", "AvailableReplicas"),
            Some(1)
        );
        assert_eq!(
            work.feedback_integer("Deployment", "governance-policy-framework", "Replicas"),
            None
        );
    }
}
