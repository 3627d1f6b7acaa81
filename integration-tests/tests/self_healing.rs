mod utils;
use utils::test_scaffold;

#[cfg(test)]
mod self_healing_tests {
    use super::*;
    use addon_defs::{AddOnDeploymentConfigSpec, PAUSE_ANNOTATION};
    use pretty_assertions::assert_eq;
    use reconciler::{AddonHealth, ReconcileError, TargetPhase};
    use serde_json::{json, Value};
    use utils::{ADDON, CONFIG_NAMESPACE, INSTALL_NAMESPACE};

    fn tamper(manifests: &mut Vec<Value>) {
        manifests.push(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "injected", "namespace": "default"}
        }));
        if let Some(deployment) = manifests.iter_mut().find(|m| m["kind"] == "Deployment") {
            deployment["spec"]["replicas"] = json!(3);
        }
    }

    #[tokio::test]
    async fn test_steady_target_is_idempotent() {
        test_scaffold(|s| async move {
            s.enable_addon("cluster1", &[]);
            let outcome = s.settle("cluster1").await;
            assert_eq!(outcome.phase, TargetPhase::Steady);

            let writes = s.hub.write_count();
            for _ in 0..3 {
                let outcome = s.reconcile("cluster1").await;
                assert_eq!(outcome.writes, 0);
                assert_eq!(outcome.drift, vec![]);
            }
            assert_eq!(s.hub.write_count(), writes);
        })
        .await;
    }

    #[tokio::test]
    async fn test_drift_is_reverted() {
        test_scaffold(|s| async move {
            s.enable_addon("cluster1", &[]);
            s.settle("cluster1").await;
            let location = s.standard_location("cluster1");
            let desired = s.hub.work(&location).unwrap().spec;

            s.hub.patch_work_manifests(&location, tamper);
            assert!(s.hub.has_object("cluster1", "ConfigMap", "default", "injected"));

            let outcome = s.reconcile("cluster1").await;
            assert_eq!(outcome.phase, TargetPhase::Reconciling);
            assert_eq!(outcome.drift.is_empty(), false);
            assert_eq!(s.hub.work(&location).unwrap().spec, desired);
            assert_eq!(
                s.hub.has_object("cluster1", "ConfigMap", "default", "injected"),
                false
            );
            assert_eq!(s.reconcile("cluster1").await.phase, TargetPhase::Steady);
        })
        .await;
    }

    #[tokio::test]
    async fn test_added_fields_are_reverted() {
        test_scaffold(|s| async move {
            s.enable_addon("cluster1", &[]);
            s.settle("cluster1").await;
            let location = s.standard_location("cluster1");
            let desired = s.hub.work(&location).unwrap().spec;

            s.hub.patch_work_manifests(&location, |manifests| {
                if let Some(deployment) = manifests.iter_mut().find(|m| m["kind"] == "Deployment") {
                    let pod = &mut deployment["spec"]["template"]["spec"];
                    pod["hostNetwork"] = json!(true);
                    pod["containers"][0]["securityContext"] = json!({"privileged": true});
                }
            });

            let outcome = s.reconcile("cluster1").await;
            assert_eq!(outcome.phase, TargetPhase::Reconciling);
            assert_eq!(outcome.drift.is_empty(), false);
            assert_eq!(s.hub.work(&location).unwrap().spec, desired);
            let pod = s.manifest("cluster1", "Deployment")["spec"]["template"]["spec"].clone();
            assert_eq!(pod.get("hostNetwork"), None);
            assert_eq!(s.container("cluster1").get("securityContext"), None);
            assert_eq!(s.reconcile("cluster1").await.phase, TargetPhase::Steady);
        })
        .await;
    }

    #[tokio::test]
    async fn test_pause_preserves_drift_until_resumed() {
        test_scaffold(|s| async move {
            s.enable_addon("cluster1", &[]);
            s.settle("cluster1").await;
            let location = s.standard_location("cluster1");
            let desired = s.hub.work(&location).unwrap().spec;

            s.hub
                .annotate_addon(&s.target("cluster1"), PAUSE_ANNOTATION, Some("true"));
            s.hub.patch_work_manifests(&location, tamper);

            for _ in 0..2 {
                let outcome = s.reconcile("cluster1").await;
                assert_eq!(outcome.phase, TargetPhase::Paused);
                assert_eq!(outcome.drift.is_empty(), false);
            }
            assert!(s.hub.has_object("cluster1", "ConfigMap", "default", "injected"));
            assert_eq!(s.replicas("cluster1"), 3);
            assert_eq!(
                s.healer.status(&s.target("cluster1")).await.unwrap().paused,
                true
            );

            let addon = s.hub.addon(&s.target("cluster1")).unwrap();
            assert_eq!(addon.condition("ReconcileError").unwrap().reason, "Paused");

            s.hub.annotate_addon(&s.target("cluster1"), PAUSE_ANNOTATION, None);
            let outcome = s.reconcile("cluster1").await;
            assert_eq!(outcome.phase, TargetPhase::Reconciling);
            assert_eq!(s.hub.work(&location).unwrap().spec, desired);
            assert_eq!(s.replicas("cluster1"), 1);
        })
        .await;
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        test_scaffold(|s| async move {
            s.enable_addon("cluster1", &[]);
            s.settle("cluster1").await;
            let location = s.standard_location("cluster1");

            s.hub.patch_work_manifests(&location, tamper);
            s.hub.conflict_next_replaces(2);
            let outcome = s.reconcile("cluster1").await;
            assert_eq!(outcome.phase, TargetPhase::Reconciling);
            assert_eq!(s.replicas("cluster1"), 1);

            s.hub.patch_work_manifests(&location, tamper);
            s.hub.conflict_next_replaces(100);
            let result = s.healer.reconcile(&s.target("cluster1")).await;
            match result {
                Err(e @ ReconcileError::ConflictRetriesExhausted(_)) => {
                    assert_eq!(e.is_transient(), true)
                }
                other => panic!("expected exhausted retries, got {:?}", other),
            }
        })
        .await;
    }

    #[tokio::test]
    async fn test_missing_deployment_config_keeps_the_live_bundle() {
        test_scaffold(|s| async move {
            s.bind_deployment_config(AddOnDeploymentConfigSpec::default());
            s.enable_addon("cluster1", &[]);
            s.settle("cluster1").await;
            let location = s.standard_location("cluster1");
            let live = s.hub.work(&location).unwrap();

            s.hub.remove_deployment_config(CONFIG_NAMESPACE, ADDON);
            s.hub
                .annotate_addon(&s.target("cluster1"), "log-level", Some("2"));
            let result = s.healer.reconcile(&s.target("cluster1")).await;

            assert!(matches!(
                result,
                Err(ReconcileError::MissingDeploymentConfig { .. })
            ));
            assert_eq!(s.hub.work(&location), Some(live));
            let addon = s.hub.addon(&s.target("cluster1")).unwrap();
            assert_eq!(
                addon.condition("ReconcileError").unwrap().reason,
                "DeploymentConfigNotFound"
            );

            s.bind_deployment_config(AddOnDeploymentConfigSpec::default());
            s.settle("cluster1").await;
            assert!(s.args("cluster1").contains(&"--log-level=2".to_string()));
            let addon = s.hub.addon(&s.target("cluster1")).unwrap();
            assert_eq!(addon.condition("ReconcileError").unwrap().status, "False");
        })
        .await;
    }

    #[tokio::test]
    async fn test_availability_follows_feedback() {
        test_scaffold(|s| async move {
            s.hub.set_auto_ready(false);
            s.enable_addon("cluster1", &[]);
            let outcome = s.settle("cluster1").await;
            assert_eq!(outcome.health, AddonHealth::Unknown);
            let location = s.standard_location("cluster1");

            s.hub.set_feedback(&location, 1, 1, 0);
            let outcome = s.reconcile("cluster1").await;
            assert!(matches!(outcome.health, AddonHealth::Unavailable { .. }));
            let addon = s.hub.addon(&s.target("cluster1")).unwrap();
            let unavailable = addon.condition("Available").unwrap().clone();
            assert_eq!(unavailable.status, "False");
            let degraded_since = addon
                .condition("Degraded")
                .unwrap()
                .last_transition_time
                .clone();

            s.hub.set_feedback(&location, 1, 1, 1);
            let outcome = s.reconcile("cluster1").await;
            assert_eq!(outcome.health, AddonHealth::Available);
            let addon = s.hub.addon(&s.target("cluster1")).unwrap();
            assert_eq!(addon.condition("Available").unwrap().status, "True");
            assert_eq!(
                addon.condition("Degraded").unwrap().last_transition_time,
                degraded_since
            );
            assert_eq!(
                s.healer.status(&s.target("cluster1")).await.unwrap().available,
                true
            );

            // Unchanged conditions are not rewritten
            assert_eq!(s.reconcile("cluster1").await.writes, 0);
            assert!(s.hub.has_object("cluster1", "Deployment", INSTALL_NAMESPACE, ADDON));
        })
        .await;
    }
}
