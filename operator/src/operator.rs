use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use addon_defs::{
    AddOnDeploymentConfig, ClusterManagementAddOn, ManagedCluster, ManagedClusterAddOn,
    ManifestWork, ADDON_NAME_LABEL, ADDON_NAMESPACE_LABEL,
};
use futures::stream::StreamExt;
use kube::api::Api;
use kube::{Client as KubeClient, Resource, ResourceExt};
use kube_leader_election::{LeaseLock, LeaseLockParams};
use kube_runtime::watcher;
use log::{debug, error, info, warn};
use reconciler::{HubApi, SelfHealer, TargetPhase, TargetRef};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::OperatorConfig;
use crate::queue::{Trigger, WorkQueue};

pub async fn start_operator<H: HubApi + 'static>(
    config: OperatorConfig,
    client: KubeClient,
    healer: Arc<SelfHealer<H>>,
) -> anyhow::Result<()> {
    let leadership = create_lease_lock(client.clone(), &config);

    loop {
        match leadership.try_acquire_or_renew().await {
            Ok(lease) if lease.acquired_lease => {
                info!("Leadership acquired by {}", config.holder_id());
                let tasks = start_controller(&config, client.clone(), healer.clone());
                renew_leadership(&leadership).await;

                warn!("Leadership lost, stopping the controller");
                for task in tasks {
                    task.abort();
                }
            }
            Ok(_) => {
                info!("There is already a leader, waiting for it to release leadership");
                time::sleep(Duration::from_secs(15)).await;
            }
            Err(e) => {
                error!("Failed to acquire leadership: {:?}", e);
                time::sleep(Duration::from_secs(15)).await;
            }
        }
    }
}

fn create_lease_lock(client: KubeClient, config: &OperatorConfig) -> LeaseLock {
    LeaseLock::new(
        client,
        &config.namespace,
        LeaseLockParams {
            holder_id: config.holder_id(),
            lease_name: config.lease_name(),
            lease_ttl: Duration::from_secs(25),
        },
    )
}

/// Returns once the lease can no longer be renewed.
async fn renew_leadership(leadership: &LeaseLock) {
    let mut renew_interval = time::interval(Duration::from_secs(10));

    loop {
        renew_interval.tick().await;
        match leadership.try_acquire_or_renew().await {
            Ok(lease) if lease.acquired_lease => debug!("Leadership renewed"),
            Ok(_) => {
                warn!("Lease was taken over by another replica");
                break;
            }
            Err(e) => {
                error!("Lost leadership due to error: {:?}", e);
                break;
            }
        }
    }
}

fn start_controller<H: HubApi + 'static>(
    config: &OperatorConfig,
    client: KubeClient,
    healer: Arc<SelfHealer<H>>,
) -> Vec<JoinHandle<()>> {
    let (tx, rx) = mpsc::channel::<Trigger>(256);
    let addon = config.addon_name.clone();

    let addon_watch = {
        let addon = addon.clone();
        start_watcher(
            "ManagedClusterAddOn",
            Api::<ManagedClusterAddOn>::all(client.clone()),
            watcher::Config::default().fields(&format!("metadata.name={}", addon)),
            tx.clone(),
            move |a: &ManagedClusterAddOn| {
                vec![Trigger::Target(TargetRef::new(a.cluster_name(), a.name_any()))]
            },
        )
    };

    let work_watch = start_watcher(
        "ManifestWork",
        Api::<ManifestWork>::all(client.clone()),
        watcher::Config::default().labels(&format!("{}={}", ADDON_NAME_LABEL, addon)),
        tx.clone(),
        |w: &ManifestWork| {
            let labels = w.labels();
            match (labels.get(ADDON_NAMESPACE_LABEL), labels.get(ADDON_NAME_LABEL)) {
                (Some(cluster), Some(addon)) => {
                    vec![Trigger::Target(TargetRef::new(cluster, addon))]
                }
                _ => vec![],
            }
        },
    );

    // Hosted targets read the capability of their hosting cluster, which the
    // periodic resync picks up.
    let cluster_watch = {
        let addon = addon.clone();
        start_watcher(
            "ManagedCluster",
            Api::<ManagedCluster>::all(client.clone()),
            watcher::Config::default(),
            tx.clone(),
            move |c: &ManagedCluster| vec![Trigger::Target(TargetRef::new(c.name_any(), &addon))],
        )
    };

    let template_watch = {
        let addon = addon.clone();
        start_watcher(
            "ClusterManagementAddOn",
            Api::<ClusterManagementAddOn>::all(client.clone()),
            watcher::Config::default().fields(&format!("metadata.name={}", addon)),
            tx.clone(),
            |_: &ClusterManagementAddOn| vec![Trigger::Resync],
        )
    };

    let config_watch = start_watcher(
        "AddOnDeploymentConfig",
        Api::<AddOnDeploymentConfig>::all(client),
        watcher::Config::default(),
        tx.clone(),
        |_: &AddOnDeploymentConfig| vec![Trigger::Resync],
    );

    let resync = start_resync(config.resync_interval, tx.clone());
    let dispatcher = start_dispatcher(healer, rx, tx);

    vec![
        addon_watch,
        work_watch,
        cluster_watch,
        template_watch,
        config_watch,
        resync,
        dispatcher,
    ]
}

fn start_watcher<K, F>(
    kind: &'static str,
    api: Api<K>,
    watcher_config: watcher::Config,
    tx: mpsc::Sender<Trigger>,
    triggers_for: F,
) -> JoinHandle<()>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&K) -> Vec<Trigger> + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!("Starting {} watcher", kind);

        let mut restart_count = 0;
        loop {
            restart_count += 1;

            if restart_count > 1 {
                info!("Restarting {} watcher (attempt #{})", kind, restart_count);
            }

            match watch(kind, api.clone(), watcher_config.clone(), &tx, &triggers_for).await {
                Ok(_) => {
                    info!("{} watcher terminated normally", kind);
                    break;
                }
                Err(e) => {
                    if is_fatal_error(&e) {
                        error!("Fatal error in {} watcher: {}. Stopping.", kind, e);
                        break;
                    }

                    let backoff_seconds = std::cmp::min(2u64.pow(restart_count.min(5)), 60);

                    warn!(
                        "{} watcher failed (attempt #{}): {}. Restarting in {}s...",
                        kind, restart_count, e, backoff_seconds
                    );

                    time::sleep(Duration::from_secs(backoff_seconds)).await;
                }
            }
        }

        info!("{} watcher task has stopped", kind);
    })
}

async fn watch<K, F>(
    kind: &str,
    api: Api<K>,
    watcher_config: watcher::Config,
    tx: &mpsc::Sender<Trigger>,
    triggers_for: &F,
) -> anyhow::Result<()>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&K) -> Vec<Trigger>,
{
    let mut watcher_stream = watcher(api, watcher_config).boxed();

    while let Some(event_result) = watcher_stream.next().await {
        let triggers = match event_result? {
            watcher::Event::Apply(resource)
            | watcher::Event::InitApply(resource)
            | watcher::Event::Delete(resource) => triggers_for(&resource),
            watcher::Event::Init => {
                debug!("Watcher Init event for {}", kind);
                vec![]
            }
            watcher::Event::InitDone => {
                debug!("Watcher InitDone event for {}", kind);
                vec![]
            }
        };

        for trigger in triggers {
            if tx.send(trigger).await.is_err() {
                // Dispatcher is gone, the controller is shutting down
                return Ok(());
            }
        }
    }

    Ok(())
}

fn is_fatal_error(error: &anyhow::Error) -> bool {
    if let Some(watcher::Error::InitialListFailed(kube::Error::Api(api_err))) =
        error.downcast_ref::<watcher::Error>()
    {
        return matches!(api_err.code, 401 | 403)
            || (api_err.code == 404 && api_err.reason == "NotFound");
    }

    false
}

fn start_resync(interval: Duration, tx: mpsc::Sender<Trigger>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.send(Trigger::Resync).await.is_err() {
                break;
            }
        }
    })
}

fn start_dispatcher<H: HubApi + 'static>(
    healer: Arc<SelfHealer<H>>,
    mut rx: mpsc::Receiver<Trigger>,
    tx: mpsc::Sender<Trigger>,
) -> JoinHandle<()> {
    let queue = Arc::new(WorkQueue::new());

    tokio::spawn(async move {
        while let Some(trigger) = rx.recv().await {
            let targets = match trigger {
                Trigger::Target(target) => vec![target],
                Trigger::Resync => match healer.targets().await {
                    Ok(targets) => targets,
                    Err(e) => {
                        warn!("Failed to list targets for resync: {}", e);
                        continue;
                    }
                },
            };

            for target in targets {
                if !queue.enqueue(&target) {
                    continue;
                }
                tokio::spawn(run_pass(
                    healer.clone(),
                    queue.clone(),
                    tx.clone(),
                    target,
                ));
            }
        }
    })
}

async fn run_pass<H: HubApi + 'static>(
    healer: Arc<SelfHealer<H>>,
    queue: Arc<WorkQueue>,
    tx: mpsc::Sender<Trigger>,
    target: TargetRef,
) {
    queue.start(&target);

    match healer.reconcile(&target).await {
        Ok(outcome) => {
            queue.succeeded(&target);
            match outcome.phase {
                TargetPhase::Reconciling => info!(
                    "Reconciled {} with {} writes ({} drifts corrected)",
                    target,
                    outcome.writes,
                    outcome.drift.len()
                ),
                TargetPhase::Absent => info!("{} is removed", target),
                phase => debug!("{} is {:?}", target, phase),
            }
        }
        Err(e) if e.is_transient() => {
            let delay = queue.failed(&target);
            warn!(
                "Reconcile of {} failed: {}. Retrying in {}s",
                target,
                e,
                delay.as_secs()
            );
            time::sleep(delay).await;
            let _ = tx.send(Trigger::Target(target)).await;
        }
        Err(e) => {
            queue.succeeded(&target);
            error!("Reconcile of {} failed: {}", target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addon_defs::ManagedClusterAddOnSpec;
    use pretty_assertions::assert_eq;
    use reconciler::{EngineSettings, MemoryHub, WorkLocation};

    fn addon(cluster: &str) -> ManagedClusterAddOn {
        let mut addon =
            ManagedClusterAddOn::new("governance-policy-framework", ManagedClusterAddOnSpec::default());
        addon.metadata.namespace = Some(cluster.to_string());
        addon
    }

    #[tokio::test]
    async fn test_dispatcher_reconciles_resync_targets() {
        let hub = Arc::new(MemoryHub::new());
        hub.add_cluster("cluster1", "v1.30.2");
        hub.add_cluster("cluster2", "v1.30.2");
        hub.put_addon(addon("cluster1"));
        hub.put_addon(addon("cluster2"));
        let healer = Arc::new(SelfHealer::new(hub.clone(), EngineSettings::default()));

        let (tx, rx) = mpsc::channel(16);
        let dispatcher = start_dispatcher(healer.clone(), rx, tx.clone());
        tx.send(Trigger::Resync).await.unwrap();

        let location = |cluster: &str| WorkLocation {
            namespace: cluster.to_string(),
            name: "addon-governance-policy-framework-deploy-0".to_string(),
        };
        for _ in 0..100 {
            if hub.work(&location("cluster1")).is_some() && hub.work(&location("cluster2")).is_some()
            {
                break;
            }
            time::sleep(Duration::from_millis(20)).await;
        }
        dispatcher.abort();

        assert_eq!(hub.work(&location("cluster1")).is_some(), true);
        assert_eq!(hub.work(&location("cluster2")).is_some(), true);
    }

    #[tokio::test]
    async fn test_transient_failure_is_requeued() {
        let hub = Arc::new(MemoryHub::new());
        hub.add_cluster("cluster1", "v1.30.2");
        hub.put_addon(addon("cluster1"));
        hub.set_cluster_unavailable("cluster1", true);
        let healer = Arc::new(SelfHealer::new(hub.clone(), EngineSettings::default()));
        let queue = Arc::new(WorkQueue::new());
        let (tx, mut rx) = mpsc::channel(16);

        let target = TargetRef::new("cluster1", "governance-policy-framework");
        time::pause();
        let pass = tokio::spawn(run_pass(healer, queue, tx, target.clone()));
        let requeued = rx.recv().await;
        pass.await.unwrap();

        assert_eq!(requeued, Some(Trigger::Target(target)));
    }

    #[test]
    fn test_is_fatal_error() {
        let forbidden = watcher::Error::InitialListFailed(kube::Error::Api(
            kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "forbidden".to_string(),
                reason: "Forbidden".to_string(),
                code: 403,
            },
        ));
        assert_eq!(is_fatal_error(&anyhow::Error::new(forbidden)), true);

        let unavailable = watcher::Error::InitialListFailed(kube::Error::Api(
            kube::core::ErrorResponse {
                status: "Failure".to_string(),
                message: "unavailable".to_string(),
                reason: "ServiceUnavailable".to_string(),
                code: 503,
            },
        ));
        assert_eq!(is_fatal_error(&anyhow::Error::new(unavailable)), false);
    }
}
