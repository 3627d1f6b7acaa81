use std::sync::Arc;

use addon_utils::setup_logging;
use kube::Client as KubeClient;
use log::{error, info};
use reconciler::SelfHealer;

mod config;
mod kube_hub;
mod operator;
mod queue;
mod status_server;

use config::OperatorConfig;
use kube_hub::KubeHub;
use operator::start_operator;
use status_server::start_status_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize rustls crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    setup_logging()?;

    let config = OperatorConfig::from_env();
    info!(
        "Starting controller for addon {} with agent image {}",
        config.addon_name, config.agent_image
    );

    let client = KubeClient::try_default().await?;
    let hub = Arc::new(KubeHub::new(client.clone()));
    let healer = Arc::new(SelfHealer::new(hub, config.engine_settings()));

    let status_healer = healer.clone();
    let status_port = config.status_port;
    tokio::spawn(async move {
        if let Err(e) = start_status_server(status_healer, status_port).await {
            error!("Status server stopped: {:?}", e);
        }
    });

    start_operator(config, client, healer).await
}
