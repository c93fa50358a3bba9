//! atlas-agent - synchronizes the cluster's ingress topology with the platform.

use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use kube::Client as KubeClient;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use atlas::platform::Client;
use atlas::topology::store::Store;
use atlas::topology::watch::Watcher;

/// Atlas agent - replicates the cluster's ingress topology onto the platform
#[derive(Parser, Debug)]
#[command(name = "atlas-agent", version, about, long_about = None)]
struct Cli {
    /// Base URL of the platform API
    #[arg(
        long,
        env = "ATLAS_PLATFORM_URL",
        default_value = "https://platform.atlas.internal/agent"
    )]
    platform_url: String,

    /// Platform access token
    #[arg(long, env = "ATLAS_TOKEN")]
    token: String,

    /// Seconds between topology synchronizations; the platform configuration
    /// takes precedence when available
    #[arg(long, env = "ATLAS_SYNC_INTERVAL", default_value = "15")]
    sync_interval_secs: u64,

    /// Seconds between liveness pings
    #[arg(long, env = "ATLAS_PING_INTERVAL", default_value = "60")]
    ping_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Both kube and reqwest link rustls; a process-level provider must be
    // picked before the first TLS handshake.
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install crypto provider");

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let platform = Client::new(&cli.platform_url, &cli.token).context("create platform client")?;
    let kube = KubeClient::try_default()
        .await
        .context("create kubernetes client")?;

    // The kube-system namespace UID is stable for the lifetime of the
    // cluster and serves as its identity towards the platform.
    let kube_id = kube_system_uid(&kube)
        .await
        .context("read cluster identifier")?;
    let cluster_id = platform.link(&kube_id).await.context("link agent")?;
    info!(cluster_id = %cluster_id, "Agent linked to platform");

    let sync_interval = match platform.get_config().await {
        Ok(config) => Duration::from_secs(config.topology.sync_interval_seconds),
        Err(err) => {
            warn!(error = %err, "Unable to fetch agent configuration, using defaults");
            Duration::from_secs(cli.sync_interval_secs)
        }
    };

    spawn_ping_loop(platform.clone(), Duration::from_secs(cli.ping_interval_secs));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let mut store = Store::new(platform);
    let watcher = Watcher::new(cluster_id, sync_interval);
    watcher.run(kube, &mut store, shutdown_rx).await;

    Ok(())
}

/// Tells the platform the agent is alive, forever.
fn spawn_ping_loop(platform: Client, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = platform.ping().await {
                warn!(error = %err, "Platform ping failed");
            }
        }
    });
}

/// UID of the kube-system namespace, the cluster's stable identity.
async fn kube_system_uid(kube: &KubeClient) -> anyhow::Result<String> {
    let namespaces: kube::Api<k8s_openapi::api::core::v1::Namespace> = kube::Api::all(kube.clone());
    let namespace = namespaces.get("kube-system").await?;
    namespace
        .metadata
        .uid
        .ok_or_else(|| anyhow::anyhow!("kube-system namespace has no uid"))
}
