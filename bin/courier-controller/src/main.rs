use anyhow::Result;
use courier_core::{
    aggregator, GatewayConfig, RandomFreshness, ReconcileMetrics, Reconciler, SnapshotBuilder,
    SnapshotCache,
};
use courier_kube::{watch_endpoints, watch_ingress_routes, KubeSource};
use courier_server::DiscoveryServer;
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod supervisor;

use supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting courier-controller...");

    let config = GatewayConfig::from_env()?;
    info!(
        node_id = %config.node_id,
        namespace = %config.namespace,
        gateway_port = config.gateway_port,
        management_port = config.management_port,
        queue_capacity = config.queue_capacity,
        "Configuration loaded"
    );

    let client = Client::try_default().await?;
    let metrics = Arc::new(ReconcileMetrics::new()?);
    let cache = Arc::new(SnapshotCache::new());

    // Bursts of events collapse into a single rebuild
    let (notifier, changes) = aggregator::channel(config.queue_capacity, metrics.clone());

    let builder = SnapshotBuilder::new(config.proxy_port, Arc::new(RandomFreshness), metrics.clone());
    let reconciler = Reconciler::new(
        config.node_id.clone(),
        config.namespace.clone(),
        Arc::new(KubeSource::from_client(client.clone())),
        cache.clone(),
        builder,
        changes,
        metrics.clone(),
    );
    let server = Arc::new(DiscoveryServer::new(
        cache,
        metrics,
        &config.node_id,
        config.gateway_port,
        config.management_port,
    ));

    let cancel = CancellationToken::new();
    let mut supervisor = Supervisor::new(cancel.clone());

    {
        let (client, namespace, notifier, cancel) =
            (client.clone(), config.namespace.clone(), notifier.clone(), cancel.clone());
        supervisor.spawn("endpoints-watcher", async move {
            watch_endpoints(client, &namespace, notifier, cancel).await
        });
    }
    {
        let (namespace, cancel) = (config.namespace.clone(), cancel.clone());
        supervisor.spawn("ingress-route-watcher", async move {
            watch_ingress_routes(client, &namespace, notifier, cancel).await
        });
    }
    {
        let (server, cancel) = (server.clone(), cancel.clone());
        supervisor.spawn("management-server", async move {
            server.run_management_server(cancel).await
        });
    }
    {
        let cancel = cancel.clone();
        supervisor.spawn("gateway-listener", async move {
            server.run_gateway_listener(cancel).await
        });
    }
    {
        let cancel = cancel.clone();
        supervisor.spawn("reconciler", async move { Ok(reconciler.run(cancel).await?) });
    }
    supervisor.spawn("shutdown-signal", async move {
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received, exiting...");
        cancel.cancel();
        Ok(())
    });

    supervisor.wait().await
}

/// JSON logs on stdout at info level unless `RUST_LOG` says otherwise;
/// `COURIER_LOG_FORMAT=text` switches to the plain formatter
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match std::env::var("COURIER_LOG_FORMAT").as_deref() {
        Ok("text") => subscriber.init(),
        _ => subscriber.json().init(),
    }
}
