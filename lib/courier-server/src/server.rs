//! Entry points for the two discovery listeners

use crate::gateway::GatewayHandler;
use crate::http::serve_listener;
use crate::management::ManagementHandler;
use courier_core::{ReconcileMetrics, SnapshotCache};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Serves the snapshots held in a [`SnapshotCache`]
pub struct DiscoveryServer {
    gateway: GatewayHandler,
    management: ManagementHandler,
    gateway_addr: SocketAddr,
    management_addr: SocketAddr,
}

impl DiscoveryServer {
    pub fn new(
        cache: Arc<SnapshotCache>,
        metrics: Arc<ReconcileMetrics>,
        node_id: &str,
        gateway_port: u16,
        management_port: u16,
    ) -> Self {
        Self {
            gateway: GatewayHandler::new(cache.clone(), node_id),
            management: ManagementHandler::new(cache, metrics),
            gateway_addr: ([0, 0, 0, 0], gateway_port).into(),
            management_addr: ([0, 0, 0, 0], management_port).into(),
        }
    }

    /// Run the proxy-facing listener until `cancel` fires
    pub async fn run_gateway_listener(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.gateway_addr).await?;
        serve_gateway(listener, self.gateway.clone(), cancel).await
    }

    /// Run the management listener until `cancel` fires
    pub async fn run_management_server(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.management_addr).await?;
        serve_management(listener, self.management.clone(), cancel).await
    }
}

async fn serve_gateway(
    listener: TcpListener,
    handler: GatewayHandler,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    serve_listener(listener, "gateway", cancel, move |req| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(req).await) }
    })
    .await
}

async fn serve_management(
    listener: TcpListener,
    handler: ManagementHandler,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    serve_listener(listener, "management", cancel, move |req| {
        let response = handler.handle(&req);
        async move { Ok::<_, Infallible>(response) }
    })
    .await
}
