//! The reconciliation loop
//!
//! The loop sits idle in [`ChangeAggregator::wait_and_drain`] until a watcher
//! reports a change, then fetches every IngressRoute, builds a snapshot and
//! publishes it under the node identity. Fetch always follows the drain and
//! publication always follows the build, so a published snapshot is never
//! older than the signals that triggered it.
//!
//! A failed fetch ends the loop with an error and nothing is published: the
//! caller decides whether that terminates the process.

use crate::aggregator::{ChangeAggregator, Wake};
use crate::store::SnapshotStore;
use crate::{ReconcileMetrics, Result, SnapshotBuilder};
use async_trait::async_trait;
use courier_api::IngressRoute;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Where the desired state comes from
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Every IngressRoute in `namespace` (all namespaces when empty)
    async fn routing_resources(&self, namespace: &str) -> Result<Vec<IngressRoute>>;
}

pub struct Reconciler {
    node_id: String,
    namespace: String,
    source: Arc<dyn ResourceSource>,
    store: Arc<dyn SnapshotStore>,
    builder: SnapshotBuilder,
    aggregator: ChangeAggregator,
    metrics: Arc<ReconcileMetrics>,
    cycle: u64,
}

impl Reconciler {
    pub fn new(
        node_id: impl Into<String>,
        namespace: impl Into<String>,
        source: Arc<dyn ResourceSource>,
        store: Arc<dyn SnapshotStore>,
        builder: SnapshotBuilder,
        aggregator: ChangeAggregator,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            namespace: namespace.into(),
            source,
            store,
            builder,
            aggregator,
            metrics,
            cycle: 0,
        }
    }

    /// Publish once, then reconcile on every wake until cancelled.
    ///
    /// Returns `Ok(())` when `cancel` fires or every notifier is gone, and the
    /// fetch error if the desired state could not be read.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(node_id = %self.node_id, namespace = %self.namespace, "Starting reconciliation loop");

        self.reconcile().await?;
        while self.step(&cancel).await?.is_some() {}

        info!(cycles = self.cycle, "Reconciliation loop stopped");
        Ok(())
    }

    /// Wait for the next burst of changes and reconcile once.
    ///
    /// Returns the published version, or `None` if the loop should stop.
    pub async fn step(&mut self, cancel: &CancellationToken) -> Result<Option<String>> {
        match self.aggregator.wait_and_drain(cancel).await {
            Wake::Changed { coalesced } => {
                debug!(coalesced, "Woken by change signals");
                self.metrics
                    .coalesced_signals_total
                    .inc_by(coalesced.saturating_sub(1) as u64);
                self.reconcile().await.map(Some)
            }
            Wake::Cancelled => Ok(None),
            Wake::Closed => {
                warn!("All change notifiers dropped");
                Ok(None)
            }
        }
    }

    /// Fetch, build and publish once
    pub async fn reconcile(&mut self) -> Result<String> {
        self.cycle += 1;
        let span = info_span!("reconcile", cycle = self.cycle, node_id = %self.node_id);
        self.publish_current().instrument(span).await
    }

    async fn publish_current(&self) -> Result<String> {
        let routes = match self.source.routing_resources(&self.namespace).await {
            Ok(routes) => routes,
            Err(e) => {
                error!(namespace = %self.namespace, error = %e, "Failed to fetch IngressRoutes, not publishing");
                return Err(e);
            }
        };
        debug!(count = routes.len(), "Fetched IngressRoutes");

        let snapshot = self.builder.build(&self.node_id, &routes);
        let version = snapshot.version.clone();
        let virtual_hosts = snapshot.virtual_hosts().len();
        self.store.set_snapshot(&self.node_id, snapshot);

        self.metrics.cycles_total.inc();
        self.metrics.published_virtual_hosts.set(virtual_hosts as i64);
        info!(version = %version, resources = routes.len(), virtual_hosts, "Published snapshot");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{self, ChangeNotifier};
    use crate::{CoreError, RandomFreshness, SnapshotCache};
    use courier_api::v1alpha1::{Backend, IngressRouteSpec, RouteRule};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct FakeSource {
        routes: Mutex<Vec<IngressRoute>>,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeSource {
        fn set_routes(&self, routes: Vec<IngressRoute>) {
            *self.routes.lock().unwrap() = routes;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceSource for FakeSource {
        async fn routing_resources(&self, namespace: &str) -> Result<Vec<IngressRoute>> {
            assert_eq!(namespace, "shop");
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CoreError::fetch("connection refused"));
            }
            Ok(self.routes.lock().unwrap().clone())
        }
    }

    fn route(name: &str, host: &str) -> IngressRoute {
        let mut route = IngressRoute::new(
            name,
            IngressRouteSpec {
                hosts: vec![host.to_string()],
                rules: vec![RouteRule {
                    backends: vec![Backend {
                        service_name: name.to_string(),
                        service_namespace: None,
                        port: 80,
                        weight: 100,
                    }],
                    ..Default::default()
                }],
            },
        );
        route.metadata.namespace = Some("shop".to_string());
        route
    }

    struct Harness {
        source: Arc<FakeSource>,
        store: Arc<SnapshotCache>,
        notifier: ChangeNotifier,
        metrics: Arc<ReconcileMetrics>,
        reconciler: Reconciler,
    }

    fn harness() -> Harness {
        let metrics = Arc::new(ReconcileMetrics::new().unwrap());
        let source = Arc::new(FakeSource::default());
        let store = Arc::new(SnapshotCache::new());
        let (notifier, aggregator) = aggregator::channel(10, metrics.clone());
        let builder = SnapshotBuilder::new(19001, Arc::new(RandomFreshness), metrics.clone());
        let reconciler = Reconciler::new(
            "node",
            "shop",
            source.clone(),
            store.clone(),
            builder,
            aggregator,
            metrics.clone(),
        );
        Harness {
            source,
            store,
            notifier,
            metrics,
            reconciler,
        }
    }

    #[tokio::test]
    async fn test_reconcile_publishes_under_node_id() {
        let mut h = harness();
        h.source.set_routes(vec![route("x", "x.example.com")]);

        let version = h.reconciler.reconcile().await.unwrap();

        let published = h.store.snapshot("node").unwrap();
        assert_eq!(published.version, version);
        assert_eq!(published.virtual_hosts().len(), 2);
        assert_eq!(h.metrics.cycles_total.get(), 1);
        assert_eq!(h.metrics.published_virtual_hosts.get(), 2);
    }

    #[tokio::test]
    async fn test_five_signals_one_cycle() {
        let mut h = harness();
        let cancel = CancellationToken::new();
        for _ in 0..5 {
            h.notifier.notify();
        }

        assert!(h.reconciler.step(&cancel).await.unwrap().is_some());
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.metrics.coalesced_signals_total.get(), 4);

        cancel.cancel();
        assert!(h.reconciler.step(&cancel).await.unwrap().is_none());
        assert_eq!(h.source.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_sees_state_after_signal() {
        let mut h = harness();
        let cancel = CancellationToken::new();
        h.notifier.notify();
        h.source.set_routes(vec![route("late", "late.example.com")]);

        h.reconciler.step(&cancel).await.unwrap();

        let published = h.store.snapshot("node").unwrap();
        assert!(published.virtual_hosts().iter().any(|vh| vh.name == "shop/late"));
    }

    #[tokio::test]
    async fn test_fetch_failure_stops_without_publishing() {
        let h = harness();
        h.source.fail.store(true, Ordering::SeqCst);

        let result = h.reconciler.run(CancellationToken::new()).await;

        assert!(matches!(result, Err(CoreError::FetchError(_))));
        assert!(h.store.snapshot("node").is_none());
        assert_eq!(h.metrics.cycles_total.get(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_mid_run_keeps_last_snapshot() {
        let mut h = harness();
        let cancel = CancellationToken::new();
        let first = h.reconciler.reconcile().await.unwrap();

        h.source.fail.store(true, Ordering::SeqCst);
        h.notifier.notify();
        assert!(h.reconciler.step(&cancel).await.is_err());
        assert_eq!(h.store.snapshot("node").unwrap().version, first);
    }

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let h = harness();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(h.reconciler.run(cancel.clone()));

        // Initial publication
        let initial = timeout(Duration::from_secs(1), async {
            loop {
                if let Some(snapshot) = h.store.snapshot("node") {
                    return snapshot.version.clone();
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let mut updates = h.store.subscribe("node").unwrap();

        h.source.set_routes(vec![route("x", "x.example.com")]);
        h.notifier.notify();
        timeout(Duration::from_secs(1), updates.changed()).await.unwrap().unwrap();
        let next = updates.borrow_and_update().clone().unwrap();
        assert_ne!(next.version, initial);
        assert_eq!(next.virtual_hosts().len(), 2);

        cancel.cancel();
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_when_notifiers_dropped() {
        let h = harness();
        drop(h.notifier);
        h.reconciler.run(CancellationToken::new()).await.unwrap();
        assert_eq!(h.source.calls(), 1);
    }
}
