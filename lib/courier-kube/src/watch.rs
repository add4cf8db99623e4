//! Watchers that turn Kubernetes events into change signals

use crate::source::scoped_api;
use courier_api::IngressRoute;
use courier_core::ChangeNotifier;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Endpoints;
use kube::{Api, Client, Resource};
use kube_runtime::{watcher, WatchStreamExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Push a change signal for every event on `api` until cancelled.
///
/// Watch errors are logged and the watcher re-lists with backoff. The
/// initial listing produces a single signal once it completes.
pub async fn watch_changes<K>(
    api: Api<K>,
    kind: &'static str,
    notifier: ChangeNotifier,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    info!(kind, "Starting watcher");
    let mut events = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!(kind, "Stopping watcher");
                return Ok(());
            }
            event = events.next() => event,
        };

        match event {
            Some(Ok(event)) => {
                if is_change(&event) {
                    debug!(kind, "Observed change");
                    notifier.notify();
                }
            }
            Some(Err(e)) => warn!(kind, error = %e, "Watch error, retrying"),
            None => anyhow::bail!("{} watch stream ended", kind),
        }
    }
}

/// Watch IngressRoutes in `namespace`
pub async fn watch_ingress_routes(
    client: Client,
    namespace: &str,
    notifier: ChangeNotifier,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let api: Api<IngressRoute> = scoped_api(client, namespace);
    watch_changes(api, "IngressRoute", notifier, cancel).await
}

/// Watch Endpoints in `namespace`
pub async fn watch_endpoints(
    client: Client,
    namespace: &str,
    notifier: ChangeNotifier,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let api: Api<Endpoints> = scoped_api(client, namespace);
    watch_changes(api, "Endpoints", notifier, cancel).await
}

// Objects replayed during a (re-)list are reported once, on InitDone
fn is_change<K>(event: &watcher::Event<K>) -> bool {
    !matches!(event, watcher::Event::Init | watcher::Event::InitApply(_))
}
