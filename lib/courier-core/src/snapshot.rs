//! Proxy configuration snapshots and the builder that compiles them
//!
//! A [`ConfigSnapshot`] is everything one proxy node needs: a single HTTP
//! listener whose route configuration holds the internal status virtual host
//! plus one virtual host per IngressRoute, and the upstream clusters those
//! routes forward to. Snapshots are built fresh every reconcile cycle and are
//! never modified after they are published.

use crate::fingerprint::{canonical_json, digest, route_key};
use crate::status::{collect_fingerprints, status_virtual_host, INTERNAL_DOMAIN};
use crate::translate::translate;
use crate::{CoreError, FreshnessSource, ReconcileMetrics};
use courier_api::IngressRoute;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Name of the gateway listener in every snapshot
pub const LISTENER_NAME: &str = "courier_gateway";
/// Name of the route configuration attached to the gateway listener
pub const ROUTE_CONFIG_NAME: &str = "courier_routes";

/// How a route matches the request path
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSpecifier {
    Prefix(String),
    Path(String),
}

impl PathSpecifier {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathSpecifier::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathSpecifier::Path(exact) => path == exact,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    pub path: PathSpecifier,
    pub action: RouteAction,
}

impl Route {
    /// Route answering an exact path with a bodiless 200
    pub fn status_ok(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: PathSpecifier::Path(path.into()),
            action: RouteAction::DirectResponse { status: 200 },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAction {
    DirectResponse { status: u16 },
    Forward(ForwardAction),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ForwardAction {
    pub clusters: Vec<WeightedCluster>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    pub append_headers: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeightedCluster {
    pub name: String,
    pub weight: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub num_retries: u32,
    /// Comma separated retry conditions
    pub retry_on: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<Route>,
}

impl VirtualHost {
    /// Whether `host` (optionally carrying a port) is served by this virtual host
    pub fn matches_domain(&self, host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host);
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(host))
    }

    /// First route matching `path`, in declaration order
    pub fn find_route(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.path.matches(path))
    }
}

/// Upstream cluster, resolved by DNS on the proxy side
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub address: String,
    pub port: u16,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub name: String,
    pub port: u16,
    pub route_config: RouteConfiguration,
}

/// Complete configuration for one proxy node
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    pub node_id: String,
    /// Content hash of the listener and clusters
    pub version: String,
    pub listener: Listener,
    pub clusters: Vec<Cluster>,
}

impl ConfigSnapshot {
    pub fn virtual_hosts(&self) -> &[VirtualHost] {
        &self.listener.route_config.virtual_hosts
    }

    /// The internal status virtual host
    pub fn status_virtual_host(&self) -> Option<&VirtualHost> {
        self.virtual_hosts().iter().find(|vh| vh.name == INTERNAL_DOMAIN)
    }
}

/// Compiles IngressRoutes into [`ConfigSnapshot`]s. Holds no state between builds.
pub struct SnapshotBuilder {
    listener_port: u16,
    freshness: Arc<dyn FreshnessSource>,
    metrics: Arc<ReconcileMetrics>,
}

impl SnapshotBuilder {
    pub fn new(
        listener_port: u16,
        freshness: Arc<dyn FreshnessSource>,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            listener_port,
            freshness,
            metrics,
        }
    }

    /// Build the snapshot for `node_id`.
    ///
    /// Routes that fail to fingerprint are left out of the status virtual host
    /// and routes that fail to translate are left out of the route
    /// configuration; both are logged and the build carries on.
    pub fn build(&self, node_id: &str, routes: &[IngressRoute]) -> ConfigSnapshot {
        let started = Instant::now();

        let fingerprints = collect_fingerprints(routes);
        let unfingerprinted = routes.len() - fingerprints.len();
        if unfingerprinted > 0 {
            self.metrics
                .skipped_resources_total
                .with_label_values(&["fingerprint"])
                .inc_by(unfingerprinted as u64);
        }

        let mut virtual_hosts = vec![status_virtual_host(&fingerprints, &self.freshness.token())];
        let mut clusters = BTreeMap::new();
        let mut claimed_hosts: HashMap<String, String> = HashMap::new();

        for route in routes {
            let key = route_key(route);
            let translated = translate(route).and_then(|t| {
                match t
                    .virtual_host
                    .domains
                    .iter()
                    .find_map(|d| claimed_hosts.get(d).map(|owner| (d, owner)))
                {
                    Some((domain, owner)) => Err(CoreError::translation(
                        &key,
                        format!("host {} is already served by {}", domain, owner),
                    )),
                    None => Ok(t),
                }
            });

            match translated {
                Ok(t) => {
                    for domain in &t.virtual_host.domains {
                        claimed_hosts.insert(domain.clone(), key.clone());
                    }
                    for cluster in t.clusters {
                        clusters.insert(cluster.name.clone(), cluster);
                    }
                    virtual_hosts.push(t.virtual_host);
                }
                Err(e) => {
                    warn!(resource = %key, error = %e, "Omitting IngressRoute from snapshot");
                    self.metrics
                        .skipped_resources_total
                        .with_label_values(&["translation"])
                        .inc();
                }
            }
        }

        let listener = Listener {
            name: LISTENER_NAME.to_string(),
            port: self.listener_port,
            route_config: RouteConfiguration {
                name: ROUTE_CONFIG_NAME.to_string(),
                virtual_hosts,
            },
        };
        let clusters: Vec<Cluster> = clusters.into_values().collect();
        let version = self.version_of(&listener, &clusters);

        self.metrics
            .build_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        debug!(
            node_id,
            version = %version,
            virtual_hosts = listener.route_config.virtual_hosts.len(),
            clusters = clusters.len(),
            "Built snapshot"
        );

        ConfigSnapshot {
            node_id: node_id.to_string(),
            version,
            listener,
            clusters,
        }
    }

    fn version_of(&self, listener: &Listener, clusters: &[Cluster]) -> String {
        match canonical_json(&(listener, clusters)) {
            Ok(bytes) => hex::encode(digest(&bytes)),
            Err(e) => {
                // Still has to differ from the previous build
                warn!(error = %e, "Failed to hash snapshot contents, using a fresh token as version");
                self.freshness.token()
            }
        }
    }
}
