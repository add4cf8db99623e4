//! Translation of IngressRoutes into proxy virtual hosts and clusters

use crate::fingerprint::route_key;
use crate::snapshot::{
    Cluster, ForwardAction, PathSpecifier, RetryPolicy, Route, RouteAction, VirtualHost,
    WeightedCluster,
};
use crate::status::INTERNAL_DOMAIN;
use crate::{CoreError, Result};
use courier_api::v1alpha1::{Backend, PathMatch, RouteRule};
use courier_api::IngressRoute;
use kube::ResourceExt;
use std::collections::HashSet;

/// Cluster DNS suffix used for backend addresses
pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Output of translating one IngressRoute
#[derive(Clone, Debug, PartialEq)]
pub struct Translated {
    pub virtual_host: VirtualHost,
    pub clusters: Vec<Cluster>,
}

/// Translate one IngressRoute into its virtual host and the clusters it uses
pub fn translate(route: &IngressRoute) -> Result<Translated> {
    let key = route_key(route);
    let namespace = route.namespace().unwrap_or_default();

    let domains = validate_hosts(&key, &route.spec.hosts)?;
    if route.spec.rules.is_empty() {
        return Err(CoreError::translation(&key, "no rules"));
    }

    let mut routes = Vec::with_capacity(route.spec.rules.len());
    let mut clusters = Vec::new();
    for (index, rule) in route.spec.rules.iter().enumerate() {
        let (translated, rule_clusters) = translate_rule(&key, &namespace, index, rule)?;
        routes.push(translated);
        clusters.extend(rule_clusters);
    }

    Ok(Translated {
        virtual_host: VirtualHost {
            name: key,
            domains,
            routes,
        },
        clusters,
    })
}

fn validate_hosts(key: &str, hosts: &[String]) -> Result<Vec<String>> {
    if hosts.is_empty() {
        return Err(CoreError::translation(key, "no hosts"));
    }
    let mut seen = HashSet::new();
    let mut domains = Vec::with_capacity(hosts.len());
    for host in hosts {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return Err(CoreError::translation(key, "empty host"));
        }
        if host == INTERNAL_DOMAIN {
            return Err(CoreError::translation(
                key,
                format!("host {} is reserved", INTERNAL_DOMAIN),
            ));
        }
        if !seen.insert(host.clone()) {
            return Err(CoreError::translation(key, format!("duplicate host {}", host)));
        }
        domains.push(host);
    }
    Ok(domains)
}

fn translate_rule(
    key: &str,
    namespace: &str,
    index: usize,
    rule: &RouteRule,
) -> Result<(Route, Vec<Cluster>)> {
    let path = path_specifier(key, &rule.path)?;

    if rule.backends.is_empty() {
        return Err(CoreError::translation(key, format!("rule {} has no backends", index)));
    }
    if rule.backends.iter().all(|b| b.weight == 0) {
        return Err(CoreError::translation(
            key,
            format!("rule {} has only zero-weight backends", index),
        ));
    }

    let mut weighted = Vec::with_capacity(rule.backends.len());
    let mut clusters = Vec::with_capacity(rule.backends.len());
    for backend in &rule.backends {
        let cluster = backend_cluster(key, namespace, backend)?;
        weighted.push(WeightedCluster {
            name: cluster.name.clone(),
            weight: backend.weight,
        });
        clusters.push(cluster);
    }

    let route = Route {
        name: format!("{}/{}", key, index),
        path,
        action: RouteAction::Forward(ForwardAction {
            clusters: weighted,
            timeout_ms: rule.timeout_seconds.map(|s| u64::from(s) * 1000),
            retry_policy: rule.retries.as_ref().map(|r| RetryPolicy {
                num_retries: r.attempts,
                retry_on: if r.retry_on.is_empty() {
                    "5xx".to_string()
                } else {
                    r.retry_on.join(",")
                },
            }),
            append_headers: rule.append_headers.clone(),
        }),
    };

    Ok((route, clusters))
}

fn path_specifier(key: &str, path: &PathMatch) -> Result<PathSpecifier> {
    let specifier = match (&path.prefix, &path.exact) {
        (Some(_), Some(_)) => {
            return Err(CoreError::translation(key, "path sets both prefix and exact"))
        }
        (Some(prefix), None) => PathSpecifier::Prefix(prefix.clone()),
        (None, Some(exact)) => PathSpecifier::Path(exact.clone()),
        (None, None) => PathSpecifier::Prefix("/".to_string()),
    };

    let raw = match &specifier {
        PathSpecifier::Prefix(p) | PathSpecifier::Path(p) => p,
    };
    if !raw.starts_with('/') {
        return Err(CoreError::translation(
            key,
            format!("path {:?} must start with '/'", raw),
        ));
    }
    Ok(specifier)
}

fn backend_cluster(key: &str, namespace: &str, backend: &Backend) -> Result<Cluster> {
    if backend.service_name.is_empty() {
        return Err(CoreError::translation(key, "backend without service name"));
    }
    if backend.port == 0 {
        return Err(CoreError::translation(
            key,
            format!("backend {} has port 0", backend.service_name),
        ));
    }
    let service_namespace = backend.service_namespace.as_deref().unwrap_or(namespace);
    Ok(Cluster {
        name: format!("{}/{}:{}", service_namespace, backend.service_name, backend.port),
        address: format!("{}.{}.{}", backend.service_name, service_namespace, CLUSTER_DOMAIN),
        port: backend.port,
    })
}
