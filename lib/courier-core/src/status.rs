//! Internal status virtual host
//!
//! The status virtual host is served on a reserved domain and holds one route
//! per IngressRoute, addressed by the route's fingerprint. A 200 from
//! `{INTERNAL_STATUS_PATH}/{fingerprint}` on a proxy therefore proves that the
//! proxy has loaded that exact version of the route. The host also carries a
//! static route at [`INTERNAL_STATUS_PATH`] for liveness checks and one
//! readiness route whose name and path change on every build.

use crate::fingerprint::{route_key, Fingerprint};
use crate::snapshot::{Route, VirtualHost};
use crate::Result;
use courier_api::IngressRoute;
use tracing::warn;

/// Reserved domain of the status virtual host
pub const INTERNAL_DOMAIN: &str = "internalcourier";
/// Fixed status path, also the prefix of every fingerprint route
pub const INTERNAL_STATUS_PATH: &str = "/__internalcouriersnapshot";
/// Prefix of the per-build readiness route
pub const READINESS_PATH_PREFIX: &str = "/ready";

/// Path at which a proxy answers once it has loaded the fingerprinted route
pub fn status_path(fingerprint: &Fingerprint) -> String {
    format!("{}/{}", INTERNAL_STATUS_PATH, fingerprint)
}

/// Fingerprint every route, dropping (and logging) the ones that fail
pub fn collect_fingerprints<'a, I>(routes: I) -> Vec<Fingerprint>
where
    I: IntoIterator<Item = &'a IngressRoute>,
{
    keep_fingerprinted(
        routes
            .into_iter()
            .map(|route| (route_key(route), Fingerprint::of(route))),
    )
}

fn keep_fingerprinted<I>(results: I) -> Vec<Fingerprint>
where
    I: IntoIterator<Item = (String, Result<Fingerprint>)>,
{
    results
        .into_iter()
        .filter_map(|(key, result)| match result {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!(resource = %key, error = %e, "Failed to fingerprint IngressRoute, leaving it out of the status host");
                None
            }
        })
        .collect()
}

/// Status virtual host for the given fingerprints.
///
/// Routes come out in input order, followed by the readiness route built from
/// `freshness_token`, followed by the static status route.
pub fn status_virtual_host(fingerprints: &[Fingerprint], freshness_token: &str) -> VirtualHost {
    let mut routes: Vec<Route> = fingerprints
        .iter()
        .map(|fp| Route::status_ok(format!("{}_{}", INTERNAL_DOMAIN, fp), status_path(fp)))
        .collect();

    routes.push(Route::status_ok(
        format!("ready_{}", freshness_token),
        format!("{}/{}", READINESS_PATH_PREFIX, freshness_token),
    ));
    routes.push(Route::status_ok(INTERNAL_DOMAIN, INTERNAL_STATUS_PATH));

    VirtualHost {
        name: INTERNAL_DOMAIN.to_string(),
        domains: vec![INTERNAL_DOMAIN.to_string()],
        routes,
    }
}

/// Fingerprint `routes` and build their status virtual host in one go
pub fn build_status_surface(routes: &[IngressRoute], freshness: &dyn crate::FreshnessSource) -> VirtualHost {
    status_virtual_host(&collect_fingerprints(routes), &freshness.token())
}
