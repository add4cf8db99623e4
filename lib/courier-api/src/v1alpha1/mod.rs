/// API version v1alpha1 for Courier CRDs

pub mod ingress_route;

pub use ingress_route::{
    Backend, IngressRoute, IngressRouteSpec, PathMatch, RetryPolicy, RouteRule,
};

/// API group for Courier resources
pub const API_GROUP: &str = "courier.dev";
/// API version for Courier resources
pub const API_VERSION: &str = "v1alpha1";
