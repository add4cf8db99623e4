use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// IngressRoute declares the hosts and path rules the gateway should serve,
/// and the in-cluster services each rule forwards to.
///
/// Every map field is a `BTreeMap` so that serializing a spec always emits
/// keys in the same order.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "courier.dev",
    version = "v1alpha1",
    kind = "IngressRoute",
    plural = "ingressroutes",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Hosts","type":"string","jsonPath":".spec.hosts"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    /// Hostnames matched by this route (e.g. "api.example.com")
    pub hosts: Vec<String>,

    /// Path rules, evaluated in order
    pub rules: Vec<RouteRule>,
}

/// A single path rule and where matching traffic goes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    /// Path condition; an empty match means prefix "/"
    #[serde(default)]
    pub path: PathMatch,

    /// Weighted backends
    pub backends: Vec<Backend>,

    /// Request timeout (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u32>,

    /// Retry policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<RetryPolicy>,

    /// Headers appended to the upstream request
    #[serde(default)]
    pub append_headers: BTreeMap<String, String>,
}

/// HTTP path condition. At most one of the fields may be set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PathMatch {
    /// Path prefix to match (e.g., "/api/v1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Exact path match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
}

/// Kubernetes Service receiving a share of a rule's traffic
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Name of the Service
    pub service_name: String,

    /// Namespace of the Service (defaults to the route's namespace)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_namespace: Option<String>,

    /// Service port
    pub port: u16,

    /// Relative weight
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Retry policy
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retries
    pub attempts: u32,

    /// Retry conditions (e.g. "5xx", "connect-failure")
    #[serde(default)]
    pub retry_on: Vec<String>,
}

fn default_weight() -> u32 {
    100
}
