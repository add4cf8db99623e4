//! Kubernetes integration for the courier control plane
pub mod source;
pub mod watch;

pub use source::KubeSource;
pub use watch::{watch_changes, watch_endpoints, watch_ingress_routes};
