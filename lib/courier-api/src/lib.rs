//! Courier API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources watched by the courier control plane:
//! - IngressRoute: hosts and path rules routed through the gateway fleet

pub mod v1alpha1;

pub use v1alpha1::IngressRoute;
