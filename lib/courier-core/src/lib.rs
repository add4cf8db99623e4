//! Reconciliation core of the courier control plane
//!
//! This library provides:
//! - Fingerprinting of IngressRoutes for propagation checks
//! - The internal status virtual host built from those fingerprints
//! - Translation of IngressRoutes into proxy virtual hosts and clusters
//! - Versioned configuration snapshots and the store they are published to
//! - The debouncing change aggregator and the reconciliation loop driving it all

pub mod aggregator;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod freshness;
pub mod metrics;
pub mod reconciler;
pub mod snapshot;
pub mod status;
pub mod store;
pub mod translate;

pub use aggregator::{ChangeAggregator, ChangeNotifier, Wake};
pub use config::GatewayConfig;
pub use error::{CoreError, Result};
pub use fingerprint::Fingerprint;
pub use freshness::{FreshnessSource, RandomFreshness};
pub use metrics::ReconcileMetrics;
pub use reconciler::{Reconciler, ResourceSource};
pub use snapshot::{ConfigSnapshot, SnapshotBuilder};
pub use store::{SnapshotCache, SnapshotStore};
