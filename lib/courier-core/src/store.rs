//! Per-node snapshot store shared with the discovery transports

use crate::ConfigSnapshot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::debug;

type Slot = watch::Sender<Option<Arc<ConfigSnapshot>>>;

/// Store of the active snapshot per node identity.
///
/// Replacing a snapshot is atomic: a reader observes either the previous
/// snapshot or the new one.
pub trait SnapshotStore: Send + Sync {
    /// Replace the snapshot published for `node_id`
    fn set_snapshot(&self, node_id: &str, snapshot: ConfigSnapshot);

    /// Currently published snapshot for `node_id`
    fn snapshot(&self, node_id: &str) -> Option<Arc<ConfigSnapshot>>;
}

/// In-memory [`SnapshotStore`] with change notification per node
#[derive(Default)]
pub struct SnapshotCache {
    nodes: RwLock<HashMap<String, Slot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch the snapshot of `node_id`; the receiver sees every later replacement.
    ///
    /// Returns `None` until a snapshot has been published for `node_id`, so
    /// readers never create entries.
    pub fn subscribe(&self, node_id: &str) -> Option<watch::Receiver<Option<Arc<ConfigSnapshot>>>> {
        self.read().get(node_id).map(|slot| slot.subscribe())
    }

    /// Node identities that have been published
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Slot>> {
        self.nodes.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Slot>> {
        self.nodes.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SnapshotStore for SnapshotCache {
    fn set_snapshot(&self, node_id: &str, snapshot: ConfigSnapshot) {
        debug!(node_id, version = %snapshot.version, "Replacing snapshot");
        let snapshot = Some(Arc::new(snapshot));
        if let Some(slot) = self.read().get(node_id) {
            slot.send_replace(snapshot);
            return;
        }
        self.write()
            .entry(node_id.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(snapshot);
    }

    fn snapshot(&self, node_id: &str) -> Option<Arc<ConfigSnapshot>> {
        self.read().get(node_id).and_then(|slot| slot.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Listener, RouteConfiguration};

    fn snapshot(node_id: &str, version: &str) -> ConfigSnapshot {
        ConfigSnapshot {
            node_id: node_id.to_string(),
            version: version.to_string(),
            listener: Listener {
                name: "courier_gateway".to_string(),
                port: 19001,
                route_config: RouteConfiguration {
                    name: "courier_routes".to_string(),
                    virtual_hosts: vec![],
                },
            },
            clusters: vec![],
        }
    }

    #[test]
    fn test_replace_by_key() {
        let cache = SnapshotCache::new();
        assert!(cache.snapshot("node").is_none());

        cache.set_snapshot("node", snapshot("node", "v1"));
        let held = cache.snapshot("node").unwrap();
        cache.set_snapshot("node", snapshot("node", "v2"));

        assert_eq!(held.version, "v1");
        assert_eq!(cache.snapshot("node").unwrap().version, "v2");
        assert!(cache.snapshot("other").is_none());
    }

    #[test]
    fn test_nodes_are_independent() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("b", snapshot("b", "v1"));
        cache.set_snapshot("a", snapshot("a", "v9"));
        assert_eq!(cache.snapshot("a").unwrap().version, "v9");
        assert_eq!(cache.node_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_subscriber_sees_later_publication() {
        let cache = SnapshotCache::new();
        cache.set_snapshot("node", snapshot("node", "v1"));
        let mut rx = cache.subscribe("node").unwrap();
        assert_eq!(rx.borrow().as_ref().unwrap().version, "v1");

        cache.set_snapshot("node", snapshot("node", "v2"));

        rx.changed().await.unwrap();
        let current = rx.borrow().clone().unwrap();
        assert_eq!(current.version, "v2");
    }

    #[test]
    fn test_readers_do_not_create_nodes() {
        let cache = SnapshotCache::new();
        for i in 0..100 {
            let node_id = format!("unknown-{}", i);
            assert!(cache.subscribe(&node_id).is_none());
            assert!(cache.snapshot(&node_id).is_none());
        }
        assert!(cache.node_ids().is_empty());
    }
}
