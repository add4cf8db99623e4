//! Process-wide settings for the control plane

use crate::{CoreError, Result};
use std::str::FromStr;

/// Default node identity the gateway fleet requests configuration for
pub const DEFAULT_NODE_ID: &str = "3scale-courier";
pub const DEFAULT_GATEWAY_PORT: u16 = 19001;
pub const DEFAULT_MANAGEMENT_PORT: u16 = 18000;
/// Port of the HTTP listener configured on the proxies
pub const DEFAULT_PROXY_PORT: u16 = 8080;
/// Pending change signals kept before new ones are dropped
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Control plane settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Key under which snapshots are published
    pub node_id: String,
    /// Proxy-facing discovery listener port
    pub gateway_port: u16,
    /// Admin listener port (health, metrics, snapshot inspection)
    pub management_port: u16,
    /// Port the proxies' HTTP listener binds, as written into snapshots
    pub proxy_port: u16,
    /// Capacity of the change queue
    pub queue_capacity: usize,
    /// Namespace to watch; empty means every namespace
    pub namespace: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID.to_string(),
            gateway_port: DEFAULT_GATEWAY_PORT,
            management_port: DEFAULT_MANAGEMENT_PORT,
            proxy_port: DEFAULT_PROXY_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            namespace: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Load settings from `COURIER_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            node_id: lookup("COURIER_NODE_ID").unwrap_or(defaults.node_id),
            gateway_port: parse(&lookup, "COURIER_GATEWAY_PORT")?.unwrap_or(defaults.gateway_port),
            management_port: parse(&lookup, "COURIER_MANAGEMENT_PORT")?
                .unwrap_or(defaults.management_port),
            proxy_port: parse(&lookup, "COURIER_PROXY_PORT")?.unwrap_or(defaults.proxy_port),
            queue_capacity: parse(&lookup, "COURIER_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            namespace: lookup("COURIER_NAMESPACE").unwrap_or(defaults.namespace),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            return Err(CoreError::InvalidConfiguration("node id must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::InvalidConfiguration(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.gateway_port == self.management_port {
            return Err(CoreError::InvalidConfiguration(format!(
                "gateway and management ports must differ (both {})",
                self.gateway_port
            )));
        }
        Ok(())
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e: T::Err| {
            CoreError::InvalidConfiguration(format!("{}={:?}: {}", key, raw, e))
        }),
    }
}
