//! Discovery transports serving published snapshots
//!
//! - Gateway listener: proxy-facing snapshot discovery with long polling,
//!   plus the internal status host answered from the current snapshot
//! - Management server: health, metrics and snapshot inspection
pub mod gateway;
pub mod http;
pub mod management;
pub mod server;

pub use gateway::GatewayHandler;
pub use management::ManagementHandler;
pub use server::DiscoveryServer;
