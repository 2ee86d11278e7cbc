//! Cluster runtime: connections, bootstrap, coordinator, store facades

pub mod bootstrap;
#[allow(clippy::module_inception)]
pub mod cluster;
pub mod connection;
pub mod store;
pub mod topology;
pub mod xml;

pub use cluster::Cluster;
pub use connection::{ConnState, Connection, Health};
pub use store::Store;
pub use topology::{ClusterTopology, NodeDescriptor};
