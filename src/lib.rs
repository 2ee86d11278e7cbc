//! # rokv
//!
//! An async client for a distributed, partitioned, read-only key-value
//! store with:
//! - seed-driven topology discovery with timed bootstrap retry
//! - one persistent TCP connection per node (negotiation, FIFO
//!   pipeline, timeout, reconnect, health tracking)
//! - consistent-hash routing of keys to replica nodes
//! - schema-driven binary record values with gzip transcoding
//! - transparent replica retry for transient failures
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Store facade                │
//! │     (key/value codecs, read-only guard)      │
//! └───────────────────────┬──────────────────────┘
//!                         │
//! ┌───────────────────────▼──────────────────────┐
//! │                    Cluster                   │
//! │  (bootstrap, topology, replica retry policy) │
//! └──────┬──────────────────┬──────────────────┬─┘
//!        │ Router           │                  │
//! ┌──────▼─────┐     ┌──────▼─────┐     ┌──────▼─────┐
//! │ Connection │     │ Connection │     │ Connection │
//! │  (node 0)  │     │  (node 1)  │     │  (node n)  │
//! └────────────┘     └────────────┘     └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use rokv::{Cluster, Value};
//!
//! # async fn example() -> rokv::Result<()> {
//! let (cluster, store) = Cluster::open("tcp://localhost:6666/catalog").await?;
//! match store.get(&Value::from("sku-1138")).await {
//!     Ok(value) => println!("{}", value),
//!     Err(rokv::Error::KeyNotFound) => println!("no such key"),
//!     Err(e) => return Err(e),
//! }
//! cluster.close().await;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod common;
pub mod protocol;
pub mod records;
pub mod routing;

// Re-export the public surface
pub use cluster::{Cluster, ClusterTopology, Store};
pub use common::{ClientConfig, Error, Result};
pub use records::Value;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
