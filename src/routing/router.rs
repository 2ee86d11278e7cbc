//! Consistent routing over the partition ring
//!
//! The ring is a dense `partition id -> node id` table. A key hashes to a
//! master partition; walking the ring clockwise from there and collecting
//! partitions owned by nodes not yet seen yields the preference list used
//! for replica retry.

use crate::common::{Error, Result};
use crate::routing::hash::fnv_hash;
use std::collections::HashSet;

/// Routing strategy accepted by this client.
pub const CONSISTENT_ROUTING: &str = "consistent-routing";

/// Key-to-replica router for one store.
#[derive(Debug, Clone)]
pub struct Router {
    replicas: usize,
}

impl Router {
    /// Build a router, validating the declared strategy and replica count.
    pub fn new(strategy: &str, replicas: i64) -> Result<Self> {
        if strategy != CONSISTENT_ROUTING {
            return Err(Error::UnsupportedRouting(strategy.to_string()));
        }

        if replicas <= 0 {
            return Err(Error::InvalidConfig(format!(
                "replication factor must be positive, got {}",
                replicas
            )));
        }

        Ok(Self {
            replicas: replicas as usize,
        })
    }

    /// Target number of distinct nodes per preference list.
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Preference list for a key: up to R partition ids whose owning
    /// nodes are all distinct, in ring-walk order starting at the master
    /// partition. Shorter when the ring has fewer distinct nodes than R.
    pub fn preference_list(&self, key: &[u8], ring: &[u32]) -> Vec<u32> {
        if ring.is_empty() {
            return Vec::new();
        }

        let master = (fnv_hash(key) as usize) % ring.len();
        let mut partitions = Vec::with_capacity(self.replicas);
        let mut seen_nodes = HashSet::new();

        let mut index = master;
        loop {
            let node = ring[index];
            if seen_nodes.insert(node) {
                partitions.push(index as u32);
                if partitions.len() == self.replicas {
                    break;
                }
            }

            index = (index + 1) % ring.len();
            if index == master {
                break;
            }
        }

        partitions
    }
}
