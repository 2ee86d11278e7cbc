//! Cluster topology
//!
//! Parsed once per successful bootstrap and never mutated: an ordered
//! node registry plus the dense partition ring the router walks.

use crate::common::{Error, Result};
use std::collections::BTreeMap;

/// One cluster member as declared by the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub id: u32,
    pub host: String,
    pub port: u16,
    pub partitions: Vec<u32>,
}

/// Immutable topology snapshot.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    pub name: String,
    nodes: BTreeMap<u32, NodeDescriptor>,
    ring: Vec<u32>,
}

impl ClusterTopology {
    /// Build and validate a topology: every partition id in `[0, P)`
    /// must be owned by exactly one node.
    pub fn new(name: String, descriptors: Vec<NodeDescriptor>) -> Result<Self> {
        let partition_count: usize = descriptors.iter().map(|n| n.partitions.len()).sum();
        let mut ring: Vec<Option<u32>> = vec![None; partition_count];
        let mut nodes = BTreeMap::new();

        for node in descriptors {
            for &partition in &node.partitions {
                let slot = ring.get_mut(partition as usize).ok_or_else(|| {
                    Error::InvalidMetadata(format!(
                        "partition {} out of range, cluster has {} partitions",
                        partition, partition_count
                    ))
                })?;

                if let Some(owner) = slot {
                    return Err(Error::InvalidMetadata(format!(
                        "partition {} assigned to both node {} and node {}",
                        partition, owner, node.id
                    )));
                }
                *slot = Some(node.id);
            }

            let id = node.id;
            if nodes.insert(id, node).is_some() {
                return Err(Error::InvalidMetadata(format!("duplicate node id {}", id)));
            }
        }

        // A dense assignment of P partitions with no duplicates covers
        // every slot; unwrap the options into the final ring.
        let ring = ring
            .into_iter()
            .enumerate()
            .map(|(partition, owner)| {
                owner.ok_or_else(|| {
                    Error::InvalidMetadata(format!("partition {} has no owner", partition))
                })
            })
            .collect::<Result<Vec<u32>>>()?;

        Ok(Self { name, nodes, ring })
    }

    /// The dense `partition -> node` table.
    pub fn ring(&self) -> &[u32] {
        &self.ring
    }

    pub fn partition_count(&self) -> usize {
        self.ring.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: u32) -> Option<&NodeDescriptor> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.values()
    }

    pub fn owner_of(&self, partition: u32) -> Option<u32> {
        self.ring.get(partition as usize).copied()
    }
}
