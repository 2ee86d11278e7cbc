//! Seed-driven bootstrap
//!
//! A transient connection to the seed fetches `cluster.xml` and
//! `stores.xml` through the built-in `metadata` store. Topology and the
//! per-store specs are validated eagerly so that bad metadata fails the
//! attempt instead of the first get.

use crate::cluster::cluster::ClusterState;
use crate::cluster::connection::Connection;
use crate::cluster::xml::{self, StoreDefinition};
use crate::common::{ClientConfig, Error, Result};
use crate::protocol;
use crate::records::{Compression, Serializer};
use crate::routing::Router;
use std::collections::HashMap;
use std::sync::Arc;

/// Pseudo-store the seed serves its metadata from.
pub const METADATA_STORE: &str = "metadata";
/// Topology document key.
pub const CLUSTER_KEY: &str = "cluster.xml";
/// Store registry document key.
pub const STORES_KEY: &str = "stores.xml";

/// Everything the client needs to serve one store.
#[derive(Debug, Clone)]
pub(crate) struct StoreSpec {
    pub name: String,
    pub persistence: String,
    /// `None` when the store declares no routing metadata; reads then
    /// fall back to random node selection.
    pub router: Option<Router>,
    pub key_serializer: Serializer,
    pub key_compression: Compression,
    pub value_serializer: Serializer,
    pub value_compression: Compression,
}

impl StoreSpec {
    pub fn from_definition(def: StoreDefinition) -> Result<Self> {
        let router = def
            .routing_strategy
            .as_deref()
            .map(|strategy| Router::new(strategy, def.replication_factor))
            .transpose()?;

        Ok(Self {
            name: def.name,
            persistence: def.persistence,
            router,
            key_serializer: Serializer::from_spec(
                &def.key_serializer.kind,
                &def.key_serializer.schemas,
            )?,
            key_compression: Compression::from_spec(def.key_serializer.compression.as_deref())?,
            value_serializer: Serializer::from_spec(
                &def.value_serializer.kind,
                &def.value_serializer.schemas,
            )?,
            value_compression: Compression::from_spec(def.value_serializer.compression.as_deref())?,
        })
    }
}

/// Run one bootstrap attempt against the seed.
pub(crate) async fn bootstrap_once(
    seed_host: &str,
    seed_port: u16,
    config: &ClientConfig,
) -> Result<ClusterState> {
    let seed_addr = format!("{}:{}", seed_host, seed_port);
    tracing::info!(seed = %seed_addr, "fetching cluster metadata");

    let seed = Connection::open(seed_addr, config);
    let metadata = fetch_all_metadata(&seed).await;
    seed.close().await;
    let (topology, stores) = metadata?;

    let connections = topology
        .nodes()
        .map(|node| {
            let addr = format!("{}:{}", node.host, node.port);
            tracing::info!(node = node.id, %addr, "opening node connection");
            (node.id, Arc::new(Connection::open(addr, config)))
        })
        .collect();

    Ok(ClusterState {
        topology,
        stores,
        connections,
    })
}

async fn fetch_all_metadata(
    seed: &Connection,
) -> Result<(crate::cluster::topology::ClusterTopology, HashMap<String, StoreSpec>)> {
    let cluster_xml = fetch_metadata(seed, CLUSTER_KEY).await?;
    let topology = xml::parse_cluster(&cluster_xml)?;

    let stores_xml = fetch_metadata(seed, STORES_KEY).await?;
    let mut stores = HashMap::new();
    for def in xml::parse_stores(&stores_xml)? {
        let spec = StoreSpec::from_definition(def)?;
        tracing::debug!(store = %spec.name, "loaded store config");
        stores.insert(spec.name.clone(), spec);
    }

    Ok((topology, stores))
}

/// Fetch one metadata document. Metadata keys travel as raw bytes; the
/// pseudo-store declares no serializers.
async fn fetch_metadata(seed: &Connection, key: &str) -> Result<String> {
    let body = seed
        .send(protocol::build_get(METADATA_STORE, key.as_bytes()))
        .await?;
    let value = protocol::parse_get(&body)?;
    String::from_utf8(value.to_vec())
        .map_err(|_| Error::InvalidMetadata(format!("{} is not valid UTF-8", key)))
}
