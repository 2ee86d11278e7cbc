//! Bootstrap metadata parsing
//!
//! The seed serves `cluster.xml` and `stores.xml` through the built-in
//! `metadata` store. Both documents deserialize through quick-xml into
//! the plain structs the bootstrap consumes.

use crate::cluster::topology::{ClusterTopology, NodeDescriptor};
use crate::common::{Error, Result};
use crate::records::SchemaText;
use serde::Deserialize;

/// One store declaration from `stores.xml`, before serializers and the
/// router are built.
#[derive(Debug, Clone)]
pub struct StoreDefinition {
    pub name: String,
    pub persistence: String,
    /// Absent means the store carries no routing metadata; the cluster
    /// then falls back to random node selection.
    pub routing_strategy: Option<String>,
    pub replication_factor: i64,
    pub key_serializer: SerializerDefinition,
    pub value_serializer: SerializerDefinition,
}

#[derive(Debug, Clone)]
pub struct SerializerDefinition {
    pub kind: String,
    pub schemas: Vec<SchemaText>,
    pub compression: Option<String>,
}

// === cluster.xml ===

#[derive(Debug, Deserialize)]
struct ClusterXml {
    name: String,
    #[serde(rename = "server", default)]
    servers: Vec<ServerXml>,
}

#[derive(Debug, Deserialize)]
struct ServerXml {
    id: i64,
    host: String,
    #[serde(rename = "socket-port")]
    socket_port: u16,
    partitions: String,
}

/// Parse and validate `cluster.xml`.
pub fn parse_cluster(xml: &str) -> Result<ClusterTopology> {
    let parsed: ClusterXml = quick_xml::de::from_str(xml)
        .map_err(|e| Error::InvalidMetadata(format!("cluster.xml: {}", e)))?;

    if parsed.servers.is_empty() {
        return Err(Error::InvalidMetadata("cluster.xml declares no servers".into()));
    }

    let mut nodes = Vec::with_capacity(parsed.servers.len());
    for server in parsed.servers {
        if server.id < 0 {
            return Err(Error::InvalidMetadata(format!(
                "negative node id {}",
                server.id
            )));
        }

        nodes.push(NodeDescriptor {
            id: server.id as u32,
            host: server.host,
            port: server.socket_port,
            partitions: parse_partitions(&server.partitions)?,
        });
    }

    ClusterTopology::new(parsed.name, nodes)
}

/// Partition lists are comma- or whitespace-separated.
fn parse_partitions(raw: &str) -> Result<Vec<u32>> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<u32>()
                .map_err(|_| Error::InvalidMetadata(format!("invalid partition id '{}'", token)))
        })
        .collect()
}

// === stores.xml ===

#[derive(Debug, Deserialize)]
struct StoresXml {
    #[serde(rename = "store", default)]
    stores: Vec<StoreXml>,
}

#[derive(Debug, Deserialize)]
struct StoreXml {
    name: String,
    persistence: String,
    #[serde(rename = "routing-strategy")]
    routing_strategy: Option<String>,
    #[serde(rename = "replication-factor")]
    replication_factor: i64,
    #[serde(rename = "key-serializer")]
    key_serializer: SerializerXml,
    #[serde(rename = "value-serializer")]
    value_serializer: SerializerXml,
}

#[derive(Debug, Deserialize)]
struct SerializerXml {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "schema-info", default)]
    schema_info: Vec<SchemaInfoXml>,
    compression: Option<CompressionXml>,
}

#[derive(Debug, Deserialize)]
struct SchemaInfoXml {
    #[serde(rename = "@version")]
    version: Option<String>,
    #[serde(rename = "$text")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompressionXml {
    #[serde(rename = "type")]
    kind: String,
}

/// Parse `stores.xml` into store declarations.
pub fn parse_stores(xml: &str) -> Result<Vec<StoreDefinition>> {
    let parsed: StoresXml = quick_xml::de::from_str(xml)
        .map_err(|e| Error::InvalidMetadata(format!("stores.xml: {}", e)))?;

    Ok(parsed
        .stores
        .into_iter()
        .map(|store| StoreDefinition {
            name: store.name,
            persistence: store.persistence,
            routing_strategy: store.routing_strategy,
            replication_factor: store.replication_factor,
            key_serializer: convert_serializer(store.key_serializer),
            value_serializer: convert_serializer(store.value_serializer),
        })
        .collect())
}

fn convert_serializer(xml: SerializerXml) -> SerializerDefinition {
    SerializerDefinition {
        kind: xml.kind,
        schemas: xml
            .schema_info
            .into_iter()
            .map(|info| SchemaText {
                version: info.version,
                text: info.text.unwrap_or_default().trim().to_string(),
            })
            .collect(),
        compression: xml.compression.map(|c| c.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER_XML: &str = r#"
        <cluster>
          <name>shoppe</name>
          <server>
            <id>0</id>
            <host>kv-a.internal</host>
            <http-port>8081</http-port>
            <socket-port>6666</socket-port>
            <partitions>0, 2</partitions>
          </server>
          <server>
            <id>1</id>
            <host>kv-b.internal</host>
            <http-port>8081</http-port>
            <socket-port>6667</socket-port>
            <partitions>1 3</partitions>
          </server>
        </cluster>
    "#;

    const STORES_XML: &str = r#"
        <stores>
          <store>
            <name>catalog</name>
            <persistence>read-only</persistence>
            <routing>client</routing>
            <routing-strategy>consistent-routing</routing-strategy>
            <replication-factor>2</replication-factor>
            <key-serializer>
              <type>json</type>
              <schema-info version="0">"string"</schema-info>
              <compression>
                <type>none</type>
              </compression>
            </key-serializer>
            <value-serializer>
              <type>json</type>
              <schema-info version="0">{'sku': 'string', 'price': 'int32'}</schema-info>
              <schema-info version="1">{"sku": "string", "price": "int64"}</schema-info>
              <compression>
                <type>gzip</type>
              </compression>
            </value-serializer>
          </store>
        </stores>
    "#;

    #[test]
    fn test_parse_cluster() {
        let topology = parse_cluster(CLUSTER_XML).unwrap();
        assert_eq!(topology.name, "shoppe");
        assert_eq!(topology.node_count(), 2);
        assert_eq!(topology.partition_count(), 4);
        assert_eq!(topology.ring(), &[0, 1, 0, 1]);

        let node = topology.node(1).unwrap();
        assert_eq!(node.host, "kv-b.internal");
        assert_eq!(node.port, 6667);
        assert_eq!(node.partitions, vec![1, 3]);
    }

    #[test]
    fn test_parse_stores() {
        let stores = parse_stores(STORES_XML).unwrap();
        assert_eq!(stores.len(), 1);

        let store = &stores[0];
        assert_eq!(store.name, "catalog");
        assert_eq!(store.persistence, "read-only");
        assert_eq!(store.routing_strategy.as_deref(), Some("consistent-routing"));
        assert_eq!(store.replication_factor, 2);

        assert_eq!(store.key_serializer.kind, "json");
        assert_eq!(store.key_serializer.compression.as_deref(), Some("none"));
        assert_eq!(store.key_serializer.schemas.len(), 1);
        assert_eq!(store.key_serializer.schemas[0].text, "\"string\"");

        let value = &store.value_serializer;
        assert_eq!(value.compression.as_deref(), Some("gzip"));
        assert_eq!(value.schemas.len(), 2);
        assert_eq!(value.schemas[0].version.as_deref(), Some("0"));
        assert_eq!(value.schemas[1].version.as_deref(), Some("1"));
    }

    #[test]
    fn test_partition_separators() {
        assert_eq!(parse_partitions("0, 1, 2").unwrap(), vec![0, 1, 2]);
        assert_eq!(parse_partitions("0 1\n2").unwrap(), vec![0, 1, 2]);
        assert!(parse_partitions("0, x").is_err());
        assert!(parse_partitions("-1").is_err());
    }

    #[test]
    fn test_missing_elements_rejected() {
        assert!(parse_cluster("<cluster><name>x</name></cluster>").is_err());
        assert!(parse_cluster("<cluster></cluster>").is_err());
    }

    #[test]
    fn test_negative_node_id_rejected() {
        let xml = r#"
            <cluster>
              <name>x</name>
              <server>
                <id>-1</id>
                <host>h</host>
                <socket-port>6666</socket-port>
                <partitions>0</partitions>
              </server>
            </cluster>
        "#;
        assert!(matches!(parse_cluster(xml), Err(Error::InvalidMetadata(_))));
    }
}
