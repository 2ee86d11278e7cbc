//! Cluster scenarios against mock nodes
//!
//! Every test stands up real TCP listeners speaking the pb0 dialect and
//! serving `cluster.xml` / `stores.xml` through the `metadata` store,
//! then drives the public client surface end to end.

use prost::Message;
use rokv::protocol::messages::{GetResponse, RemoteError, Request, VectorClock, Versioned};
use rokv::records::{Compression, SchemaText, Serializer};
use rokv::{ClientConfig, Cluster, Error, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::sleep;

type Handler = Arc<dyn Fn(&str, &[u8]) -> GetResponse + Send + Sync>;

fn test_config() -> ClientConfig {
    ClientConfig {
        connect_timeout_ms: 500,
        request_timeout_ms: 1_000,
        reconnect_interval_ms: 100,
        bootstrap_retry_ms: 200,
        ..Default::default()
    }
}

fn value_response(bytes: Vec<u8>) -> GetResponse {
    GetResponse {
        versioned: vec![Versioned {
            value: Some(bytes),
            version: Some(VectorClock {
                entries: vec![],
                timestamp: Some(1),
            }),
        }],
        error: None,
    }
}

fn empty_response() -> GetResponse {
    GetResponse {
        versioned: vec![],
        error: None,
    }
}

fn error_response(code: i32, message: &str) -> GetResponse {
    GetResponse {
        versioned: vec![],
        error: Some(RemoteError {
            error_code: Some(code),
            error_message: Some(message.to_string()),
        }),
    }
}

/// Wrap a data handler so the node also serves bootstrap metadata.
fn with_metadata(cluster_xml: String, stores_xml: String, data: Handler) -> Handler {
    Arc::new(move |store, key| {
        if store == "metadata" {
            if key == &b"cluster.xml"[..] {
                value_response(cluster_xml.clone().into_bytes())
            } else if key == &b"stores.xml"[..] {
                value_response(stores_xml.clone().into_bytes())
            } else {
                empty_response()
            }
        } else {
            data(store, key)
        }
    })
}

struct MockNode {
    /// Data-store requests seen, `(store, key)` in arrival order.
    data_hits: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl MockNode {
    fn hits_for(&self, store: &str) -> usize {
        self.data_hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == store)
            .count()
    }
}

/// Run the pb0 dialect on an already-bound listener. `delay` holds
/// every response back, which keeps bootstrap observably in progress.
fn start_node(listener: TcpListener, handler: Handler, delay: Duration) -> MockNode {
    let data_hits = Arc::new(Mutex::new(Vec::new()));
    let hits = data_hits.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            let hits = hits.clone();

            tokio::spawn(async move {
                let mut tag = [0u8; 3];
                if socket.read_exact(&mut tag).await.is_err() {
                    return;
                }
                if socket.write_all(b"ok").await.is_err() {
                    return;
                }

                loop {
                    let mut len = [0u8; 4];
                    if socket.read_exact(&mut len).await.is_err() {
                        return;
                    }
                    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
                    if socket.read_exact(&mut body).await.is_err() {
                        return;
                    }

                    let Ok(request) = Request::decode(&body[..]) else {
                        return;
                    };
                    let store = request.store.clone().unwrap_or_default();
                    let key = request.get.and_then(|g| g.key).unwrap_or_default();

                    if store != "metadata" {
                        hits.lock().unwrap().push((store.clone(), key.clone()));
                    }

                    if !delay.is_zero() {
                        sleep(delay).await;
                    }

                    let response = handler(&store, &key).encode_to_vec();
                    let mut frame = (response.len() as u32).to_be_bytes().to_vec();
                    frame.extend(response);
                    if socket.write_all(&frame).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    MockNode { data_hits }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Node 0 owns partition 0, node 1 owns partition 1.
fn cluster_xml(node0: SocketAddr, node1: SocketAddr) -> String {
    format!(
        r#"<cluster>
             <name>mock</name>
             <server>
               <id>0</id><host>127.0.0.1</host>
               <socket-port>{}</socket-port>
               <partitions>0</partitions>
             </server>
             <server>
               <id>1</id><host>127.0.0.1</host>
               <socket-port>{}</socket-port>
               <partitions>1</partitions>
             </server>
           </cluster>"#,
        node0.port(),
        node1.port()
    )
}

fn stores_xml() -> String {
    r#"<stores>
         <store>
           <name>catalog</name>
           <persistence>read-only</persistence>
           <routing-strategy>consistent-routing</routing-strategy>
           <replication-factor>2</replication-factor>
           <key-serializer>
             <type>json</type>
             <schema-info version="0">"string"</schema-info>
           </key-serializer>
           <value-serializer>
             <type>json</type>
             <schema-info version="0">{'name': 'string', 'price': 'int32'}</schema-info>
             <compression><type>gzip</type></compression>
           </value-serializer>
         </store>
         <store>
           <name>raw</name>
           <persistence>read-only</persistence>
           <routing-strategy>consistent-routing</routing-strategy>
           <replication-factor>2</replication-factor>
           <key-serializer><type>identity</type></key-serializer>
           <value-serializer><type>identity</type></value-serializer>
         </store>
         <store>
           <name>norouting</name>
           <persistence>read-only</persistence>
           <replication-factor>1</replication-factor>
           <key-serializer><type>identity</type></key-serializer>
           <value-serializer><type>identity</type></value-serializer>
         </store>
         <store>
           <name>writable</name>
           <persistence>bdb</persistence>
           <routing-strategy>consistent-routing</routing-strategy>
           <replication-factor>1</replication-factor>
           <key-serializer><type>identity</type></key-serializer>
           <value-serializer><type>identity</type></value-serializer>
         </store>
       </stores>"#
        .to_string()
}

fn catalog_key_bytes(key: &str) -> Vec<u8> {
    Serializer::from_spec(
        "json",
        &[SchemaText {
            version: Some("0".into()),
            text: "\"string\"".into(),
        }],
    )
    .unwrap()
    .encode(&Value::from(key))
    .unwrap()
}

fn catalog_value() -> (Value, Vec<u8>) {
    let serializer = Serializer::from_spec(
        "json",
        &[SchemaText {
            version: Some("0".into()),
            text: "{'name': 'string', 'price': 'int32'}".into(),
        }],
    )
    .unwrap();
    let gzip = Compression::from_spec(Some("gzip")).unwrap();

    let value = Value::map([
        ("name", Value::from("widget")),
        ("price", Value::Int(4250)),
    ]);
    let wire = gzip.compress(&serializer.encode(&value).unwrap()).unwrap();
    (value, wire)
}

#[tokio::test]
async fn end_to_end_get_decodes_value() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    let (expected, wire) = catalog_value();
    let key_bytes = catalog_key_bytes("sku-1");
    let data: Handler = Arc::new(move |store, key| {
        if store == "catalog" && key == key_bytes.as_slice() {
            value_response(wire.clone())
        } else {
            empty_response()
        }
    });

    start_node(
        l0,
        with_metadata(cluster_doc.clone(), stores_doc.clone(), data.clone()),
        Duration::ZERO,
    );
    start_node(
        l1,
        with_metadata(cluster_doc, stores_doc, data),
        Duration::ZERO,
    );

    let cluster = Cluster::with_config("127.0.0.1", a0.port(), test_config()).unwrap();
    cluster.connect().await.unwrap();

    let topology = cluster.topology().unwrap();
    assert_eq!(topology.name, "mock");
    assert_eq!(topology.partition_count(), 2);

    let store = cluster.store("catalog");
    assert_eq!(store.get_str("sku-1").await.unwrap(), expected);
    assert!(matches!(
        store.get_str("missing").await,
        Err(Error::KeyNotFound)
    ));

    cluster.close().await;

    // Closed cluster refuses further work.
    assert!(matches!(
        store.get_str("sku-1").await,
        Err(Error::ShutdownRequested)
    ));
}

#[tokio::test]
async fn concurrent_gets_park_on_bootstrap() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    let data: Handler = Arc::new(|store, _| {
        if store == "raw" {
            value_response(b"parked".to_vec())
        } else {
            empty_response()
        }
    });

    // The seed answers slowly, so bootstrap stays in progress while the
    // gets arrive.
    start_node(
        l0,
        with_metadata(cluster_doc.clone(), stores_doc.clone(), data.clone()),
        Duration::from_millis(150),
    );
    start_node(
        l1,
        with_metadata(cluster_doc, stores_doc, data),
        Duration::ZERO,
    );

    let cluster = Cluster::with_config("127.0.0.1", a0.port(), test_config()).unwrap();

    let connector = cluster.clone();
    let connect = tokio::spawn(async move { connector.connect().await });
    sleep(Duration::from_millis(50)).await;

    let store = cluster.store("raw");
    let key = Value::Bytes(b"hello".to_vec());
    let (a, b, c) = tokio::join!(store.get(&key), store.get(&key), store.get(&key),);

    let expected = Value::Bytes(b"parked".to_vec());
    assert_eq!(a.unwrap(), expected);
    assert_eq!(b.unwrap(), expected);
    assert_eq!(c.unwrap(), expected);

    connect.await.unwrap().unwrap();
    cluster.close().await;
}

#[tokio::test]
async fn server_error_retries_next_replica() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    // Key "hello" hashes to partition 1, so node 1 heads the
    // preference list and node 0 is the fallback replica.
    let failing: Handler = Arc::new(|_, _| error_response(13, "disk on fire"));
    let serving: Handler = Arc::new(|_, _| value_response(b"v".to_vec()));

    let node0 = start_node(
        l0,
        with_metadata(cluster_doc.clone(), stores_doc.clone(), serving),
        Duration::ZERO,
    );
    let node1 = start_node(
        l1,
        with_metadata(cluster_doc, stores_doc, failing),
        Duration::ZERO,
    );

    let cluster = Cluster::with_config("127.0.0.1", a0.port(), test_config()).unwrap();
    cluster.connect().await.unwrap();

    let store = cluster.store("raw");
    let value = store.get(&Value::Bytes(b"hello".to_vec())).await.unwrap();
    assert_eq!(value, Value::Bytes(b"v".to_vec()));

    assert_eq!(node1.hits_for("raw"), 1);
    assert_eq!(node0.hits_for("raw"), 1);

    cluster.close().await;
}

#[tokio::test]
async fn key_not_found_stops_replica_retry() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    // The head replica answers with an empty version list; the second
    // replica would have the value but must never be asked.
    let head: Handler = Arc::new(|_, _| empty_response());
    let fallback: Handler = Arc::new(|_, _| value_response(b"v".to_vec()));

    let node0 = start_node(
        l0,
        with_metadata(cluster_doc.clone(), stores_doc.clone(), fallback),
        Duration::ZERO,
    );
    let node1 = start_node(
        l1,
        with_metadata(cluster_doc, stores_doc, head),
        Duration::ZERO,
    );

    let cluster = Cluster::with_config("127.0.0.1", a0.port(), test_config()).unwrap();
    cluster.connect().await.unwrap();

    let store = cluster.store("raw");
    assert!(matches!(
        store.get(&Value::Bytes(b"hello".to_vec())).await,
        Err(Error::KeyNotFound)
    ));

    assert_eq!(node1.hits_for("raw"), 1);
    assert_eq!(node0.hits_for("raw"), 0);

    cluster.close().await;
}

#[tokio::test]
async fn unhealthy_head_races_remaining_replicas() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    // Node 1 heads the list for key "hello" but never comes up; its
    // listener is dropped so dials are refused.
    drop(l1);

    let serving: Handler = Arc::new(|_, _| value_response(b"survivor".to_vec()));
    let node0 = start_node(
        l0,
        with_metadata(cluster_doc, stores_doc, serving),
        Duration::ZERO,
    );

    let config = ClientConfig {
        reconnect_interval_ms: 60_000,
        ..test_config()
    };
    let cluster = Cluster::with_config("127.0.0.1", a0.port(), config).unwrap();
    cluster.connect().await.unwrap();

    // Let the dial to node 1 fail so its health turns bad.
    sleep(Duration::from_millis(300)).await;

    let store = cluster.store("raw");
    let value = store.get(&Value::Bytes(b"hello".to_vec())).await.unwrap();
    assert_eq!(value, Value::Bytes(b"survivor".to_vec()));
    assert_eq!(node0.hits_for("raw"), 1);

    cluster.close().await;
}

#[tokio::test]
async fn bootstrap_retries_until_seed_appears() {
    let (reserved, seed_addr) = bind().await;
    drop(reserved);

    let cluster = Cluster::with_config("127.0.0.1", seed_addr.port(), test_config()).unwrap();

    // First attempt fails: nothing listens on the seed port yet.
    let error = cluster.connect().await.unwrap_err();
    assert!(error.is_server(), "bootstrap failure is transient: {:?}", error);

    // Bring the seed up on the same port; the retry timer finds it.
    let listener = TcpListener::bind(seed_addr).await.unwrap();
    let (cluster_doc, stores_doc) = (cluster_xml(seed_addr, seed_addr), stores_xml());
    let data: Handler = Arc::new(|store, _| {
        if store == "raw" {
            value_response(b"recovered".to_vec())
        } else {
            empty_response()
        }
    });
    start_node(
        listener,
        with_metadata(cluster_doc, stores_doc, data),
        Duration::ZERO,
    );

    let mut ready = false;
    for _ in 0..50 {
        if cluster.topology().is_some() {
            ready = true;
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    assert!(ready, "bootstrap never recovered");

    let store = cluster.store("raw");
    let value = store.get(&Value::Bytes(b"hello".to_vec())).await.unwrap();
    assert_eq!(value, Value::Bytes(b"recovered".to_vec()));

    cluster.close().await;
}

#[tokio::test]
async fn routerless_store_samples_random_nodes() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    // The norouting store declares no routing strategy, so the read
    // goes to up to two uniformly sampled nodes. Both serve the value
    // to keep the sampling invisible to the assertion.
    let data: Handler = Arc::new(|store, _| {
        if store == "norouting" {
            value_response(b"anywhere".to_vec())
        } else {
            empty_response()
        }
    });

    start_node(
        l0,
        with_metadata(cluster_doc.clone(), stores_doc.clone(), data.clone()),
        Duration::ZERO,
    );
    start_node(
        l1,
        with_metadata(cluster_doc, stores_doc, data),
        Duration::ZERO,
    );

    let cluster = Cluster::with_config("127.0.0.1", a0.port(), test_config()).unwrap();
    cluster.connect().await.unwrap();

    let store = cluster.store("norouting");
    let value = store.get(&Value::Bytes(b"any-key".to_vec())).await.unwrap();
    assert_eq!(value, Value::Bytes(b"anywhere".to_vec()));

    cluster.close().await;
}

#[tokio::test]
async fn store_guards_reject_bad_requests() {
    let (l0, a0) = bind().await;
    let (l1, a1) = bind().await;
    let (cluster_doc, stores_doc) = (cluster_xml(a0, a1), stores_xml());

    let data: Handler = Arc::new(|_, _| empty_response());
    start_node(
        l0,
        with_metadata(cluster_doc.clone(), stores_doc.clone(), data.clone()),
        Duration::ZERO,
    );
    start_node(
        l1,
        with_metadata(cluster_doc, stores_doc, data),
        Duration::ZERO,
    );

    let cluster = Cluster::with_config("127.0.0.1", a0.port(), test_config()).unwrap();
    cluster.connect().await.unwrap();

    assert!(matches!(
        cluster.store("nonexistent").get_str("k").await,
        Err(Error::UnknownStore(_))
    ));

    assert!(matches!(
        cluster
            .store("writable")
            .get(&Value::Bytes(b"k".to_vec()))
            .await,
        Err(Error::NotReadOnly { .. })
    ));

    // The raw store's identity key serializer rejects structured keys
    // before anything reaches the wire.
    assert!(matches!(
        cluster.store("raw").get(&Value::Int(5)).await,
        Err(Error::SchemaMismatch(_))
    ));

    cluster.close().await;
}
