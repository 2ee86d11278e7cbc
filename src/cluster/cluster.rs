//! Cluster coordinator
//!
//! Owns the node connections, the topology snapshot and the store
//! registry. Bootstrap runs on its own task and retries on a timer
//! until one attempt succeeds; gets issued meanwhile park on the status
//! channel. The read path resolves a preference list and applies the
//! replica retry policy.

use crate::cluster::bootstrap::{self, StoreSpec};
use crate::cluster::connection::{Connection, Health};
use crate::cluster::store::Store;
use crate::cluster::topology::ClusterTopology;
use crate::common::{ClientConfig, Error, Result};
use crate::protocol;
use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Product of a successful bootstrap; replaced never, shared as one
/// immutable snapshot.
pub(crate) struct ClusterState {
    pub topology: ClusterTopology,
    pub stores: HashMap<String, StoreSpec>,
    pub connections: HashMap<u32, Arc<Connection>>,
}

#[derive(Clone)]
pub(crate) enum BootstrapStatus {
    NotStarted,
    InProgress,
    Failed(String),
    Ready(Arc<ClusterState>),
}

pub(crate) struct ClusterInner {
    seed_host: String,
    seed_port: u16,
    config: ClientConfig,
    status_tx: watch::Sender<BootstrapStatus>,
    shutdown_tx: watch::Sender<bool>,
    closed: AtomicBool,
    bootstrap_task: Mutex<Option<JoinHandle<()>>>,
}

/// Client handle for one cluster, constructed from a seed address.
/// Clones share the same connections and bootstrap state.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    /// Build a client around a seed node with default configuration.
    pub fn new(seed_host: impl Into<String>, seed_port: u16) -> Self {
        Self::with_config(seed_host, seed_port, ClientConfig::default())
            .expect("default configuration is valid")
    }

    /// Build a client with explicit configuration.
    pub fn with_config(
        seed_host: impl Into<String>,
        seed_port: u16,
        config: ClientConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (status_tx, _) = watch::channel(BootstrapStatus::NotStarted);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(ClusterInner {
                seed_host: seed_host.into(),
                seed_port,
                config,
                status_tx,
                shutdown_tx,
                closed: AtomicBool::new(false),
                bootstrap_task: Mutex::new(None),
            }),
        })
    }

    /// Convenience factory: `proto://host:port/store` connects and
    /// returns the cluster together with the named store.
    pub async fn open(url: &str) -> Result<(Cluster, Store)> {
        let (host, port, store) = parse_store_url(url)?;
        let cluster = Cluster::new(host, port);
        cluster.connect().await?;
        let store = cluster.store(&store);
        Ok((cluster, store))
    }

    /// Start bootstrap (idempotent) and await its first outcome. Retries
    /// keep running in the background after a failed attempt, so a later
    /// call can succeed where this one errored.
    pub async fn connect(&self) -> Result<()> {
        self.spawn_bootstrap();
        self.inner.wait_ready().await.map(|_| ())
    }

    /// Facade for one store. Resolution of the store name happens on
    /// first use so the facade can be created before bootstrap settles.
    pub fn store(&self, name: &str) -> Store {
        Store::new(name.to_string(), Arc::downgrade(&self.inner))
    }

    /// Topology of the bootstrapped cluster, if available yet.
    pub fn topology(&self) -> Option<ClusterTopology> {
        match &*self.inner.status_tx.borrow() {
            BootstrapStatus::Ready(state) => Some(state.topology.clone()),
            _ => None,
        }
    }

    /// Graceful shutdown: stop bootstrap retries, close every node
    /// connection (awaiting their in-flight requests), fail queued work.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let _ = self.inner.shutdown_tx.send(true);

        let task = self
            .inner
            .bootstrap_task
            .lock()
            .expect("bootstrap task lock")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let state = match &*self.inner.status_tx.borrow() {
            BootstrapStatus::Ready(state) => Some(state.clone()),
            _ => None,
        };
        if let Some(state) = state {
            for connection in state.connections.values() {
                connection.close().await;
            }
        }

        tracing::info!("cluster client closed");
    }

    fn spawn_bootstrap(&self) {
        let mut task = self
            .inner
            .bootstrap_task
            .lock()
            .expect("bootstrap task lock");
        if task.is_some() || self.inner.closed.load(Ordering::Acquire) {
            return;
        }

        // Publish the in-progress status before the task runs so a
        // caller awaiting the outcome never observes NotStarted.
        self.inner
            .status_tx
            .send_replace(BootstrapStatus::InProgress);

        let inner = self.inner.clone();
        *task = Some(tokio::spawn(async move {
            inner.bootstrap_loop().await;
        }));
    }
}

impl ClusterInner {
    async fn bootstrap_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            self.status_tx.send_replace(BootstrapStatus::InProgress);

            match bootstrap::bootstrap_once(&self.seed_host, self.seed_port, &self.config).await {
                Ok(state) => {
                    tracing::info!(
                        cluster = %state.topology.name,
                        nodes = state.topology.node_count(),
                        partitions = state.topology.partition_count(),
                        stores = state.stores.len(),
                        "bootstrap complete"
                    );
                    self.status_tx
                        .send_replace(BootstrapStatus::Ready(Arc::new(state)));
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "bootstrap failed, retrying");
                    self.status_tx
                        .send_replace(BootstrapStatus::Failed(e.to_string()));
                }
            }

            let retry = tokio::time::sleep(self.config.bootstrap_retry());
            tokio::pin!(retry);
            tokio::select! {
                _ = &mut retry => {}
                _ = shutdown_rx.changed() => return,
            }
        }
    }

    /// Park until bootstrap settles. A get that arrives mid-attempt
    /// fails with that attempt; one that arrives after success reads the
    /// snapshot immediately.
    pub(crate) async fn wait_ready(&self) -> Result<Arc<ClusterState>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::ShutdownRequested);
        }

        let mut status_rx = self.status_tx.subscribe();
        loop {
            let status = status_rx.borrow_and_update().clone();
            match status {
                BootstrapStatus::Ready(state) => return Ok(state),
                BootstrapStatus::Failed(message) => return Err(Error::Bootstrap(message)),
                BootstrapStatus::NotStarted => {
                    return Err(Error::Bootstrap("cluster is not connected".into()))
                }
                BootstrapStatus::InProgress => {}
            }

            if status_rx.changed().await.is_err() {
                return Err(Error::ShutdownRequested);
            }
        }
    }

    /// Routed read: preference list partitions, their owning nodes'
    /// connections, then the replica retry policy.
    pub(crate) async fn execute_routed(
        &self,
        state: &ClusterState,
        spec: &StoreSpec,
        key: &[u8],
    ) -> Result<Bytes> {
        let router = spec
            .router
            .as_ref()
            .expect("execute_routed requires a router");

        let connections: Vec<Arc<Connection>> = router
            .preference_list(key, state.topology.ring())
            .into_iter()
            .filter_map(|partition| state.topology.owner_of(partition))
            .filter_map(|node| state.connections.get(&node).cloned())
            .collect();

        self.try_replicas(&connections, protocol::build_get(&spec.name, key))
            .await
    }

    /// Router-less fallback: up to two distinct nodes, sampled
    /// uniformly, tried in sequence under the same policy.
    pub(crate) async fn execute_random(
        &self,
        state: &ClusterState,
        store: &str,
        key: &[u8],
    ) -> Result<Bytes> {
        let connections = {
            use rand::seq::SliceRandom;
            let mut all: Vec<Arc<Connection>> = state.connections.values().cloned().collect();
            all.shuffle(&mut rand::thread_rng());
            all.truncate(2);
            all
        };

        self.try_replicas(&connections, protocol::build_get(store, key))
            .await
    }

    /// Replica retry policy. A healthy head is tried alone: server
    /// errors fall through to the rest of the list, client errors stop
    /// the read. An unhealthy head races the whole remaining list in
    /// parallel so it still gets a chance to prove it recovered.
    async fn try_replicas(
        &self,
        connections: &[Arc<Connection>],
        body: Vec<u8>,
    ) -> Result<Bytes> {
        if connections.is_empty() {
            return Err(Error::NoAvailableNodes);
        }

        let mut last_error = None;
        for (index, connection) in connections.iter().enumerate() {
            if connection.health() == Health::Bad {
                return race_replicas(&connections[index..], body).await;
            }

            match attempt(connection, body.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_client() => return Err(e),
                Err(e) => {
                    tracing::debug!(
                        addr = %connection.addr(),
                        error = %e,
                        "replica failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(Error::NoAvailableNodes))
    }
}

/// Issue one get against one replica and interpret the response.
async fn attempt(connection: &Connection, body: Vec<u8>) -> Result<Bytes> {
    let response = connection.send(body).await?;
    protocol::parse_get(&response)
}

/// Fan the request out to every remaining replica at once. First
/// success wins; a client error wins too and cancels the rest; if all
/// fail with server errors the last one is reported.
async fn race_replicas(connections: &[Arc<Connection>], body: Vec<u8>) -> Result<Bytes> {
    let mut in_flight: FuturesUnordered<_> = connections
        .iter()
        .map(|connection| {
            let connection = connection.clone();
            let body = body.clone();
            async move { attempt(&connection, body).await }
        })
        .collect();

    let mut last_error = None;
    while let Some(result) = in_flight.next().await {
        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_client() => return Err(e),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or(Error::NoAvailableNodes))
}

/// Parse `proto://host:port/store`.
fn parse_store_url(url: &str) -> Result<(String, u16, String)> {
    let invalid = || Error::InvalidConfig(format!("invalid store URL '{}'", url));

    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let (addr, store) = rest.split_once('/').ok_or_else(invalid)?;
    let (host, port) = addr.split_once(':').ok_or_else(invalid)?;

    if host.is_empty() || store.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok((host.to_string(), port, store.to_string()))
}
