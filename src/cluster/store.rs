//! Per-store facade
//!
//! A `Store` holds its name and a non-owning reference back to the
//! cluster; the cluster outlives and owns the connections. Gets park on
//! the bootstrap status channel until the store registry exists.

use crate::cluster::cluster::ClusterInner;
use crate::common::{Error, Result};
use crate::records::Value;
use std::sync::Weak;

/// Persistence kind this client can serve.
const READ_ONLY: &str = "read-only";

/// Handle to one named store.
#[derive(Clone)]
pub struct Store {
    name: String,
    cluster: Weak<ClusterInner>,
}

impl Store {
    pub(crate) fn new(name: String, cluster: Weak<ClusterInner>) -> Self {
        Self { name, cluster }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch and decode the value for `key`.
    ///
    /// The key runs through the store's key serializer and compressor,
    /// the raw response through the value compressor and serializer.
    /// `Error::KeyNotFound` reports a key the cluster does not hold.
    pub async fn get(&self, key: &Value) -> Result<Value> {
        let cluster = self
            .cluster
            .upgrade()
            .ok_or(Error::ShutdownRequested)?;
        let state = cluster.wait_ready().await?;

        let spec = state
            .stores
            .get(&self.name)
            .ok_or_else(|| Error::UnknownStore(self.name.clone()))?;

        if spec.persistence != READ_ONLY {
            return Err(Error::NotReadOnly {
                store: self.name.clone(),
                persistence: spec.persistence.clone(),
            });
        }

        let key_bytes = spec
            .key_compression
            .compress(&spec.key_serializer.encode(key)?)?;

        let raw = if spec.router.is_some() {
            cluster.execute_routed(&state, spec, &key_bytes).await?
        } else {
            cluster
                .execute_random(&state, &self.name, &key_bytes)
                .await?
        };

        let decompressed = spec.value_compression.decompress(&raw)?;
        spec.value_serializer.decode(&decompressed)
    }

    /// Convenience wrapper for plain string keys.
    pub async fn get_str(&self, key: &str) -> Result<Value> {
        self.get(&Value::from(key)).await
    }
}
