//! The client registry.
//!
//! The registry is the set of clients with an unaggregated submission on disk. It lives in a
//! single file. Every operation takes the registry wide lock, reads the file, applies its change
//! and writes the file back before the lock is released, so operations of concurrent connections
//! and of the aggregation never interleave.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use tokio::sync::Mutex;

use crate::{
    message::ClientId,
    storage::{write_atomic, StorageResult, REGISTRY_FILENAME},
};

#[derive(Debug, Clone)]
/// A shared handle to the client registry of a server root.
pub struct ClientRegistry {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ClientRegistry {
    /// Opens the registry of the given server root. A missing registry file is created empty.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let registry = Self {
            path: Arc::new(root.as_ref().join(REGISTRY_FILENAME)),
            lock: Arc::new(Mutex::new(())),
        };
        let exists = tokio::fs::metadata(registry.path.as_path()).await.is_ok();
        if !exists {
            let _guard = registry.lock.lock().await;
            registry.write(&[]).await?;
        }
        Ok(registry)
    }

    /// Gets the path of the registry file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Adds a client. Adding a registered client again is a no-op.
    pub async fn add(&self, client_id: &ClientId) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut clients = self.read().await?;
        if !clients.contains(client_id) {
            clients.push(client_id.clone());
            self.write(&clients).await?;
        }
        Ok(())
    }

    /// Gets a snapshot of the registered clients, in registration order.
    pub async fn get(&self) -> StorageResult<Vec<ClientId>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    /// Removes all clients.
    pub async fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        self.write(&[]).await
    }

    async fn read(&self) -> StorageResult<Vec<ClientId>> {
        let bytes = tokio::fs::read(self.path.as_path())
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        bincode::deserialize(&bytes)
            .with_context(|| format!("corrupted client registry {}", self.path.display()))
    }

    async fn write(&self, clients: &[ClientId]) -> StorageResult<()> {
        let bytes = bincode::serialize(clients).context("failed to serialize client registry")?;
        write_atomic(&self.path, &bytes).await
    }
}
