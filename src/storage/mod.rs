//! Persistence of model artifacts and of the client registry.
//!
//! # Layout
//! ```text
//! <root>/<model_filename>      the canonical model
//! <root>/clients.list          the client registry
//! <root>/<client_id>/model.weight
//!                              the latest submission of a client
//! ```

pub mod artifact;
pub mod registry;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use rand::Rng;

pub use self::registry::ClientRegistry;
use crate::message::ClientId;

/// The error type for storage operations. These are I/O errors and corrupted files.
pub type StorageError = anyhow::Error;

/// The result of a storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// The file name of a model submitted by a client, and of the local model of a client.
pub const SUBMISSION_FILENAME: &str = "model.weight";

/// The file name of the client registry.
pub const REGISTRY_FILENAME: &str = "clients.list";

/// Gets the path of the latest submission of `client_id`.
pub fn submission_path(root: &Path, client_id: &ClientId) -> PathBuf {
    root.join(client_id.as_str()).join(SUBMISSION_FILENAME)
}

#[derive(Debug, Clone)]
/// A shared handle to the storage of a server: the canonical model, the client submissions and
/// the client registry.
pub struct ServerStorage {
    root: Arc<PathBuf>,
    model_path: Arc<PathBuf>,
    registry: ClientRegistry,
}

impl ServerStorage {
    /// Opens the storage rooted at `root`, creating the root directory and an empty registry if
    /// they don't exist.
    pub async fn open(root: impl AsRef<Path>, model_filename: &str) -> StorageResult<Self> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("failed to create {}", root.display()))?;
        let registry = ClientRegistry::open(root).await?;
        Ok(Self {
            root: Arc::new(root.to_path_buf()),
            model_path: Arc::new(root.join(model_filename)),
            registry,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Gets the path of the canonical model.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Gets the path of the latest submission of `client_id`.
    pub fn submission_path(&self, client_id: &ClientId) -> PathBuf {
        submission_path(&self.root, client_id)
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }
}

/// Replaces the content of `path` such that readers observe either the old or the new content.
///
/// The bytes are written to a temporary file next to `path` which is then renamed.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid file path {}", path.display()))?;
    let suffix: u32 = rand::thread_rng().gen();
    let tmp = path.with_file_name(format!(".{}.{:08x}.tmp", file_name, suffix));

    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err).with_context(|| format!("failed to replace {}", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        write_atomic(&path, b"old").await.unwrap();
        write_atomic(&path, b"new").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"new");

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names, vec![std::ffi::OsString::from("file")]);
    }

    #[tokio::test]
    async fn atomic_write_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_atomic(&dir.path().join("missing").join("file"), b"x")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn open_server_storage() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let storage = ServerStorage::open(&root, "global.weight").await.unwrap();
        assert!(root.join(REGISTRY_FILENAME).exists());
        assert_eq!(storage.model_path(), root.join("global.weight"));
        assert_eq!(
            storage.submission_path(&ClientId::new("c1").unwrap()),
            root.join("c1").join(SUBMISSION_FILENAME)
        );
    }

    #[test]
    fn submission_layout() {
        let id = ClientId::new("c1").unwrap();
        assert_eq!(
            submission_path(Path::new("/srv"), &id),
            Path::new("/srv/c1/model.weight")
        );
    }
}
