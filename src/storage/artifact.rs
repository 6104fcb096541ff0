//! Loading and storing of model artifact files.

use std::path::Path;

use anyhow::Context;

use crate::{
    model::Artifact,
    storage::{write_atomic, StorageResult},
};

/// Loads an artifact from a file.
pub async fn load<A: Artifact>(path: impl AsRef<Path>) -> StorageResult<A> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    A::from_bytes(&bytes).with_context(|| format!("corrupted artifact {}", path.display()))
}

/// Stores an artifact atomically.
pub async fn store<A: Artifact>(path: impl AsRef<Path>, artifact: &A) -> StorageResult<()> {
    let path = path.as_ref();
    let bytes = artifact
        .to_bytes()
        .with_context(|| format!("failed to serialize artifact for {}", path.display()))?;
    write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Artifact, LinearModel};

    #[tokio::test]
    async fn store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.weight");
        let model = LinearModel::from_weights(4, vec![1., 2.]);

        store(&path, &model).await.unwrap();
        assert_eq!(load::<LinearModel>(&path).await.unwrap(), model);
        assert_eq!(load::<LinearModel>(&path).await.unwrap().version(), 4);
    }

    #[tokio::test]
    async fn load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load::<LinearModel>(dir.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn load_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.weight");
        tokio::fs::write(&path, [0xff]).await.unwrap();
        let err = load::<LinearModel>(&path).await.unwrap_err();
        assert!(err.to_string().contains("corrupted artifact"));
    }
}
