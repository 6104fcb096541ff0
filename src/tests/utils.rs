use std::time::Duration;

use tempfile::TempDir;
use tokio::{
    io::{duplex, DuplexStream},
    task::JoinHandle,
};

use crate::{
    message::ClientId,
    model::{Artifact, LinearModel},
    server::Responder,
    storage::{artifact, ServerStorage},
    transport::Connection,
};

pub const MODEL_FILENAME: &str = "global.weight";

pub fn id(id: &str) -> ClientId {
    ClientId::new(id).unwrap()
}

/// Creates a server storage in a scratch directory with the given canonical model.
pub async fn init_storage(canonical: Option<&LinearModel>) -> (TempDir, ServerStorage) {
    let dir = tempfile::tempdir().unwrap();
    let storage = ServerStorage::open(dir.path().join("server"), MODEL_FILENAME)
        .await
        .unwrap();
    if let Some(model) = canonical {
        artifact::store(storage.model_path(), model).await.unwrap();
    }
    (dir, storage)
}

/// Puts a submission on disk and registers its client, as a successful `SUBMIT` does.
pub async fn submit(storage: &ServerStorage, client_id: &str, model: &LinearModel) {
    let client_id = id(client_id);
    let path = storage.submission_path(&client_id);
    tokio::fs::create_dir_all(path.parent().unwrap())
        .await
        .unwrap();
    artifact::store(&path, model).await.unwrap();
    storage.registry().add(&client_id).await.unwrap();
}

pub async fn canonical(storage: &ServerStorage) -> LinearModel {
    artifact::load(storage.model_path()).await.unwrap()
}

/// Spawns a responder serving the returned client end of an in-memory connection.
pub fn spawn_responder(
    storage: &ServerStorage,
    upload_timeout: Duration,
) -> (Connection<DuplexStream>, JoinHandle<()>) {
    let (client, server) = duplex(1 << 16);
    let responder =
        Responder::<LinearModel, _>::new(Connection::new(server), storage.clone(), upload_timeout);
    (Connection::new(client), tokio::spawn(responder.run()))
}

pub fn model(version: u64, weights: &[f32]) -> LinearModel {
    LinearModel::from_weights(version, weights.to_vec())
}

pub fn assert_version(model: &impl Artifact, version: u64) {
    assert_eq!(model.version(), version);
}
