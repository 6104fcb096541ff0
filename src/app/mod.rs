//! Process bootstrap of the server and the client.

pub mod drain;
pub mod signal;

use std::{io, path::Path, sync::Arc};

use thiserror::Error;
use tokio::net::TcpStream;

use crate::{
    client::{Session, SessionConfig, SessionReport},
    model::{Artifact, Dataset, LinearModel, ModelError},
    outcome::Reporter,
    server::{Aggregator, Server},
    settings::{ClientSettings, Settings},
    storage::{artifact, ServerStorage, StorageError, StorageResult},
    transport::Connection,
};

/// Errors that stop the bootstrap of a process.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("failed to initialize storage: {0:#}")]
    Storage(#[from] StorageError),
    #[error("failed to bind the server: {0}")]
    Bind(io::Error),
    #[error("failed to connect to {address}: {source}")]
    Connect { address: String, source: io::Error },
    #[error("failed to load the dataset: {0}")]
    Dataset(#[from] ModelError),
}

/// Opens the server storage and publishes an initial model if there is no canonical model yet.
pub async fn init_storage<A, F>(
    root: impl AsRef<Path>,
    model_filename: &str,
    initial_model: F,
) -> StorageResult<ServerStorage>
where
    A: Artifact,
    F: FnOnce() -> A,
{
    let storage = ServerStorage::open(root, model_filename).await?;
    if tokio::fs::metadata(storage.model_path()).await.is_err() {
        let model = initial_model();
        artifact::store(storage.model_path(), &model).await?;
        info!(
            "published initial model version {} to {}",
            model.version(),
            storage.model_path().display()
        );
    }
    Ok(storage)
}

/// Runs the server until a shutdown signal is received.
pub async fn run_server(settings: Settings) -> Result<(), ApplicationError> {
    let input_dim = settings.model.input_dim;
    let storage = init_storage(&settings.storage.root, &settings.storage.model_filename, || {
        LinearModel::new(input_dim)
    })
    .await?;

    let server = Server::<LinearModel>::bind(&settings.api, storage.clone())
        .await
        .map_err(ApplicationError::Bind)?;
    if let Ok(address) = server.local_addr() {
        info!("listening on {}", address);
    }
    let aggregator = Aggregator::<LinearModel>::new(
        storage,
        settings.aggregation.quorum,
        Reporter::new("aggregator", settings.report.clone()),
    );

    let (drain_tx, drain_rx) = drain::channel();
    let server_task = tokio::spawn(server.serve(drain_rx.clone()));
    let aggregation_task = tokio::spawn(aggregator.run(settings.aggregation.period(), drain_rx));

    signal::shutdown().await;
    drain_tx.drain().await;
    if let Err(err) = server_task.await {
        error!("acceptor task failed: {}", err);
    }
    if let Err(err) = aggregation_task.await {
        error!("aggregation task failed: {}", err);
    }
    info!("shut down");
    Ok(())
}

/// Runs a single client session.
pub async fn run_client(settings: ClientSettings) -> Result<SessionReport, ApplicationError> {
    tokio::fs::create_dir_all(&settings.client.root)
        .await
        .map_err(StorageError::from)?;
    let dataset = Arc::new(Dataset::load(&settings.client.dataset).await?);

    let address = settings.client.server_address.clone();
    let stream = TcpStream::connect(&address)
        .await
        .map_err(|source| ApplicationError::Connect {
            address: address.clone(),
            source,
        })?;
    info!("connected to {}", address);

    let connection = Connection::with_max_frame_size(stream, settings.client.max_frame_size);
    let session = Session::<LinearModel, _>::new(
        connection,
        SessionConfig::from(&settings),
        dataset,
        Reporter::new(settings.client.id.as_str(), settings.report.clone()),
    );
    Ok(session.run().await)
}
