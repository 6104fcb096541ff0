//! The per connection state machine of the server.

use std::{marker::PhantomData, time::Duration};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    message::{ClientId, Kind, Message, MessageBuilder, Status, Upload, UploadError},
    model::{Artifact, ModelError},
    storage::{artifact, ServerStorage, StorageError, StorageResult},
    transport::{Connection, TransportError},
};

#[derive(Debug, Error)]
/// Reasons to deny a submission.
pub enum SubmitError {
    #[error("{0}")]
    Protocol(String),
    #[error("no upload within {0:?}")]
    Timeout(Duration),
    #[error("malformed upload frame: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid upload: {0}")]
    Upload(#[from] UploadError),
    #[error("invalid model: {0}")]
    Model(#[from] ModelError),
    #[error("failed to persist submission: {0:#}")]
    Storage(#[from] StorageError),
}

/// What to do with the connection after an exchange.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Flow {
    Continue,
    Close,
}

/// Serves the requests of a single client connection.
///
/// Requests and replies are strictly ordered: the responder handles one exchange at a time.
pub struct Responder<A, S> {
    connection: Connection<S>,
    storage: ServerStorage,
    upload_timeout: Duration,
    _artifact: PhantomData<A>,
}

impl<A, S> Responder<A, S>
where
    A: Artifact,
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(connection: Connection<S>, storage: ServerStorage, upload_timeout: Duration) -> Self {
        Self {
            connection,
            storage,
            upload_timeout,
            _artifact: PhantomData,
        }
    }

    /// Serves requests until the client goes away or the connection fails.
    pub async fn run(mut self) {
        loop {
            let request = match self.connection.recv().await {
                Ok(request) => request,
                Err(TransportError::Closed) => {
                    debug!("connection closed by client");
                    break;
                }
                Err(err) => {
                    warn!("failed to receive request: {}", err);
                    break;
                }
            };
            debug!("received {}/{}", request.kind(), request.status());

            let flow = match request.kind() {
                Kind::Require => self.handle_require().await,
                Kind::Submit => self.handle_submit(&request).await,
            };
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break,
                Err(TransportError::Closed) => {
                    debug!("connection closed by client");
                    break;
                }
                Err(err) => {
                    warn!("failed to reply: {}", err);
                    break;
                }
            }
        }
        if let Err(err) = self.connection.close().await {
            debug!("failed to close connection: {}", err);
        }
    }

    /// Replies with the canonical model, or with a failure if it can't be loaded.
    async fn handle_require(&mut self) -> Result<Flow, TransportError> {
        let reply = match self.canonical_model().await {
            Ok(model) => MessageBuilder::new(Kind::Require, Status::Accept)
                .payload(model)
                .build(),
            Err(err) => {
                error!("failed to load the canonical model: {:#}", err);
                Message::new(Kind::Require, Status::Failure)
            }
        };
        self.connection.send(&reply).await?;
        Ok(Flow::Continue)
    }

    async fn canonical_model(&self) -> StorageResult<Vec<u8>> {
        let model: A = artifact::load(self.storage.model_path()).await?;
        Ok(model.to_bytes()?)
    }

    /// Runs the `SUBMIT` exchange: accept, wait for the upload, persist it and register the
    /// client.
    async fn handle_submit(&mut self, request: &Message) -> Result<Flow, TransportError> {
        if request.status() != Status::None {
            warn!("unexpected submission opening {}", request.status());
            self.deny().await?;
            return Ok(Flow::Continue);
        }
        self.connection
            .send(&Message::new(Kind::Submit, Status::Accept))
            .await?;

        let upload = match tokio::time::timeout(self.upload_timeout, self.connection.recv()).await
        {
            Ok(Ok(upload)) => upload,
            Ok(Err(TransportError::Closed)) => return Err(TransportError::Closed),
            Ok(Err(err @ TransportError::Decode(_))) => {
                warn!("submission denied: {}", SubmitError::from(err));
                self.deny().await?;
                return Ok(Flow::Continue);
            }
            Ok(Err(err @ TransportError::FrameTooLarge { .. })) => {
                // the rest of the frame is still in the stream
                warn!("submission denied: {}", SubmitError::from(err));
                self.deny().await?;
                return Ok(Flow::Close);
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                warn!(
                    "submission denied: {}",
                    SubmitError::Timeout(self.upload_timeout)
                );
                self.deny().await?;
                return Ok(Flow::Close);
            }
        };

        let reply = match self.accept_upload(&upload).await {
            Ok(client_id) => {
                info!("registered submission of client {}", client_id);
                Message::new(Kind::Submit, Status::Success)
            }
            Err(err) => {
                warn!("submission denied: {}", err);
                Message::new(Kind::Submit, Status::Deny)
            }
        };
        self.connection.send(&reply).await?;
        Ok(Flow::Continue)
    }

    /// Persists an upload and registers its client. The client is only registered once its
    /// submission is on disk. Models that can't be averaged into the canonical model are denied.
    async fn accept_upload(&self, upload: &Message) -> Result<ClientId, SubmitError> {
        let outcome = upload.check(Kind::Submit, Status::Upload);
        if !outcome.is_ok() {
            return Err(SubmitError::Protocol(outcome.report().to_string()));
        }
        let Upload {
            client_id,
            artifact: bytes,
        } = Upload::from_byte_slice(upload.payload())?;
        let model = A::from_bytes(&bytes)?;
        let canonical: A = artifact::load(self.storage.model_path()).await?;
        canonical.check_compatible(&model)?;

        let path = self.storage.submission_path(&client_id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(StorageError::from)?;
        }
        artifact::store(&path, &model).await?;
        self.storage.registry().add(&client_id).await?;
        Ok(client_id)
    }

    async fn deny(&mut self) -> Result<(), TransportError> {
        self.connection
            .send(&Message::new(Kind::Submit, Status::Deny))
            .await
    }
}
