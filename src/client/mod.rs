//! The client side of the protocol.
//!
//! A client runs a single [`Session`] per connection: it requires the global model, trains it on
//! its local dataset and submits the result. Each step yields an [`Outcome`] which is reported
//! before the next step starts.
//!
//! [`Outcome`]: crate::outcome::Outcome

mod session;

use std::path::PathBuf;

use displaydoc::Display;
use thiserror::Error;

pub use self::session::{Session, SessionReport};
use crate::{
    message::{ClientId, UploadError},
    model::ModelError,
    settings::{ClientSettings, TrainingSettings},
    storage::{StorageError, SUBMISSION_FILENAME},
    transport::TransportError,
};

#[derive(Debug, Display, Copy, Clone, Eq, PartialEq)]
/// The steps of a session, in order.
pub enum Step {
    /// REQUIRE
    Require,
    /// TRAIN
    Train,
    /// SUBMIT
    Submit,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Require, Step::Train, Step::Submit];
}

#[derive(Debug, Error)]
/// Errors of a session step.
pub enum SessionError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("model failure: {0}")]
    Model(#[from] ModelError),
    #[error("storage failure: {0:#}")]
    Storage(#[from] StorageError),
    #[error("upload failure: {0}")]
    Upload(#[from] UploadError),
    #[error("training task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
/// The parameters of a session.
pub struct SessionConfig {
    pub client_id: ClientId,
    /// The directory holding the local model.
    pub root: PathBuf,
    pub training: TrainingSettings,
    pub halt_on_failure: bool,
}

impl SessionConfig {
    /// Gets the path of the local model.
    pub fn model_path(&self) -> PathBuf {
        self.root.join(SUBMISSION_FILENAME)
    }
}

impl From<&ClientSettings> for SessionConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            client_id: settings.client.id.clone(),
            root: settings.client.root.clone(),
            training: settings.training,
            halt_on_failure: settings.session.halt_on_failure,
        }
    }
}
