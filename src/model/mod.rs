//! Model artifacts.
//!
//! The coordination protocol treats a model as an opaque [`Artifact`]: something that has a
//! version, can be (de)serialized, averaged with its peers and trained on a local [`Dataset`].
//! Two artifacts belong to the same generation if and only if their versions are equal.
//!
//! - [`LinearModel`] is a trainable linear regressor.
//! - [`EncryptedModel`] carries an encrypted weight blob which can be stored and transferred but
//!   neither trained nor averaged.

pub mod dataset;
pub mod encrypted;
pub mod linear;

use std::io;

use thiserror::Error;

pub use self::{dataset::Dataset, encrypted::EncryptedModel, linear::LinearModel};
use crate::settings::TrainingSettings;

/// The tolerance of the check that averaging weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-5;

#[derive(Debug, Error)]
/// Errors related to model artifacts.
pub enum ModelError {
    #[error("(de)serialization failed: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("operation not supported by {0} models")]
    Unsupported(&'static str),
    #[error("nothing to average")]
    NoPeers,
    #[error("got {weights} averaging weights for {peers} peers")]
    WeightCount { weights: usize, peers: usize },
    #[error("averaging weights sum to {0} instead of 1")]
    WeightSum(f64),
    #[error("dimension mismatch: expected {expected} but got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),
    #[error("failed to read dataset: {0}")]
    DatasetIo(#[from] io::Error),
    #[error("failed to parse dataset: {0}")]
    DatasetFormat(#[from] serde_json::Error),
    #[error("training diverged")]
    Diverged,
}

/// A versioned model as seen by the coordination protocol.
pub trait Artifact: Sized + Send + Sync + 'static {
    /// Gets the generation of the model.
    fn version(&self) -> u64;

    /// Moves the model to the next generation.
    fn advance_version(&mut self);

    /// Serializes the model into its file and wire representation.
    fn to_bytes(&self) -> Result<Vec<u8>, ModelError>;

    /// Deserializes a model from its file and wire representation.
    fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError>;

    /// Checks that `peer` can be averaged into `self`.
    ///
    /// Artifacts without a shape accept every peer.
    fn check_compatible(&self, _peer: &Self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Replaces the weights of `self` by the weighted average of the weights of `peers`.
    ///
    /// The version of `self` is kept. Without explicit `weights` every peer counts `1/n`.
    ///
    /// # Errors
    /// Fails if `peers` is empty, if the number of weights differs from the number of peers, if
    /// the weights don't sum to one or if the dimensions of the models differ.
    fn average(&mut self, peers: &[Self], weights: Option<&[f64]>) -> Result<(), ModelError>;

    /// Trains the model on a local dataset and returns the loss of the final epoch.
    ///
    /// Training doesn't change the version.
    fn train(&mut self, dataset: &Dataset, settings: &TrainingSettings)
        -> Result<f32, ModelError>;
}

/// Resolves the averaging weights of `peers` peers, defaulting to uniform weights.
pub(crate) fn averaging_weights(
    peers: usize,
    weights: Option<&[f64]>,
) -> Result<Vec<f64>, ModelError> {
    if peers == 0 {
        return Err(ModelError::NoPeers);
    }
    let weights = match weights {
        Some(weights) if weights.len() != peers => {
            return Err(ModelError::WeightCount {
                weights: weights.len(),
                peers,
            })
        }
        Some(weights) => weights.to_vec(),
        None => vec![1. / peers as f64; peers],
    };
    let sum = weights.iter().sum::<f64>();
    if (sum - 1.).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ModelError::WeightSum(sum));
    }
    Ok(weights)
}
