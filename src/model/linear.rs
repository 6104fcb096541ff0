use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    model::{averaging_weights, Artifact, Dataset, ModelError},
    settings::TrainingSettings,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A linear regressor `y = w · x + b`.
///
/// The bias is stored as the last weight.
pub struct LinearModel {
    version: u64,
    weights: Vec<f32>,
}

impl LinearModel {
    /// Creates a model of generation `0` with small random weights for inputs of dimension
    /// `input_dim`.
    pub fn new(input_dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let weights = (0..=input_dim)
            .map(|_| rng.gen_range(-0.01_f32..0.01))
            .collect();
        Self {
            version: 0,
            weights,
        }
    }

    /// Creates a model from its weights, bias last.
    pub fn from_weights(version: u64, weights: Vec<f32>) -> Self {
        Self { version, weights }
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Gets the dimension of the inputs the model expects.
    pub fn input_dim(&self) -> usize {
        self.weights.len().saturating_sub(1)
    }

    pub fn predict(&self, x: &[f32]) -> f32 {
        let (bias, weights) = match self.weights.split_last() {
            Some(split) => split,
            None => return 0.,
        };
        weights.iter().zip(x).map(|(w, x)| w * x).sum::<f32>() + bias
    }

    /// Computes the mean squared error on `dataset`.
    pub fn loss(&self, dataset: &Dataset) -> f32 {
        if dataset.is_empty() {
            return 0.;
        }
        let total = dataset
            .features()
            .iter()
            .zip(dataset.labels())
            .map(|(x, y)| (self.predict(x) - y).powi(2))
            .sum::<f32>();
        total / dataset.len() as f32
    }

    fn step(&mut self, dataset: &Dataset, batch: &[usize], learning_rate: f32) {
        let mut gradient = vec![0_f32; self.weights.len()];
        let (bias_gradient, weight_gradient) = match gradient.split_last_mut() {
            Some(split) => split,
            None => return,
        };
        for &i in batch {
            let x = &dataset.features()[i];
            let error = self.predict(x) - dataset.labels()[i];
            for (g, x) in weight_gradient.iter_mut().zip(x) {
                *g += error * x;
            }
            *bias_gradient += error;
        }
        let scale = 2. * learning_rate / batch.len() as f32;
        for (w, g) in self.weights.iter_mut().zip(gradient) {
            *w -= scale * g;
        }
    }
}

impl Artifact for LinearModel {
    fn version(&self) -> u64 {
        self.version
    }

    fn advance_version(&mut self) {
        self.version += 1;
    }

    fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        Ok(bincode::serialize(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn check_compatible(&self, peer: &Self) -> Result<(), ModelError> {
        if peer.weights.len() != self.weights.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.weights.len(),
                actual: peer.weights.len(),
            });
        }
        Ok(())
    }

    fn average(&mut self, peers: &[Self], weights: Option<&[f64]>) -> Result<(), ModelError> {
        let weights = averaging_weights(peers.len(), weights)?;
        for peer in peers {
            self.check_compatible(peer)?;
        }

        let mut average = vec![0_f64; self.weights.len()];
        for (peer, weight) in peers.iter().zip(weights) {
            for (sum, w) in average.iter_mut().zip(&peer.weights) {
                *sum += weight * f64::from(*w);
            }
        }
        self.weights = average.into_iter().map(|w| w as f32).collect();
        Ok(())
    }

    /// Runs shuffled mini-batch gradient descent on the mean squared error.
    fn train(
        &mut self,
        dataset: &Dataset,
        settings: &TrainingSettings,
    ) -> Result<f32, ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::InvalidDataset("no samples".to_string()));
        }
        if let Some(width) = dataset.width() {
            if width != self.input_dim() {
                return Err(ModelError::DimensionMismatch {
                    expected: self.input_dim(),
                    actual: width,
                });
            }
        }

        let mut rng = rand::thread_rng();
        let mut indices = (0..dataset.len()).collect::<Vec<_>>();
        let mut loss = self.loss(dataset);
        for epoch in 0..settings.epochs {
            indices.shuffle(&mut rng);
            for batch in indices.chunks(settings.batch_size.max(1)) {
                self.step(dataset, batch, settings.learning_rate);
            }
            loss = self.loss(dataset);
            if !loss.is_finite() {
                return Err(ModelError::Diverged);
            }
            debug!("epoch {}: loss {}", epoch + 1, loss);
        }
        Ok(loss)
    }
}
