use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A local training dataset.
///
/// Stored as JSON:
/// ```text
/// { "features": [[0.5, 1.0], [1.5, -2.0]], "labels": [1.0, 0.0] }
/// ```
pub struct Dataset {
    features: Vec<Vec<f32>>,
    labels: Vec<f32>,
}

impl Dataset {
    /// Creates a dataset.
    ///
    /// # Errors
    /// Fails if the number of samples differs from the number of labels or if the samples are
    /// not all of the same width.
    pub fn new(features: Vec<Vec<f32>>, labels: Vec<f32>) -> Result<Self, ModelError> {
        let dataset = Self { features, labels };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Parses and validates a JSON dataset.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let dataset: Self = serde_json::from_slice(bytes)?;
        dataset.validate()?;
        Ok(dataset)
    }

    /// Reads a JSON dataset from a file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_json(&bytes)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.features.len() != self.labels.len() {
            return Err(ModelError::InvalidDataset(format!(
                "{} samples but {} labels",
                self.features.len(),
                self.labels.len()
            )));
        }
        if let Some(first) = self.features.first() {
            if self.features.iter().any(|x| x.len() != first.len()) {
                return Err(ModelError::InvalidDataset(
                    "samples of different widths".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Gets the number of features per sample, if there is any sample.
    pub fn width(&self) -> Option<usize> {
        self.features.first().map(Vec::len)
    }

    pub fn features(&self) -> &[Vec<f32>] {
        &self.features
    }

    pub fn labels(&self) -> &[f32] {
        &self.labels
    }
}
