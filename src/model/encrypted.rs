use serde::{Deserialize, Serialize};

use crate::{
    model::{Artifact, Dataset, ModelError},
    settings::TrainingSettings,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A model whose weights are encrypted.
///
/// The ciphertext is opaque to the coordinator, so encrypted models can be stored and
/// transferred but neither trained nor averaged.
pub struct EncryptedModel {
    version: u64,
    ciphertext: Vec<u8>,
}

impl EncryptedModel {
    pub fn new(version: u64, ciphertext: Vec<u8>) -> Self {
        Self {
            version,
            ciphertext,
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

impl Artifact for EncryptedModel {
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

    fn average(&mut self, _peers: &[Self], _weights: Option<&[f64]>) -> Result<(), ModelError> {
        Err(ModelError::Unsupported("encrypted"))
    }

    fn train(
        &mut self,
        _dataset: &Dataset,
        _settings: &TrainingSettings,
    ) -> Result<f32, ModelError> {
        Err(ModelError::Unsupported("encrypted"))
    }
}
