//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables. Examples of
//! configuration files can be found in the `configs/` directory located in the repository root.

use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment};
use serde::{
    de::{self, DeserializeOwned, Deserializer, Visitor},
    Deserialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    message::{ClientId, HEADER_LENGTH},
    outcome::Subscription,
    transport::DEFAULT_MAX_FRAME_SIZE,
};

#[cfg(test)]
mod tests;

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Loads a configuration file, merges the environment overrides and validates the result.
fn load<S>(path: impl AsRef<Path>) -> Result<S, SettingsError>
where
    S: DeserializeOwned + Validate,
{
    let mut config = Config::new();
    config.merge(config::File::from(path.as_ref()))?;
    config.merge(Environment::with_prefix("fedavg").separator("__"))?;
    let settings: S = config.try_into()?;
    settings.validate()?;
    Ok(settings)
}

#[derive(Debug, Validate, Deserialize)]
/// The server settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    #[validate]
    pub api: ApiSettings,
    pub storage: StorageSettings,
    #[validate]
    #[serde(default)]
    pub aggregation: AggregationSettings,
    #[validate]
    pub model: ModelSettings,
    pub log: LoggingSettings,
    #[serde(default)]
    pub report: Subscription,
}

impl Settings {
    /// Loads and validates the server settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        load(path)
    }
}

#[derive(Debug, Validate, Deserialize)]
/// The client settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct ClientSettings {
    #[validate]
    pub client: ClientSection,
    #[validate]
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub session: SessionSettings,
    pub log: LoggingSettings,
    #[serde(default)]
    pub report: Subscription,
}

impl ClientSettings {
    /// Loads and validates the client settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        load(path)
    }
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_api"))]
/// Server API settings.
pub struct ApiSettings {
    /// The address to which the server should be bound.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// bind_address = "0.0.0.0:8081"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_API__BIND_ADDRESS=127.0.0.1:8081
    /// ```
    pub bind_address: SocketAddr,

    /// How long the server waits for the upload of a client after it accepted a submission, in
    /// seconds. Defaults to `60`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [api]
    /// upload_timeout = 60
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_API__UPLOAD_TIMEOUT=60
    /// ```
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout: u64,

    /// The maximal size of a frame, in bytes. Defaults to 64 MiB.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl ApiSettings {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout)
    }

    /// Checks API settings.
    fn validate_api(&self) -> Result<(), ValidationError> {
        if self.upload_timeout == 0 {
            return Err(ValidationError::new("upload timeout must be positive"));
        }
        validate_frame_size(self.max_frame_size)
    }
}

/// A wrapper for validate derive.
fn validate_api(s: &ApiSettings) -> Result<(), ValidationError> {
    s.validate_api()
}

fn validate_frame_size(max_frame_size: usize) -> Result<(), ValidationError> {
    if max_frame_size < HEADER_LENGTH {
        Err(ValidationError::new("frame size below message header length"))
    } else {
        Ok(())
    }
}

fn default_upload_timeout() -> u64 {
    60
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

#[derive(Debug, Deserialize, Clone)]
/// Storage settings of the server.
pub struct StorageSettings {
    /// The directory holding the canonical model, the client registry and the client
    /// submissions.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [storage]
    /// root = "/var/lib/fedavg"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_STORAGE__ROOT=/var/lib/fedavg
    /// ```
    pub root: PathBuf,

    /// The file name of the canonical model within the root. Defaults to `global.weight`.
    #[serde(default = "default_model_filename")]
    pub model_filename: String,
}

impl StorageSettings {
    /// Gets the path of the canonical model.
    pub fn model_path(&self) -> PathBuf {
        self.root.join(&self.model_filename)
    }
}

fn default_model_filename() -> String {
    "global.weight".to_string()
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
#[serde(default)]
/// Aggregation settings.
pub struct AggregationSettings {
    /// The time between two aggregation rounds, in seconds. Defaults to `180`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [aggregation]
    /// period = 180
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_AGGREGATION__PERIOD=180
    /// ```
    #[validate(range(min = 1))]
    pub period: u64,

    /// The minimal number of fresh submissions needed for a round to aggregate. Defaults to `2`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [aggregation]
    /// quorum = 2
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_AGGREGATION__QUORUM=2
    /// ```
    #[validate(range(min = 1))]
    pub quorum: usize,
}

impl AggregationSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            period: 180,
            quorum: 2,
        }
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
/// Model settings.
pub struct ModelSettings {
    /// The input dimension of the initial model the server creates if there is no canonical
    /// model yet.
    ///
    /// **TOML**
    /// ```text
    /// [model]
    /// input_dim = 2
    /// ```
    #[validate(range(min = 1))]
    pub input_dim: usize,
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_client"))]
/// Client settings.
pub struct ClientSection {
    /// The identifier of the client. At most 64 characters among `[A-Za-z0-9._-]`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [client]
    /// id = "client-1"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_CLIENT__ID=client-1
    /// ```
    pub id: ClientId,

    /// The address of the server.
    ///
    /// **TOML**
    /// ```text
    /// [client]
    /// server_address = "127.0.0.1:8081"
    /// ```
    pub server_address: String,

    /// The directory holding the local model.
    pub root: PathBuf,

    /// The local dataset, a JSON file `{ "features": [[..]], "labels": [..] }`.
    pub dataset: PathBuf,

    /// The maximal size of a frame, in bytes. Defaults to 64 MiB.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl ClientSection {
    /// Checks client settings.
    fn validate_client(&self) -> Result<(), ValidationError> {
        if self.server_address.is_empty() {
            return Err(ValidationError::new("missing server address"));
        }
        validate_frame_size(self.max_frame_size)
    }
}

/// A wrapper for validate derive.
fn validate_client(s: &ClientSection) -> Result<(), ValidationError> {
    s.validate_client()
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq)]
#[validate(schema(function = "validate_training"))]
#[serde(default)]
/// Local training settings.
///
/// **TOML**
/// ```text
/// [training]
/// epochs = 1000
/// batch_size = 8
/// learning_rate = 0.0005
/// ```
pub struct TrainingSettings {
    /// The number of passes over the local dataset.
    #[validate(range(min = 1))]
    pub epochs: u32,
    /// The number of samples per gradient step.
    #[validate(range(min = 1))]
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl TrainingSettings {
    /// Checks training settings.
    fn validate_training(&self) -> Result<(), ValidationError> {
        if self.learning_rate > 0. && self.learning_rate.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::new("learning rate must be positive"))
        }
    }
}

/// A wrapper for validate derive.
fn validate_training(s: &TrainingSettings) -> Result<(), ValidationError> {
    s.validate_training()
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: 1000,
            batch_size: 8,
            learning_rate: 5e-4,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
/// Session settings.
pub struct SessionSettings {
    /// Whether a session stops at the first failed step. Defaults to `true`. When disabled, the
    /// remaining steps run regardless of earlier failures.
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_SESSION__HALT_ON_FAILURE=false
    /// ```
    #[serde(default = "default_halt_on_failure")]
    pub halt_on_failure: bool,
}

fn default_halt_on_failure() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            halt_on_failure: true,
        }
    }
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDAVG_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}
