//! # fedavg: federated averaging over a framed binary protocol
//!
//! A set of clients and one server train a shared model without the clients ever uploading their
//! data. A client downloads the current model, trains it on its local dataset and submits the
//! updated weights. The server collects the submissions and periodically averages those trained
//! on the current model into the next generation of the model.
//!
//! ## Protocol
//! The client and the server exchange [`message::Message`]s, framed by the [`transport`] layer.
//! A client session runs three steps:
//! - **REQUIRE:** download the canonical model and store it locally;
//! - **TRAIN:** train the local model on the local dataset;
//! - **SUBMIT:** upload the trained model, tagged with the client identifier.
//!
//! Every step ends with an [`outcome::Outcome`], which is reported to the subscribed audiences
//! before the session moves on.
//!
//! ## Aggregation
//! The server remembers which clients submitted a model since the last aggregation in the
//! [`storage::ClientRegistry`]. Every aggregation period the [`server::Aggregator`] discards the
//! submissions of a different generation than the canonical model, and if enough submissions
//! remain it publishes their average as the next generation and clears the registry.
//!
//! ## Binaries
//! The `server` and `client` binaries take the path of a configuration file, see [`settings`].

#[macro_use]
extern crate tracing;

pub mod app;
pub mod client;
pub mod message;
pub mod model;
pub mod outcome;
pub mod server;
pub mod settings;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod tests;
