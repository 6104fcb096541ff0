//! The payload of an upload message and the client identifier it carries.
//!
//! See the [message module] documentation since this is a private module anyways.
//!
//! [message module]: crate::message

use std::{convert::TryFrom, str::FromStr};

use derive_more::{AsRef, Display};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::message::{Kind, Message, MessageBuilder, Status};

/// The maximal length in bytes of a [`ClientId`].
pub const CLIENT_ID_MAX_LENGTH: usize = 64;

#[derive(Debug, Error, Eq, PartialEq)]
#[error("invalid client identifier {0:?}: expected 1 to 64 characters among [A-Za-z0-9._-], other than \".\" and \"..\"")]
/// An error returned when a string is not a valid [`ClientId`].
pub struct InvalidClientId(pub String);

#[derive(AsRef, Debug, Display, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[as_ref(forward)]
/// The identifier of a client.
///
/// The server stores the submission of a client in a directory named after its identifier, so
/// an identifier is always a single, harmless path component.
pub struct ClientId(String);

impl ClientId {
    /// Validates the given identifier.
    ///
    /// # Errors
    /// Fails if the identifier is empty, too long, contains characters other than ASCII
    /// alphanumerics, `-`, `_` and `.`, or is `.` or `..`.
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidClientId> {
        let id = id.into();
        let valid_chars = id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.');
        if id.is_empty()
            || id.len() > CLIENT_ID_MAX_LENGTH
            || !valid_chars
            || id == "."
            || id == ".."
        {
            return Err(InvalidClientId(id));
        }
        Ok(Self(id))
    }

    /// Gets the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClientId {
    type Err = InvalidClientId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClientId {
    type Error = InvalidClientId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = String::deserialize(deserializer)?;
        Self::new(id).map_err(de::Error::custom)
    }
}

#[derive(Debug, Error)]
/// Errors related to the decoding of an upload payload.
pub enum UploadError {
    #[error("malformed upload payload: {0}")]
    Malformed(#[from] bincode::Error),
    #[error(transparent)]
    ClientId(#[from] InvalidClientId),
}

#[derive(Debug, Clone, Eq, PartialEq)]
/// The payload of a `SUBMIT`/`UPLOAD` message: the identifier of the submitting client and its
/// serialized model.
pub struct Upload {
    pub client_id: ClientId,
    pub artifact: Vec<u8>,
}

impl Upload {
    pub fn new(client_id: ClientId, artifact: Vec<u8>) -> Self {
        Self {
            client_id,
            artifact,
        }
    }

    /// Serializes the `(client_identifier, serialized_artifact)` pair.
    pub fn to_bytes(&self) -> Result<Vec<u8>, UploadError> {
        Ok(bincode::serialize(&(self.client_id.as_str(), &self.artifact))?)
    }

    /// Deserializes a `(client_identifier, serialized_artifact)` pair and validates the
    /// identifier.
    pub fn from_byte_slice(bytes: &[u8]) -> Result<Self, UploadError> {
        let (client_id, artifact): (String, Vec<u8>) = bincode::deserialize(bytes)?;
        Ok(Self {
            client_id: ClientId::new(client_id)?,
            artifact,
        })
    }

    /// Wraps the upload into a `SUBMIT`/`UPLOAD` message.
    pub fn into_message(self) -> Result<Message, UploadError> {
        let payload = self.to_bytes()?;
        Ok(MessageBuilder::new(Kind::Submit, Status::Upload)
            .payload(payload)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_client_ids() {
        for id in &["c1", "client-42", "node_7.eu", "a", &"x".repeat(64)] {
            assert_eq!(ClientId::new(*id).unwrap().as_str(), *id);
        }
    }

    #[test]
    fn invalid_client_ids() {
        for id in &["", ".", "..", "../etc", "a/b", "a\\b", "with space", &"x".repeat(65)] {
            assert!(ClientId::new(*id).is_err(), "{:?} should be rejected", id);
        }
    }

    #[test]
    fn client_id_display() {
        let id = ClientId::new("node_7.eu").unwrap();
        assert_eq!(id.to_string(), "node_7.eu");
        let as_str: &str = id.as_ref();
        assert_eq!(as_str, "node_7.eu");
    }

    #[test]
    fn deserialize_client_id_is_validated() {
        let valid: ClientId = serde_json::from_str("\"c1\"").unwrap();
        assert_eq!(valid.as_str(), "c1");
        assert!(serde_json::from_str::<ClientId>("\"../c1\"").is_err());
    }

    #[test]
    fn upload_message() {
        let upload = Upload::new(ClientId::new("c1").unwrap(), vec![1, 2, 3]);
        let message = upload.clone().into_message().unwrap();
        assert_eq!(message.kind(), Kind::Submit);
        assert_eq!(message.status(), Status::Upload);
        assert_eq!(Upload::from_byte_slice(message.payload()).unwrap(), upload);
    }

    #[test]
    fn upload_with_traversal_id_is_rejected() {
        let bytes = bincode::serialize(&("../../etc", vec![0_u8; 4])).unwrap();
        assert!(matches!(
            Upload::from_byte_slice(&bytes),
            Err(UploadError::ClientId(_))
        ));
    }

    #[test]
    fn garbage_upload_is_rejected() {
        assert!(matches!(
            Upload::from_byte_slice(&[0xff, 0xff]),
            Err(UploadError::Malformed(_))
        ));
    }
}
