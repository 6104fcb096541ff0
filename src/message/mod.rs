//! The messages of the coordination protocol.
//!
//! # Frames
//! A [`Message`] is encoded into a single frame: a one byte [`Kind`], a one byte [`Status`], a
//! four bytes big endian option length, the option, and the payload. The payload has no length
//! field and extends to the end of the frame, so delimiting frames on a byte stream is the job of
//! the [transport].
//!
//! # Exchanges
//! - `REQUIRE`: the client sends `{REQUIRE, NONE}` and the server answers `{REQUIRE, ACCEPT}`
//!   with the serialized global model as payload.
//! - `SUBMIT`: the client announces a submission with `{SUBMIT, NONE}`, the server answers
//!   `{SUBMIT, ACCEPT}`, the client sends `{SUBMIT, UPLOAD}` carrying an [`Upload`], and the
//!   server answers `{SUBMIT, SUCCESS}` or `{SUBMIT, DENY}`.
//!
//! [transport]: crate::transport

pub(crate) mod buffer;
#[allow(clippy::module_inception)]
pub(crate) mod message;
pub(crate) mod upload;
pub(crate) mod utils;

use thiserror::Error;

pub use self::{
    buffer::{MessageBuffer, HEADER_LENGTH},
    message::{Kind, Message, MessageBuilder, Status},
    upload::{ClientId, InvalidClientId, Upload, UploadError, CLIENT_ID_MAX_LENGTH},
};

#[derive(Debug, Error)]
/// An error that signals a failure when trying to parse a frame.
pub enum DecodeError {
    #[error("invalid buffer length: {actual} < {expected}")]
    TooShort { actual: usize, expected: usize },
    #[error("invalid option length: {option_length} bytes announced but only {available} left")]
    OptionOverflow { option_length: u32, available: usize },
    #[error("invalid message kind {0}")]
    UnknownKind(u8),
    #[error("invalid message status {0}")]
    UnknownStatus(u8),
}
