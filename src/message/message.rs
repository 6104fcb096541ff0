//! Messages, message kinds and statuses.
//!
//! See the [message module] documentation since this is a private module anyways.
//!
//! [message module]: crate::message

use std::convert::{TryFrom, TryInto};

use displaydoc::Display;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    message::{
        buffer::{MessageBuffer, HEADER_LENGTH},
        DecodeError,
    },
    outcome::{Audience, Outcome, Severity},
};

#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Eq,
    PartialEq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
/// The kind of a [`Message`], _i.e._ the exchange it belongs to.
pub enum Kind {
    /// REQUIRE
    Require = 0,
    /// SUBMIT
    Submit = 1,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Display,
    Eq,
    PartialEq,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
/// The status of a [`Message`] within its exchange.
pub enum Status {
    /// NONE
    None = 0,
    /// ACCEPT
    Accept = 1,
    /// DENY
    Deny = 2,
    /// SUCCESS
    Success = 3,
    /// FAILURE
    Failure = 4,
    /// UPLOAD
    Upload = 5,
}

#[derive(Debug, Clone, Eq, PartialEq)]
/// A protocol message.
///
/// Messages are immutable once built. Use [`MessageBuilder`] to accumulate an option and a
/// payload, or [`Message::new`] for the common case of a message without either.
pub struct Message {
    kind: Kind,
    status: Status,
    option: Vec<u8>,
    payload: Vec<u8>,
}

impl Message {
    /// Creates a message with an empty option and an empty payload.
    pub fn new(kind: Kind, status: Status) -> Self {
        MessageBuilder::new(kind, status).build()
    }

    /// Gets the message kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Gets the message status.
    pub fn status(&self) -> Status {
        self.status
    }

    #[cfg(test)]
    pub(crate) fn option(&self) -> &[u8] {
        &self.option
    }

    /// Gets the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the number of bytes needed to encode this message.
    pub fn buffer_length(&self) -> usize {
        HEADER_LENGTH + self.option.len() + self.payload.len()
    }

    /// Serializes the message into the given buffer.
    ///
    /// # Panics
    /// This method panics if the given buffer is smaller than [`buffer_length()`].
    ///
    /// [`buffer_length()`]: Message::buffer_length
    pub fn to_bytes<T: AsMut<[u8]> + AsRef<[u8]> + ?Sized>(&self, buffer: &mut T) {
        let mut writer = MessageBuffer::new_unchecked(buffer.as_mut());
        writer.set_kind(self.kind.into());
        writer.set_status(self.status.into());
        // the builder refuses options that do not fit the length field
        writer.set_option_length(self.option.len() as u32);
        writer.option_mut().copy_from_slice(&self.option);
        writer.payload_mut()[..self.payload.len()].copy_from_slice(&self.payload);
    }

    /// Encodes the message into a freshly allocated frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.buffer_length()];
        self.to_bytes(&mut bytes);
        bytes
    }

    /// Decodes exactly one message from the given frame. Every byte after the option belongs to
    /// the payload.
    pub fn from_byte_slice<T: AsRef<[u8]> + ?Sized>(buffer: &T) -> Result<Self, DecodeError> {
        let reader = MessageBuffer::new(buffer.as_ref())?;
        let kind =
            Kind::try_from(reader.kind()).map_err(|_| DecodeError::UnknownKind(reader.kind()))?;
        let status = reader
            .status()
            .try_into()
            .map_err(|_| DecodeError::UnknownStatus(reader.status()))?;
        Ok(Self {
            kind,
            status,
            option: reader.option().to_vec(),
            payload: reader.payload().to_vec(),
        })
    }

    /// Checks that the message is of the expected kind and carries the expected status.
    ///
    /// The failure report is addressed to the user, as a warning, and names both the received
    /// and the expected value.
    pub fn check(&self, kind: Kind, status: Status) -> Outcome {
        if self.kind != kind {
            return Outcome::failure(
                Audience::User,
                Severity::Warning,
                format!("wrong kind: received {} instead of {}", self.kind, kind),
            );
        }
        if self.status != status {
            return Outcome::failure(
                Audience::User,
                Severity::Warning,
                format!("wrong status: received {} instead of {}", self.status, status),
            );
        }
        Outcome::success()
    }
}

#[derive(Debug, Clone)]
/// A builder for [`Message`]s.
///
/// ```rust
/// use fedavg::message::{Kind, MessageBuilder, Status};
///
/// let message = MessageBuilder::new(Kind::Submit, Status::Upload)
///     .append_option(b"v1")
///     .payload(vec![1, 2, 3])
///     .append_payload(&[4])
///     .build();
/// assert_eq!(message.payload(), &[1, 2, 3, 4]);
/// assert_eq!(&message.encode()[4..8], b"\0\x02v1");
/// ```
pub struct MessageBuilder {
    kind: Kind,
    status: Status,
    option: Vec<u8>,
    payload: Vec<u8>,
}

impl MessageBuilder {
    /// Starts a message of the given kind and status.
    pub fn new(kind: Kind, status: Status) -> Self {
        Self {
            kind,
            status,
            option: Vec::new(),
            payload: Vec::new(),
        }
    }

    /// Appends bytes to the option field.
    ///
    /// # Panics
    /// Panics if the option grows beyond `u32::MAX` bytes, which the length field cannot express.
    pub fn append_option(mut self, bytes: &[u8]) -> Self {
        self.option.extend_from_slice(bytes);
        assert!(
            u32::try_from(self.option.len()).is_ok(),
            "option field exceeds 2^32 - 1 bytes"
        );
        self
    }

    /// Replaces the payload.
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Appends bytes to the payload.
    pub fn append_payload(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    /// Emits the message.
    pub fn build(self) -> Message {
        Message {
            kind: self.kind,
            status: self.status,
            option: self.option,
            payload: self.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> (Message, Vec<u8>) {
        let message = MessageBuilder::new(Kind::Submit, Status::Upload)
            .append_option(&[0xaa, 0xbb])
            .payload(vec![0x01, 0x02, 0x03])
            .build();
        let bytes = vec![
            0x01, 0x05, // SUBMIT, UPLOAD
            0x00, 0x00, 0x00, 0x02, // option length
            0xaa, 0xbb, // option
            0x01, 0x02, 0x03, // payload
        ];
        (message, bytes)
    }

    #[test]
    fn encode() {
        let (message, bytes) = upload();
        assert_eq!(message.buffer_length(), bytes.len());
        assert_eq!(message.encode(), bytes);
    }

    #[test]
    fn decode() {
        let (message, bytes) = upload();
        assert_eq!(Message::from_byte_slice(&bytes).unwrap(), message);
    }

    #[test]
    fn decode_empty_option_and_payload() {
        let bytes = vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let message = Message::from_byte_slice(&bytes).unwrap();
        assert_eq!(message, Message::new(Kind::Require, Status::None));
    }

    #[test]
    fn payload_spans_to_the_end_of_the_frame() {
        let payload: Vec<u8> = (0..=255).collect();
        let message = MessageBuilder::new(Kind::Require, Status::Accept)
            .payload(payload.clone())
            .build();
        let decoded = Message::from_byte_slice(&message.encode()).unwrap();
        assert!(decoded.option().is_empty());
        assert_eq!(decoded.payload(), payload.as_slice());
    }

    #[test]
    fn random_round_trips() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let kinds = [Kind::Require, Kind::Submit];
        let statuses = [
            Status::None,
            Status::Accept,
            Status::Deny,
            Status::Success,
            Status::Failure,
            Status::Upload,
        ];
        for _ in 0..100 {
            let option: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();
            let payload: Vec<u8> = (0..rng.gen_range(0..512)).map(|_| rng.gen()).collect();
            let message = MessageBuilder::new(
                kinds[rng.gen_range(0..kinds.len())],
                statuses[rng.gen_range(0..statuses.len())],
            )
            .append_option(&option)
            .payload(payload)
            .build();
            assert_eq!(Message::from_byte_slice(&message.encode()).unwrap(), message);
        }
    }

    #[test]
    fn decode_unknown_kind() {
        let bytes = vec![0x07, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            Message::from_byte_slice(&bytes),
            Err(DecodeError::UnknownKind(7))
        ));
    }

    #[test]
    fn decode_unknown_status() {
        let bytes = vec![0x01, 0x06, 0x00, 0x00, 0x00, 0x00];
        assert!(matches!(
            Message::from_byte_slice(&bytes),
            Err(DecodeError::UnknownStatus(6))
        ));
    }

    #[test]
    fn wire_values() {
        assert_eq!(u8::from(Kind::Require), 0);
        assert_eq!(u8::from(Kind::Submit), 1);
        let statuses = [
            Status::None,
            Status::Accept,
            Status::Deny,
            Status::Success,
            Status::Failure,
            Status::Upload,
        ];
        for (value, status) in statuses.iter().enumerate() {
            assert_eq!(u8::from(*status), value as u8);
        }
    }

    #[test]
    fn check_match() {
        let message = Message::new(Kind::Submit, Status::Accept);
        assert!(message.check(Kind::Submit, Status::Accept).is_ok());
    }

    #[test]
    fn check_wrong_kind() {
        let message = Message::new(Kind::Require, Status::Accept);
        let outcome = message.check(Kind::Submit, Status::Accept);
        assert!(!outcome.is_ok());
        let warning = outcome
            .report()
            .get(Audience::User, Severity::Warning)
            .unwrap();
        assert!(warning.contains("wrong kind"));
        assert!(warning.contains("REQUIRE"));
        assert!(warning.contains("SUBMIT"));
    }

    #[test]
    fn check_wrong_status() {
        let message = Message::new(Kind::Submit, Status::Deny);
        let outcome = message.check(Kind::Submit, Status::Success);
        assert!(!outcome.is_ok());
        let warning = outcome
            .report()
            .get(Audience::User, Severity::Warning)
            .unwrap();
        assert!(warning.contains("wrong status"));
        assert!(warning.contains("DENY"));
        assert!(warning.contains("SUCCESS"));
        assert!(!warning.contains('2'));
    }
}
