//! Message buffers.
//!
//! See the [message module] documentation since this is a private module anyways.
//!
//! [message module]: crate::message

use std::{
    convert::TryInto,
    ops::{Range, RangeFrom},
};

use crate::message::{utils::range, DecodeError};

pub(crate) mod ranges {
    use super::*;

    /// Byte position of the message kind
    pub const KIND: usize = 0;
    /// Byte position of the message status
    pub const STATUS: usize = KIND + 1;
    /// Byte range corresponding to the length of the option field
    pub const OPTION_LENGTH: Range<usize> = range(STATUS + 1, 4);
}

/// Length in bytes of the fixed part of a message, _i.e._ everything but the option and the
/// payload.
pub const HEADER_LENGTH: usize = ranges::OPTION_LENGTH.end;

/// A wrapper around a buffer that contains a [`Message`].
///
/// It provides getters and setters to access the different fields of the message safely. A
/// message is made of a fixed header, a variable length option and a payload:
///
/// ```no_rust
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     kind      |    status     |     option_length (4 bytes)   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
/// |                               |                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+                               +
/// |                 option (option_length bytes)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// +              payload (until the end of the frame)             +
/// |                                                               |
/// ```
///
/// - `kind` says whether this is a `REQUIRE` or a `SUBMIT` message
/// - `status` qualifies the message within an exchange (`NONE`, `ACCEPT`, `UPLOAD`...)
/// - `option_length` is the length in bytes of the option field only, big endian
/// - `payload` has no length field: it spans all the bytes left in the frame, so a buffer must
///   contain exactly one message
///
/// # Examples
/// ## Reading a message
///
/// ```rust
/// use fedavg::message::MessageBuffer;
///
/// let mut bytes = vec![
///     0x01, // kind (SUBMIT)
///     0x05, // status (UPLOAD)
///     0x00, 0x00, 0x00, 0x02, // option length
///     0xaa, 0xbb, // option
/// ];
/// bytes.extend(vec![0x11; 8]); // payload
///
/// let buffer = MessageBuffer::new(&bytes).unwrap();
/// assert_eq!(buffer.kind(), 1);
/// assert_eq!(buffer.status(), 5);
/// assert_eq!(buffer.option_length(), 2);
/// assert_eq!(buffer.option(), &[0xaa, 0xbb][..]);
/// assert_eq!(buffer.payload(), vec![0x11; 8].as_slice());
/// ```
///
/// ## Writing a message
///
/// ```rust
/// use fedavg::message::MessageBuffer;
///
/// let mut expected = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
/// expected.extend(vec![0x22; 4]);
///
/// let mut bytes = vec![0; expected.len()];
/// let mut buffer = MessageBuffer::new_unchecked(&mut bytes);
/// buffer.set_kind(0);
/// buffer.set_status(1);
/// buffer.set_option_length(0);
/// buffer.payload_mut().copy_from_slice(&[0x22; 4]);
/// assert_eq!(expected, bytes);
/// ```
///
/// [`Message`]: crate::message::Message
pub struct MessageBuffer<T> {
    inner: T,
}

impl<T: AsRef<[u8]>> MessageBuffer<T> {
    /// Performs bound checks for the various message fields on `bytes` and returns a new
    /// [`MessageBuffer`].
    ///
    /// # Errors
    /// Fails if the `bytes` are smaller than the fixed header, or if the option length field
    /// points past the end of the buffer.
    pub fn new(bytes: T) -> Result<Self, DecodeError> {
        let buffer = Self { inner: bytes };
        buffer.check_buffer_length()?;
        Ok(buffer)
    }

    /// Returns a [`MessageBuffer`] without performing any bound checks.
    ///
    /// This means accessing the various fields may panic if the data
    /// is invalid.
    pub fn new_unchecked(bytes: T) -> Self {
        Self { inner: bytes }
    }

    /// Performs bound checks to ensure the fields can be accessed
    /// without panicking.
    pub fn check_buffer_length(&self) -> Result<(), DecodeError> {
        let len = self.inner.as_ref().len();
        if len < HEADER_LENGTH {
            return Err(DecodeError::TooShort {
                actual: len,
                expected: HEADER_LENGTH,
            });
        }
        let option_end = HEADER_LENGTH as u64 + self.option_length() as u64;
        if (len as u64) < option_end {
            return Err(DecodeError::OptionOverflow {
                option_length: self.option_length(),
                available: len - HEADER_LENGTH,
            });
        }
        Ok(())
    }

    /// Gets the kind field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn kind(&self) -> u8 {
        self.inner.as_ref()[ranges::KIND]
    }

    /// Gets the status field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn status(&self) -> u8 {
        self.inner.as_ref()[ranges::STATUS]
    }

    /// Gets the option length field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn option_length(&self) -> u32 {
        // Unwrapping is OK, as the slice is guaranteed to be 4 bytes
        // long
        u32::from_be_bytes(
            self.inner.as_ref()[ranges::OPTION_LENGTH]
                .try_into()
                .unwrap(),
        )
    }

    fn option_range(&self) -> Range<usize> {
        range(HEADER_LENGTH, self.option_length() as usize)
    }

    fn payload_range(&self) -> RangeFrom<usize> {
        self.option_range().end..
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> MessageBuffer<&'a T> {
    /// Gets the option field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn option(&self) -> &'a [u8] {
        &self.inner.as_ref()[self.option_range()]
    }

    /// Gets the rest of the message.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn payload(&self) -> &'a [u8] {
        &self.inner.as_ref()[self.payload_range()]
    }
}

impl<T: AsMut<[u8]> + AsRef<[u8]>> MessageBuffer<T> {
    /// Sets the kind field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn set_kind(&mut self, value: u8) {
        self.inner.as_mut()[ranges::KIND] = value;
    }

    /// Sets the status field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn set_status(&mut self, value: u8) {
        self.inner.as_mut()[ranges::STATUS] = value;
    }

    /// Sets the option length field. It must be set before accessing the option and the payload
    /// mutably.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn set_option_length(&mut self, value: u32) {
        let bytes = value.to_be_bytes();
        self.inner.as_mut()[ranges::OPTION_LENGTH].copy_from_slice(&bytes[..]);
    }

    /// Gets a mutable reference to the option field.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn option_mut(&mut self) -> &mut [u8] {
        let range = self.option_range();
        &mut self.inner.as_mut()[range]
    }

    /// Gets a mutable reference to the rest of the message.
    ///
    /// # Panics
    /// Accessing the field may panic if the buffer has not been checked before.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let range = self.payload_range();
        &mut self.inner.as_mut()[range]
    }
}
