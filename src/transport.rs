//! Length delimited message frames over a byte stream.
//!
//! Every [`Message`] travels as a four bytes big endian length followed by the encoded message.

use std::{convert::TryFrom, io};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{DecodeError, Message};

/// The default maximal size of a frame, in bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
/// Errors of a [`Connection`].
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("frame of {size} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },
    #[error("failed to decode frame: {0}")]
    Decode(#[from] DecodeError),
    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::Closed,
            _ => Self::Io(error),
        }
    }
}

#[derive(Debug)]
/// A message oriented connection on top of a byte stream.
pub struct Connection<S> {
    stream: S,
    max_frame_size: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_max_frame_size(stream, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(stream: S, max_frame_size: usize) -> Self {
        Self {
            stream,
            max_frame_size,
        }
    }

    /// Writes one frame.
    pub async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let size = message.buffer_length();
        let length = u32::try_from(size)
            .ok()
            .filter(|_| size <= self.max_frame_size)
            .ok_or(TransportError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })?;
        let mut frame = Vec::with_capacity(4 + size);
        frame.extend_from_slice(&length.to_be_bytes());
        frame.extend_from_slice(&message.encode());
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads and decodes one frame.
    ///
    /// The announced length is checked against the frame size limit before anything is
    /// allocated.
    pub async fn recv(&mut self) -> Result<Message, TransportError> {
        let size = self.stream.read_u32().await? as usize;
        if size > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        let mut frame = vec![0; size];
        self.stream.read_exact(&mut frame).await?;
        Ok(Message::from_byte_slice(&frame)?)
    }

    /// Flushes and shuts down the write half of the stream.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> S {
        self.stream
    }
}
