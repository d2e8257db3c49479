use std::{io, num::ParseIntError, str::Utf8Error};

use thiserror::Error;

/// Errors that may occur when reading a message from a stream.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer closed the stream before sending the first byte of a command.
    #[error("Connection closed by peer")]
    Closed,
    /// The stream failed or ended in the middle of a command.
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Received invalid command with prefix {0:?}")]
    InvalidCommandPrefix(String),
    #[error("Shift does not fit the scratch buffer: maximum is {max} bytes, but got {got}")]
    TooManyBytes { max: usize, got: usize },
    #[error("Unsupported version {0}")]
    UnsupportedVersion(String),
    #[error("{0}")]
    InvalidFormat(String),
}

impl From<Utf8Error> for ReadError {
    fn from(value: Utf8Error) -> Self {
        ReadError::InvalidFormat(format!("Invalid UTF8: {}", value))
    }
}

impl From<ParseIntError> for ReadError {
    fn from(value: ParseIntError) -> Self {
        ReadError::InvalidFormat(format!("Invalid integer: {}", value))
    }
}
