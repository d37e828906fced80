//! Error types for the TiVo remote-control protocol.

use thiserror::Error;

/// Protocol-level errors raised while decoding device lines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line carried no command token.
    #[error("Empty line")]
    EmptyLine,

    /// A recognized command is missing a required field.
    #[error("{command} is missing the {field} field")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },
}

/// Client-side errors surfaced to callers of the device client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The argument is neither an IR code nor a zero-padded channel number.
    #[error("Invalid command \"{0}\"")]
    InvalidCommand(String),

    /// No socket is connected to the device.
    #[error("Not connected to device")]
    NotConnected,

    /// The socket failed while flushing the write.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// The connection task is no longer running.
    #[error("Client closed")]
    Closed,
}

impl ClientError {
    /// Returns true if the error was caused by the caller's input.
    pub fn is_invalid_command(&self) -> bool {
        matches!(self, ClientError::InvalidCommand(_))
    }
}
