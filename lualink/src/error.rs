//! Error types for lualink.

use std::io;
use thiserror::Error;

/// Result type for lualink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for lualink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (socket, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The device produced no bytes within the read timeout while a
    /// response was still expected.
    #[error("No answer from device")]
    NoAnswer,

    /// The device echoed something other than the command that was sent.
    #[error("Echo mismatch: expected {expected:?}, got {actual:?}")]
    EchoMismatch {
        /// The echo the host was waiting for.
        expected: String,
        /// The line the device actually returned.
        actual: String,
    },

    /// The remote interpreter reported an evaluation error of its own.
    #[error("Interpreter error: {0}")]
    Interpreter(String),

    /// Response did not match any expected pattern.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A source line exceeds what fits into the device's line buffer.
    #[error("Line {line} is {length} bytes, exceeding the {limit}-byte limit")]
    LineTooLong {
        /// 1-based line number in the source.
        line: usize,
        /// Byte length of the offending line.
        length: usize,
        /// The configured maximum.
        limit: usize,
    },

    /// The requested file does not exist on the device.
    #[error("File {0:?} does not exist on device")]
    NotFound(String),
}
