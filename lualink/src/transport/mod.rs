//! Byte-channel abstraction over the two supported connection kinds.
//!
//! The protocol layer never sees a serial port or a socket directly, only
//! the `Transport` trait:
//!
//! ```text
//! +------------------------+
//! |  Session / transfers   |
//! +-----------+------------+
//!             |
//!             v
//! +-----------+------------+
//! |    Transport trait     |
//! +-----------+------------+
//!             |
//!     +-------+--------+
//!     v                v
//! +---+----+      +----+----+
//! | Serial |      |   Tcp   |
//! +--------+      +---------+
//! ```
//!
//! Both implementations own connection setup and teardown; failure to open
//! is a construction-time error, never retried. Reads block up to the
//! configured timeout and return `Ok(0)` once it elapses (or on EOF), so
//! callers distinguish "quiet" from hard I/O failures.

pub mod serial;
pub mod tcp;

use crate::error::Result;

/// A raw byte channel to the device.
///
/// Exactly one live instance exists per run; it is owned by the
/// [`Session`](crate::session::Session) and closed exactly once on every
/// exit path.
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes, blocking up to the read timeout.
    ///
    /// Returns `Ok(0)` when the timeout elapses or the peer has gone away.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write all bytes, blocking until the channel has accepted them.
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Discard any input bytes already buffered on the host side.
    ///
    /// No-op where the channel has no host-side buffer to clear.
    fn clear_input(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the channel and release the underlying handle.
    ///
    /// After this call the transport cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Human-readable connection name for log and error messages.
    fn name(&self) -> &str;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_all(buf)
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

// Re-export the concrete implementations
pub use serial::{SerialConfig, SerialTransport};
pub use tcp::{DEFAULT_TELNET_PORT, TcpConfig, TcpTransport};
