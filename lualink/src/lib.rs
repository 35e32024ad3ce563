//! # lualink
//!
//! A library for transferring Lua scripts to NodeMCU modules.
//!
//! The remote side is not a file-transfer server: it is the interpreter's
//! interactive shell, reached over a serial UART or a telnet bridge. The
//! shell echoes every received line and prints a `>` prompt when idle, and
//! this crate builds a reliable, byte-exact transfer protocol on top of
//! exactly those two habits:
//!
//! - A [`Transport`](transport::Transport) abstraction over the serial and
//!   TCP connection kinds
//! - A [`Session`](session::Session) implementing echo verification:
//!   send one line, insist the device echoed it back, surface interpreter
//!   errors and desynchronization as distinct failures
//! - Text upload with atomic replace-on-success, open-loop binary
//!   streaming, and a heuristic-EOF download
//! - Directory operations: list, identify, delete, wipe
//!
//! ## Example
//!
//! ```rust,no_run
//! use lualink::{
//!     session::{Session, SessionConfig, SERIAL_WRITE_SETTLE},
//!     transfer::{text::upload_text, TextJob, UploadMode},
//!     transport::{SerialConfig, SerialTransport},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let config = SessionConfig::default().with_write_settle(SERIAL_WRITE_SETTLE);
//!     let mut session = Session::new(transport, config);
//!
//!     let source = std::fs::read_to_string("init.lua")?;
//!     let job = TextJob::new(&source, "init.lua", UploadMode::Replace, false);
//!     let result = upload_text(&mut session, &job, &mut |sent, total| {
//!         println!("{sent}/{total}");
//!     });
//!
//!     session.close()?;
//!     result?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod nodemcu;
pub mod ops;
pub mod session;
pub mod transfer;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenience
pub use {
    error::{Error, Result},
    session::{Command, SERIAL_WRITE_SETTLE, Session, SessionConfig},
    transfer::{
        TextJob, UploadMode, binary::BinaryConfig, binary::upload_binary, download::download,
        text::upload_text,
    },
    transport::{
        DEFAULT_TELNET_PORT, SerialConfig, SerialTransport, TcpConfig, TcpTransport, Transport,
    },
};
