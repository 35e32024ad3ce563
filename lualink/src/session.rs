//! The echo-verification protocol.
//!
//! The device side is not a file-transfer server, it is an interactive
//! read-eval-print loop: it echoes every received line and prints a single
//! prompt byte when idle. Those two habits are the only acknowledgement
//! mechanism available, so a [`Session`] turns them into a request/response
//! channel: write one terminated line, then read the response byte by byte
//! and insist that the device echoed the exact command text before
//! anything else is sent. At most one command is ever in flight; nothing is
//! pipelined and nothing is retried.

use {
    crate::{
        error::{Error, Result},
        nodemcu,
        transport::Transport,
    },
    log::{debug, trace},
    std::{thread, time::Duration},
};

/// Post-write settle used for serial connections.
///
/// The UART side needs a moment between the host's write and the echo
/// becoming available; sockets deliver back-to-back and use zero.
pub const SERIAL_WRITE_SETTLE: Duration = Duration::from_millis(300);

/// One line of text to send, with its verification policy.
#[derive(Debug, Clone)]
pub struct Command {
    text: String,
    expected: Option<String>,
    check: bool,
}

impl Command {
    /// A command whose echo must come back verbatim before the protocol
    /// proceeds.
    pub fn checked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expected: None,
            check: true,
        }
    }

    /// A command that is written and not verified.
    ///
    /// Used when the response is consumed by a purpose-specific reader
    /// (listing, download) or when no deterministic echo exists (binary
    /// sink setup, execute-and-stream).
    pub fn unchecked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expected: None,
            check: false,
        }
    }

    /// Override the expected echo (defaults to the command text itself).
    #[must_use]
    pub fn expecting(mut self, echo: impl Into<String>) -> Self {
        self.expected = Some(echo.into());
        self
    }

    /// The line of text to send, without terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The echo this command expects back.
    pub fn expected(&self) -> &str {
        self.expected.as_deref().unwrap_or(&self.text)
    }

    /// Whether echo verification is required.
    pub fn is_checked(&self) -> bool {
        self.check
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Line terminator appended to every outgoing command.
    pub line_terminator: u8,
    /// Fixed delay after each command write, before the response is read.
    pub write_settle: Duration,
    /// Log each command and echo at debug level instead of trace.
    pub verbose: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            line_terminator: nodemcu::LINE_TERMINATOR,
            write_settle: Duration::ZERO,
            verbose: false,
        }
    }
}

impl SessionConfig {
    /// Set the post-write settle delay.
    #[must_use]
    pub fn with_write_settle(mut self, settle: Duration) -> Self {
        self.write_settle = settle;
        self
    }

    /// Set verbose logging.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// One terminator-delimited read from the device.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineRead {
    /// A line of accumulated bytes.
    Line {
        /// Content before the terminator, lossily decoded.
        text: String,
        /// The terminator byte that ended the line.
        terminator: u8,
        /// Whether the terminator byte was immediately repeated. The
        /// repeat is consumed; any other following byte is held back for
        /// the next read.
        doubled: bool,
    },
    /// The prompt byte arrived; the device is idle.
    Prompt,
    /// The read timed out or the peer is gone. A partial line, if any, is
    /// discarded.
    Quiet,
}

/// Raw bytes accumulated up to the prompt (or until the line went quiet).
pub(crate) struct Drained {
    pub bytes: Vec<u8>,
    pub saw_prompt: bool,
}

/// A request/response session over one [`Transport`].
///
/// Owns the transport exclusively for the whole run; stateless between
/// calls apart from the configuration and a one-byte lookahead.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    pushback: Option<u8>,
}

impl<T: Transport> Session<T> {
    /// Create a session over an opened transport.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            pushback: None,
        }
    }

    /// The connection name of the underlying transport.
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send one command, verifying the echo when the command asks for it.
    pub fn send(&mut self, command: &Command) -> Result<()> {
        self.transport.clear_input()?;

        if self.config.verbose {
            debug!("-> {}", command.text());
        } else {
            trace!("-> {}", command.text());
        }

        let mut frame = Vec::with_capacity(command.text().len() + 1);
        frame.extend_from_slice(command.text().as_bytes());
        frame.push(self.config.line_terminator);
        self.transport.write_all(&frame)?;

        if !self.config.write_settle.is_zero() {
            thread::sleep(self.config.write_settle);
        }

        if command.is_checked() {
            self.verify_echo(command.expected())
        } else {
            trace!("   (sent without check)");
            Ok(())
        }
    }

    /// Write raw bytes with no terminator and no verification.
    ///
    /// Only the binary streaming path uses this.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write_all(bytes)
    }

    /// Close the underlying transport. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Wait for the device to accept the command it was just sent.
    ///
    /// Lines are classified one at a time: the expected echo is consumed
    /// silently, a line carrying the interpreter's error tag aborts with
    /// the remote message, and anything else is a desynchronization. The
    /// prompt byte ends the wait; a quiet read while still waiting is
    /// itself fatal.
    fn verify_echo(&mut self, expected: &str) -> Result<()> {
        loop {
            match self.read_line(true)? {
                LineRead::Prompt => return Ok(()),
                LineRead::Quiet => return Err(Error::NoAnswer),
                LineRead::Line { text, .. } => {
                    if text.is_empty() {
                        continue;
                    }
                    let line = text.trim();
                    if line == expected {
                        if self.config.verbose {
                            debug!("<- ok");
                        } else {
                            trace!("<- ok");
                        }
                        continue;
                    }
                    if line.starts_with(nodemcu::ERROR_TAG) {
                        return Err(Error::Interpreter(line.to_string()));
                    }
                    return Err(Error::EchoMismatch {
                        expected: expected.to_string(),
                        actual: line.to_string(),
                    });
                },
            }
        }
    }

    /// Read one byte, honoring the lookahead slot. `None` means the read
    /// timed out or the peer is gone.
    pub(crate) fn read_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pushback.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        let n = self.transport.read(&mut buf)?;
        Ok(if n == 0 { None } else { Some(buf[0]) })
    }

    /// Read one terminator-delimited line.
    ///
    /// This is the shared accumulation loop behind echo verification, the
    /// wipe capture, and the download stream. After a terminator the next
    /// byte is peeked to detect the device's doubled-terminator pattern;
    /// when it is not a repeat it is pushed back for the next read. With
    /// `prompt_ends` set, the prompt byte ends the read wherever it
    /// appears (discarding any partial line, as the shell never embeds it
    /// in its own output); without it, prompt bytes are ordinary content.
    pub(crate) fn read_line(&mut self, prompt_ends: bool) -> Result<LineRead> {
        let mut buf: Vec<u8> = Vec::new();
        loop {
            let Some(b) = self.read_byte()? else {
                return Ok(LineRead::Quiet);
            };
            if prompt_ends && b == nodemcu::PROMPT {
                return Ok(LineRead::Prompt);
            }
            if b == b'\r' || b == b'\n' {
                let doubled = match self.read_byte()? {
                    Some(next) if next == b => true,
                    Some(next) => {
                        self.pushback = Some(next);
                        false
                    },
                    None => false,
                };
                return Ok(LineRead::Line {
                    text: String::from_utf8_lossy(&buf).into_owned(),
                    terminator: b,
                    doubled,
                });
            }
            buf.push(b);
        }
    }

    /// Accumulate raw response bytes until the prompt byte or a quiet read.
    pub(crate) fn drain_until_prompt(&mut self) -> Result<Drained> {
        let mut bytes = Vec::new();
        loop {
            match self.read_byte()? {
                None => {
                    return Ok(Drained {
                        bytes,
                        saw_prompt: false,
                    });
                },
                Some(b) if b == nodemcu::PROMPT => {
                    return Ok(Drained {
                        bytes,
                        saw_prompt: true,
                    });
                },
                Some(b) => bytes.push(b),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeShell;

    fn session(shell: FakeShell) -> Session<FakeShell> {
        Session::new(shell, SessionConfig::default())
    }

    #[test]
    fn test_checked_command_accepts_exact_echo() {
        let shell = FakeShell::echoing();
        let mut session = session(shell);

        session
            .send(&Command::checked("file.flush()"))
            .expect("exact echo should be accepted");
    }

    #[test]
    fn test_checked_command_rejects_mismatched_echo() {
        let mut shell = FakeShell::new();
        shell.push_response(b"stack traceback\r\n> ");
        let mut session = session(shell);

        let err = session.send(&Command::checked("file.flush()")).unwrap_err();
        match err {
            Error::EchoMismatch { expected, actual } => {
                assert_eq!(expected, "file.flush()");
                assert_eq!(actual, "stack traceback");
            },
            other => panic!("expected EchoMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_interpreter_error_is_surfaced_verbatim() {
        let mut shell = FakeShell::new();
        shell.push_response(b"lua: cannot open init.lua\r\n> ");
        let mut session = session(shell);

        let err = session.send(&Command::checked("dofile(\"x\")")).unwrap_err();
        match err {
            Error::Interpreter(msg) => assert_eq!(msg, "lua: cannot open init.lua"),
            other => panic!("expected Interpreter, got {other:?}"),
        }
    }

    #[test]
    fn test_silence_is_no_answer() {
        let shell = FakeShell::new();
        let mut session = session(shell);

        let err = session.send(&Command::checked("file.flush()")).unwrap_err();
        assert!(matches!(err, Error::NoAnswer));
    }

    #[test]
    fn test_unchecked_command_reads_nothing() {
        let shell = FakeShell::new();
        let mut session = session(shell);

        // No scripted response, yet unchecked send succeeds.
        session.send(&Command::unchecked("node.restart()")).unwrap();
    }

    #[test]
    fn test_echo_is_trimmed_before_comparison() {
        let mut shell = FakeShell::new();
        shell.push_response(b"  file.close()  \r\n> ");
        let mut session = session(shell);

        session.send(&Command::checked("file.close()")).unwrap();
    }

    #[test]
    fn test_prompt_alone_ends_the_wait() {
        let mut shell = FakeShell::new();
        shell.push_response(b"> ");
        let mut session = session(shell);

        session.send(&Command::checked("file.close()")).unwrap();
    }

    #[test]
    fn test_expected_override() {
        let mut shell = FakeShell::new();
        shell.push_response(b"something else\r\n> ");
        let mut session = session(shell);

        session
            .send(&Command::checked("cmd").expecting("something else"))
            .unwrap();
    }

    #[test]
    fn test_read_line_doubled_terminator() {
        let mut shell = FakeShell::new();
        shell.push_response(b"abc\n\nrest");
        let mut session = session(shell);

        let line = session.read_line(false).unwrap();
        assert_eq!(
            line,
            LineRead::Line {
                text: "abc".into(),
                terminator: b'\n',
                doubled: true,
            }
        );
    }

    #[test]
    fn test_read_line_single_terminator_pushes_back() {
        let mut shell = FakeShell::new();
        shell.push_response(b"abc\nX");
        let mut session = session(shell);

        let line = session.read_line(false).unwrap();
        assert_eq!(
            line,
            LineRead::Line {
                text: "abc".into(),
                terminator: b'\n',
                doubled: false,
            }
        );
        // The lookahead byte is not lost.
        assert_eq!(session.read_byte().unwrap(), Some(b'X'));
    }

    #[test]
    fn test_read_line_prompt_mode() {
        let mut shell = FakeShell::new();
        shell.push_response(b"> ");
        let mut session = session(shell);

        assert_eq!(session.read_line(true).unwrap(), LineRead::Prompt);
    }

    #[test]
    fn test_read_line_prompt_is_content_when_disabled() {
        let mut shell = FakeShell::new();
        shell.push_response(b"a>b\n\n");
        let mut session = session(shell);

        let line = session.read_line(false).unwrap();
        assert_eq!(
            line,
            LineRead::Line {
                text: "a>b".into(),
                terminator: b'\n',
                doubled: true,
            }
        );
    }

    #[test]
    fn test_drain_until_prompt() {
        let mut shell = FakeShell::new();
        shell.push_response(b"true\r\n> ");
        let mut session = session(shell);

        let drained = session.drain_until_prompt().unwrap();
        assert_eq!(drained.bytes, b"true\r\n");
        assert!(drained.saw_prompt);
    }

    #[test]
    fn test_drain_without_prompt_reports_quiet() {
        let mut shell = FakeShell::new();
        shell.push_response(b"partial");
        let mut session = session(shell);

        let drained = session.drain_until_prompt().unwrap();
        assert_eq!(drained.bytes, b"partial");
        assert!(!drained.saw_prompt);
    }

    #[test]
    fn test_command_terminator_goes_on_the_wire() {
        let shell = FakeShell::echoing();
        let mut session = session(shell);
        session.send(&Command::checked("file.flush()")).unwrap();

        let writes = &session.transport().writes;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], b"file.flush()\r");
    }
}
