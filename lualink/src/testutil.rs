//! In-memory transport doubles for protocol tests.
//!
//! Unlike a plain `Cursor`, the fake keeps reads and writes independent and
//! can play the device's side of the shell contract: echo each received
//! line, then print the prompt.

use {
    crate::{error::Result, transport::Transport},
    std::{
        collections::{HashMap, VecDeque},
        time::Instant,
    },
};

/// A scripted in-memory device shell.
pub(crate) struct FakeShell {
    rx: VecDeque<u8>,
    pending: Vec<u8>,
    /// Every complete CR-terminated line the host has sent, in order.
    pub lines: Vec<String>,
    /// Every `write_all` call, verbatim.
    pub writes: Vec<Vec<u8>>,
    /// Timestamp of every `write_all` call.
    pub write_times: Vec<Instant>,
    /// When set, each received line is answered with its own echo, CRLF,
    /// and a prompt.
    pub echo: bool,
    /// Replaces the automatic response for the n-th received line
    /// (0-based). Applies whether or not `echo` is on.
    pub responses: HashMap<usize, Vec<u8>>,
    /// Whether `close` has been called.
    pub closed: bool,
}

impl FakeShell {
    /// A quiet shell: nothing to read unless scripted.
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            pending: Vec::new(),
            lines: Vec::new(),
            writes: Vec::new(),
            write_times: Vec::new(),
            echo: false,
            responses: HashMap::new(),
            closed: false,
        }
    }

    /// A well-behaved shell that echoes every line and prompts.
    pub fn echoing() -> Self {
        let mut shell = Self::new();
        shell.echo = true;
        shell
    }

    /// Queue bytes for the host to read.
    pub fn push_response(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Script the response to the n-th line instead of the normal echo.
    pub fn respond_to_line(&mut self, index: usize, bytes: &[u8]) {
        self.responses.insert(index, bytes.to_vec());
    }
}

impl Transport for FakeShell {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.rx.pop_front() {
            Some(b) => {
                buf[0] = b;
                Ok(1)
            },
            None => Ok(0),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writes.push(bytes.to_vec());
        self.write_times.push(Instant::now());

        for &b in bytes {
            if b == b'\r' {
                let line = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();

                let index = self.lines.len();
                self.lines.push(line.clone());

                if let Some(response) = self.responses.remove(&index) {
                    self.rx.extend(response);
                } else if self.echo {
                    self.rx.extend(line.as_bytes());
                    self.rx.extend(b"\r\n> ");
                }
            } else {
                self.pending.push(b);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}
