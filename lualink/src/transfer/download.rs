//! Heuristic-EOF file download.
//!
//! States: OpenCheck → StreamOut. The device has no "send me that file"
//! primitive, so the host asks the interpreter to print the file line by
//! line and has to decide, from the raw character stream, where the file
//! ends.
//!
//! The device's `readline` keeps the line's own terminator, and the
//! `print` around it appends another, so every genuine content line
//! arrives with a doubled terminator. The final "no more lines" marker is
//! printed bare and arrives with a single one. The EOF rule is therefore:
//! a line whose terminator is immediately repeated is content (emitted
//! with one terminator); a line followed by anything else is the sentinel
//! artifact and is discarded.
//!
//! Known risk: a legitimately empty final line is indistinguishable from
//! the sentinel under this rule. The behavior is kept as-is because the
//! device's print/readline pairing is an external contract this tool can
//! only follow, not version.

use {
    crate::{
        error::{Error, Result},
        nodemcu,
        session::{Command, LineRead, Session},
        transport::Transport,
    },
    log::{debug, info},
    std::io::Write,
};

/// Fetch `name` from the device, writing its content to `out`.
///
/// Returns [`Error::NotFound`] when the device reports the file missing,
/// and [`Error::Protocol`] when the open probe yields anything but the
/// expected verdict.
pub fn download<T: Transport, W: Write>(
    session: &mut Session<T>,
    name: &str,
    out: &mut W,
) -> Result<()> {
    info!("Fetching {name}");

    // OpenCheck: the probe prints `true` or `nil`; read everything up to
    // the prompt and judge the trimmed reply.
    session.send(&Command::unchecked(nodemcu::open_read_probe(name)))?;
    let drained = session.drain_until_prompt()?;
    if drained.saw_prompt {
        // Consume the space the shell prints after its prompt.
        let _ = session.read_byte()?;
    }

    let reply = String::from_utf8_lossy(&drained.bytes);
    let reply = reply.trim();
    if reply == "nil" {
        return Err(Error::NotFound(name.to_string()));
    }
    if reply != "true" {
        return Err(Error::Protocol(format!(
            "Unexpected reply to open probe: {reply:?}"
        )));
    }

    // StreamOut: prompt bytes are ordinary content here; only the
    // terminator pattern decides where the stream ends.
    session.send(&Command::unchecked(nodemcu::stream_lines()))?;

    let mut emitted = 0usize;
    loop {
        match session.read_line(false)? {
            LineRead::Line {
                text,
                terminator,
                doubled: true,
            } => {
                out.write_all(text.as_bytes())?;
                out.write_all(&[terminator])?;
                emitted += 1;
            },
            // Single terminator: the accumulated line is the sentinel
            // artifact, not content.
            LineRead::Line { doubled: false, .. } => break,
            LineRead::Prompt | LineRead::Quiet => break,
        }
    }

    debug!("Fetched {emitted} lines from {name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{session::SessionConfig, testutil::FakeShell};

    fn session(shell: FakeShell) -> Session<FakeShell> {
        Session::new(shell, SessionConfig::default())
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let mut shell = FakeShell::new();
        shell.respond_to_line(0, b"nil\r\n> ");
        let mut session = session(shell);

        let mut out = Vec::new();
        let err = download(&mut session, "gone.lua", &mut out).unwrap_err();
        match err {
            Error::NotFound(name) => assert_eq!(name, "gone.lua"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_unexpected_probe_reply_is_protocol_error() {
        let mut shell = FakeShell::new();
        shell.respond_to_line(0, b"maybe\r\n> ");
        let mut session = session(shell);

        let mut out = Vec::new();
        let err = download(&mut session, "a.lua", &mut out).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_doubled_terminators_are_content_single_is_eof() {
        let mut shell = FakeShell::new();
        shell.respond_to_line(0, b"true\r\n> ");
        // Two content lines, then the sentinel with its single terminator.
        shell.respond_to_line(1, b"A\n\nB\n\nnil\n> ");
        let mut session = session(shell);

        let mut out = Vec::new();
        download(&mut session, "a.lua", &mut out).unwrap();
        assert_eq!(out, b"A\nB\n");
    }

    #[test]
    fn test_prompt_byte_inside_content_survives() {
        let mut shell = FakeShell::new();
        shell.respond_to_line(0, b"true\r\n> ");
        shell.respond_to_line(1, b"if a > b then\n\nnil\n> ");
        let mut session = session(shell);

        let mut out = Vec::new();
        download(&mut session, "a.lua", &mut out).unwrap();
        assert_eq!(out, b"if a > b then\n");
    }

    #[test]
    fn test_quiet_stream_ends_download() {
        let mut shell = FakeShell::new();
        shell.respond_to_line(0, b"true\r\n> ");
        shell.respond_to_line(1, b"only\n\n");
        let mut session = session(shell);

        let mut out = Vec::new();
        download(&mut session, "a.lua", &mut out).unwrap();
        assert_eq!(out, b"only\n");
    }
}
