//! The three transfer state machines and their shared job types.

pub mod binary;
pub mod download;
pub mod text;

use crate::{
    error::{Error, Result},
    nodemcu,
};

/// What happens to an existing destination file during a text upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Write to a temporary sibling and rename it over the destination
    /// only after the stream completed; a failure mid-upload never touches
    /// the existing file.
    Replace,
    /// Append to the destination directly. No atomicity guarantee.
    Append,
}

/// A text upload: source lines, destination name, mode, and strip policy.
///
/// Constructed from a source artifact, consumed once, discarded after
/// completion.
#[derive(Debug, Clone)]
pub struct TextJob {
    lines: Vec<String>,
    dest: String,
    mode: UploadMode,
    strip: bool,
}

impl TextJob {
    /// Split `source` into lines for upload to `dest`.
    ///
    /// With `strip` set, blank lines and comment lines are dropped before
    /// sending.
    pub fn new(source: &str, dest: impl Into<String>, mode: UploadMode, strip: bool) -> Self {
        Self {
            lines: source.lines().map(String::from).collect(),
            dest: dest.into(),
            mode,
            strip,
        }
    }

    /// Destination name on the device.
    pub fn dest(&self) -> &str {
        &self.dest
    }

    /// Upload mode.
    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Check every source line against the device's line budget.
    ///
    /// Runs over the whole source before anything is sent, so either the
    /// entire transfer is attempted or none of it is.
    pub fn validate(&self) -> Result<()> {
        for (index, line) in self.lines.iter().enumerate() {
            if line.len() > nodemcu::MAX_LINE_BYTES {
                return Err(Error::LineTooLong {
                    line: index + 1,
                    length: line.len(),
                    limit: nodemcu::MAX_LINE_BYTES,
                });
            }
        }
        Ok(())
    }

    /// The lines that will actually be sent, trimmed, with the strip
    /// policy applied.
    pub fn payload_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| {
                if self.strip {
                    !line.is_empty() && !line.starts_with(nodemcu::COMMENT_PREFIX)
                } else {
                    true
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_lines_at_the_limit() {
        let line = "x".repeat(nodemcu::MAX_LINE_BYTES);
        let job = TextJob::new(&line, "a.lua", UploadMode::Replace, false);
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_over_limit_with_position() {
        let source = format!("ok\n{}\nok", "y".repeat(nodemcu::MAX_LINE_BYTES + 1));
        let job = TextJob::new(&source, "a.lua", UploadMode::Replace, false);
        match job.validate().unwrap_err() {
            Error::LineTooLong { line, length, limit } => {
                assert_eq!(line, 2);
                assert_eq!(length, nodemcu::MAX_LINE_BYTES + 1);
                assert_eq!(limit, nodemcu::MAX_LINE_BYTES);
            },
            other => panic!("expected LineTooLong, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_lines_are_trimmed() {
        let job = TextJob::new("  a = 1  \n\tb = 2", "a.lua", UploadMode::Replace, false);
        assert_eq!(job.payload_lines(), vec!["a = 1", "b = 2"]);
    }

    #[test]
    fn test_strip_drops_blanks_and_comments() {
        let source = "-- header\nprint(1)\n\n  -- indented comment\nprint(2)\n";
        let job = TextJob::new(source, "a.lua", UploadMode::Replace, true);
        assert_eq!(job.payload_lines(), vec!["print(1)", "print(2)"]);
    }

    #[test]
    fn test_without_strip_blanks_survive() {
        let source = "print(1)\n\n-- note\n";
        let job = TextJob::new(source, "a.lua", UploadMode::Replace, false);
        assert_eq!(job.payload_lines(), vec!["print(1)", "", "-- note"]);
    }
}
