//! Unacknowledged binary streaming upload.
//!
//! States: ConfigureSink → Stream → Settle. One unchecked command turns the
//! device connection into a raw byte sink, then fixed-size chunks are
//! written with a fixed delay between them. There is no per-chunk
//! acknowledgement: correctness depends entirely on the chunk size and
//! delay being conservative relative to the device's buffer and write
//! speed, which makes this a best-effort transfer mode, not a guaranteed
//! one. The device-side sink flushes and closes the file when the host
//! drops the connection, so a binary upload is the last thing a run does.

use {
    crate::{
        error::Result,
        nodemcu,
        session::{Command, Session},
        transport::Transport,
    },
    log::{debug, info},
    std::{thread, time::Duration},
};

/// Binary streaming configuration.
#[derive(Debug, Clone)]
pub struct BinaryConfig {
    /// Maximum bytes per write.
    pub chunk_size: usize,
    /// Fixed delay between consecutive chunk writes.
    pub inter_chunk_delay: Duration,
    /// Delay after the sink command and again after the final chunk, giving
    /// the device-side relay time to drain.
    pub settle: Duration,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            inter_chunk_delay: Duration::from_millis(100),
            settle: Duration::from_secs(1),
        }
    }
}

/// Stream `data` into `dest` on the device.
///
/// `progress` is called after each chunk with (bytes sent, bytes total).
/// The destination may hold partial data if the transfer fails; binary
/// mode offers no replace-style atomicity.
pub fn upload_binary<T: Transport>(
    session: &mut Session<T>,
    data: &[u8],
    dest: &str,
    append: bool,
    config: &BinaryConfig,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<()> {
    info!("Streaming {} bytes to {dest}", data.len());

    // ConfigureSink: no deterministic echo exists once node output is
    // silenced, so this is written unchecked.
    session.send(&Command::unchecked(nodemcu::binary_sink(dest, append)))?;
    thread::sleep(config.settle);

    // Stream
    let total = data.len();
    let mut sent = 0usize;
    for chunk in data.chunks(config.chunk_size) {
        if sent > 0 {
            thread::sleep(config.inter_chunk_delay);
        }
        session.write_raw(chunk)?;
        sent += chunk.len();
        progress(sent, total);
    }

    // Settle: let the relay flush before the host closes the connection.
    thread::sleep(config.settle);
    debug!("Streamed {sent} bytes");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{session::SessionConfig, testutil::FakeShell};

    fn fast_config(chunk_size: usize) -> BinaryConfig {
        BinaryConfig {
            chunk_size,
            inter_chunk_delay: Duration::from_millis(10),
            settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_chunk_count_and_sizes() {
        let mut session = Session::new(FakeShell::new(), SessionConfig::default());
        let data = vec![0xAB; 10];

        upload_binary(
            &mut session,
            &data,
            "blob.bin",
            false,
            &fast_config(4),
            &mut |_, _| {},
        )
        .unwrap();

        // First write is the sink command, the rest are ceil(10/4) chunks.
        let writes = &session.transport().writes;
        assert_eq!(writes.len(), 1 + 3);
        assert_eq!(writes[1].len(), 4);
        assert_eq!(writes[2].len(), 4);
        assert_eq!(writes[3].len(), 2);
    }

    #[test]
    fn test_inter_chunk_delay_is_observed() {
        let mut session = Session::new(FakeShell::new(), SessionConfig::default());
        let data = vec![0x11; 12];

        upload_binary(
            &mut session,
            &data,
            "blob.bin",
            false,
            &fast_config(4),
            &mut |_, _| {},
        )
        .unwrap();

        let times = &session.transport().write_times;
        // Gaps between consecutive chunk writes (indices 1..) honor the delay.
        for pair in times[1..].windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(10));
        }
    }

    #[test]
    fn test_progress_reports_cumulative_bytes() {
        let mut session = Session::new(FakeShell::new(), SessionConfig::default());
        let data = vec![0x22; 9];

        let mut seen = Vec::new();
        upload_binary(
            &mut session,
            &data,
            "blob.bin",
            false,
            &fast_config(4),
            &mut |sent, total| seen.push((sent, total)),
        )
        .unwrap();

        assert_eq!(seen, vec![(4, 9), (8, 9), (9, 9)]);
    }

    #[test]
    fn test_append_sink() {
        let mut session = Session::new(FakeShell::new(), SessionConfig::default());

        upload_binary(
            &mut session,
            &[0x33; 2],
            "blob.bin",
            true,
            &fast_config(4),
            &mut |_, _| {},
        )
        .unwrap();

        assert!(session.transport().lines[0].starts_with("file.open(\"blob.bin\", \"a+\")"));
    }

    #[test]
    fn test_empty_input_writes_no_chunks() {
        let mut session = Session::new(FakeShell::new(), SessionConfig::default());

        upload_binary(
            &mut session,
            &[],
            "blob.bin",
            false,
            &fast_config(4),
            &mut |_, _| {},
        )
        .unwrap();

        // Only the sink command went out.
        assert_eq!(session.transport().writes.len(), 1);
    }
}
