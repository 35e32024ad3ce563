//! Line-by-line text upload with atomic replace.
//!
//! States: Validate → OpenRemote → StreamLines → Finalize. Every line goes
//! out as its own checked command, so the first echo mismatch or
//! interpreter error aborts the stream with nothing retried. In replace
//! mode the data lands in a temporary sibling file that is only renamed
//! over the destination after a fully successful stream.

use {
    crate::{
        error::Result,
        nodemcu,
        session::{Command, Session},
        transfer::{TextJob, UploadMode},
        transport::Transport,
    },
    log::{debug, info},
};

/// Upload a text job through the session.
///
/// `progress` is called after each accepted line with (lines sent, lines
/// total).
pub fn upload_text<T: Transport>(
    session: &mut Session<T>,
    job: &TextJob,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<()> {
    // Validate: nothing is sent unless the whole source fits.
    job.validate()?;

    let lines = job.payload_lines();
    let total = lines.len();

    // OpenRemote: append touches the destination directly; replace stages
    // into a sibling so the live file survives a failed stream.
    let target = match job.mode() {
        UploadMode::Append => job.dest().to_string(),
        UploadMode::Replace => format!("{}{}", job.dest(), nodemcu::TMP_SUFFIX),
    };
    let open = match job.mode() {
        UploadMode::Append => nodemcu::open_append(&target),
        UploadMode::Replace => nodemcu::open_write(&target),
    };

    info!("Uploading {total} lines to {}", job.dest());
    session.send(&Command::checked(open))?;

    // StreamLines
    for (index, line) in lines.iter().enumerate() {
        session.send(&Command::checked(nodemcu::write_line(line)))?;
        progress(index + 1, total);
    }

    // Finalize
    session.send(&Command::checked(nodemcu::flush()))?;
    session.send(&Command::checked(nodemcu::close()))?;

    if job.mode() == UploadMode::Replace {
        session.send(&Command::checked(nodemcu::remove(job.dest())))?;
        session.send(&Command::checked(nodemcu::rename(&target, job.dest())))?;
    }

    debug!("Upload of {} complete", job.dest());
    Ok(())
}
