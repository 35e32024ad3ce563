//! Directory operations and one-shot device commands.

use {
    crate::{
        error::Result,
        nodemcu,
        session::{Command, LineRead, Session},
        transport::Transport,
    },
    log::info,
    std::io::Write,
};

/// Print every stored filename and size to `out`.
///
/// The device's listing output is streamed verbatim until the prompt.
pub fn list<T: Transport, W: Write>(session: &mut Session<T>, out: &mut W) -> Result<()> {
    session.send(&Command::unchecked(nodemcu::list_names_and_sizes()))?;
    let drained = session.drain_until_prompt()?;
    out.write_all(&drained.bytes)?;
    Ok(())
}

/// Query the module's numeric chip identifier.
///
/// Only digit characters are kept from the response stream; everything
/// else (echo, line noise, whitespace) is discarded.
pub fn identify<T: Transport>(session: &mut Session<T>) -> Result<String> {
    session.send(&Command::unchecked(nodemcu::chip_id()))?;
    let drained = session.drain_until_prompt()?;
    Ok(drained
        .bytes
        .iter()
        .filter(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect())
}

/// Remove one named file from the device.
pub fn delete_file<T: Transport>(session: &mut Session<T>, name: &str) -> Result<()> {
    session.send(&Command::checked(nodemcu::remove(name)))
}

/// Delete every stored file.
///
/// Lists the filenames first, then issues one delete per name. The first
/// captured line is the echo of the listing command itself, not a
/// filename, and is skipped. Returns the names that were removed.
pub fn wipe<T: Transport>(session: &mut Session<T>) -> Result<Vec<String>> {
    session.send(&Command::unchecked(nodemcu::list_names()))?;

    let mut captured = Vec::new();
    loop {
        match session.read_line(true)? {
            LineRead::Prompt | LineRead::Quiet => break,
            LineRead::Line { text, .. } => {
                let name = text.trim();
                if !name.is_empty() {
                    captured.push(name.to_string());
                }
            },
        }
    }

    let names: Vec<String> = captured.into_iter().skip(1).collect();
    for name in &names {
        info!("Removing {name}");
        session.send(&Command::checked(nodemcu::remove(name)))?;
    }
    Ok(names)
}

/// Send an arbitrary line and stream the raw response to `out`.
pub fn execute<T: Transport, W: Write>(
    session: &mut Session<T>,
    command: &str,
    out: &mut W,
) -> Result<()> {
    session.send(&Command::unchecked(command))?;
    let drained = session.drain_until_prompt()?;
    out.write_all(&drained.bytes)?;
    out.write_all(b"\r\n")?;
    Ok(())
}

/// Compile an uploaded script to bytecode and drop the source.
pub fn compile_file<T: Transport>(session: &mut Session<T>, name: &str) -> Result<()> {
    info!("Compiling {name}");
    session.send(&Command::checked(nodemcu::compile(name)))?;
    session.send(&Command::checked(nodemcu::remove(name)))
}

/// Execute a stored script. Its output is not collected.
pub fn run_file<T: Transport>(session: &mut Session<T>, name: &str) -> Result<()> {
    info!("Running {name}");
    session.send(&Command::unchecked(nodemcu::dofile(name)))
}

/// Restart the module. No response is expected.
pub fn restart<T: Transport>(session: &mut Session<T>) -> Result<()> {
    info!("Restarting module");
    session.send(&Command::unchecked(nodemcu::restart()))
}

/// Send the pre-shared authorization tag as a leading comment line.
///
/// Guarded telnet bridges use the first received line to admit a session;
/// to the interpreter itself the line is a harmless comment.
pub fn authorize<T: Transport>(session: &mut Session<T>, tag: &str) -> Result<()> {
    session.send(&Command::unchecked(nodemcu::auth_comment(tag)))
}
