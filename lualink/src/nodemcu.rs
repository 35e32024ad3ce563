//! The NodeMCU shell vocabulary.
//!
//! Every Lua line the host sends to the device is built here, next to the
//! fixed characters of the shell contract: the prompt byte the interpreter
//! prints when idle, the prefix of its own error messages, and the line
//! budget imposed by its UART receive buffer.

/// The byte the shell prints when idle and ready for the next command.
pub const PROMPT: u8 = b'>';

/// Prefix of error messages produced by the remote interpreter.
pub const ERROR_TAG: &str = "lua:";

/// Line terminator the shell expects from the host.
pub const LINE_TERMINATOR: u8 = b'\r';

/// Maximum byte length of a text-mode source line.
///
/// The device's UART receive buffer holds 256 bytes; the remainder is
/// headroom for the `file.writeline` wrapping around each line.
pub const MAX_LINE_BYTES: usize = 230;

/// Prefix marking a Lua comment line, skipped by the strip policy.
pub const COMMENT_PREFIX: &str = "--";

/// Suffix appended to the destination name for the replace-mode temporary.
pub const TMP_SUFFIX: &str = ".tmp";

/// Open `name` for writing, truncating any previous content.
pub fn open_write(name: &str) -> String {
    format!("file.open(\"{name}\", \"w+\")")
}

/// Open `name` for appending.
pub fn open_append(name: &str) -> String {
    format!("file.open(\"{name}\", \"a+\")")
}

/// Probe whether `name` can be opened for reading.
///
/// The leading `=` makes the shell print the result: literally `true` when
/// the file opened, `nil` when it does not exist.
pub fn open_read_probe(name: &str) -> String {
    format!("=file.open('{name}', 'r')")
}

/// Append one literal line to the currently open file.
///
/// The long-bracket quoting keeps quotes and escapes in the payload intact.
pub fn write_line(line: &str) -> String {
    format!("file.writeline([==[{line}]==])")
}

/// Flush the currently open file.
pub fn flush() -> String {
    "file.flush()".into()
}

/// Close the currently open file.
pub fn close() -> String {
    "file.close()".into()
}

/// Remove `name` from the device filesystem.
pub fn remove(name: &str) -> String {
    format!("file.remove(\"{name}\")")
}

/// Rename `from` to `to` on the device filesystem.
pub fn rename(from: &str, to: &str) -> String {
    format!("file.rename(\"{from}\", \"{to}\")")
}

/// Print the open file line by line until exhausted, then close it.
pub fn stream_lines() -> String {
    "local l; repeat l = file.readline(); print(l) until l == nil;file.close()".into()
}

/// Print every stored filename with its size.
///
/// The separator tab goes out verbatim; the trailing newline is a Lua
/// escape so the device, not the host, expands it.
pub fn list_names_and_sizes() -> String {
    "local l = file.list();for k,v in pairs(l) do print(k..'\t'..v..'\\n') end".into()
}

/// Print every stored filename, one per line.
pub fn list_names() -> String {
    "local l = file.list();for k,v in pairs(l) do print(k)end".into()
}

/// Print the module's numeric chip identifier.
pub fn chip_id() -> String {
    "=node.chipid()".into()
}

/// Compile `name` to bytecode (`.lc`) on the device.
pub fn compile(name: &str) -> String {
    format!("node.compile(\"{name}\")")
}

/// Execute the stored script `name`.
pub fn dofile(name: &str) -> String {
    format!("dofile(\"{name}\")")
}

/// Restart the module.
pub fn restart() -> String {
    "node.restart()".into()
}

/// Authorization comment line admitting the session on guarded bridges.
pub fn auth_comment(tag: &str) -> String {
    format!("-- {tag}")
}

/// Open `name` and turn the connection into a raw byte sink.
///
/// Silences interpreter output, relays every received chunk straight into
/// the open file, and installs a disconnection hook that flushes and closes
/// it once the host drops the connection.
pub fn binary_sink(name: &str, append: bool) -> String {
    let open = if append {
        open_append(name)
    } else {
        open_write(name)
    };
    format!(
        "{open} node.output(nil) \
         sv_conn:on(\"receive\", function(c,d) file.write(d) end) \
         sv_conn:on(\"disconnection\", function(c) file.flush() file.close() end)"
    )
}

/// The name `compile` produces for a given source name.
pub fn compiled_name(name: &str) -> String {
    match name.strip_suffix(".lua") {
        Some(stem) => format!("{stem}.lc"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_line_long_bracket_quoting() {
        assert_eq!(
            write_line("print(\"hi\")"),
            "file.writeline([==[print(\"hi\")]==])"
        );
    }

    #[test]
    fn test_open_commands() {
        assert_eq!(open_write("init.lua"), "file.open(\"init.lua\", \"w+\")");
        assert_eq!(open_append("log.txt"), "file.open(\"log.txt\", \"a+\")");
        assert_eq!(open_read_probe("init.lua"), "=file.open('init.lua', 'r')");
    }

    #[test]
    fn test_rename_and_remove() {
        assert_eq!(remove("a.lua"), "file.remove(\"a.lua\")");
        assert_eq!(
            rename("a.lua.tmp", "a.lua"),
            "file.rename(\"a.lua.tmp\", \"a.lua\")"
        );
    }

    #[test]
    fn test_compiled_name() {
        assert_eq!(compiled_name("init.lua"), "init.lc");
        assert_eq!(compiled_name("data.txt"), "data.txt");
    }

    #[test]
    fn test_binary_sink_mode() {
        let sink = binary_sink("blob.bin", false);
        assert!(sink.starts_with("file.open(\"blob.bin\", \"w+\")"));
        assert!(sink.contains("sv_conn:on(\"receive\""));
        assert!(sink.contains("sv_conn:on(\"disconnection\""));

        let sink = binary_sink("blob.bin", true);
        assert!(sink.starts_with("file.open(\"blob.bin\", \"a+\")"));
    }

    #[test]
    fn test_listing_separators() {
        // Literal tab between name and size; newline left to the device.
        assert!(list_names_and_sizes().contains("'\t'"));
        assert!(list_names_and_sizes().contains("'\\n'"));
    }
}
