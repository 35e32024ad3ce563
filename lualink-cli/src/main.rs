//! lualink CLI - transfer Lua scripts to NodeMCU modules.
//!
//! Talks to the module's interactive shell over a serial port or a telnet
//! bridge, uploading and fetching files through the echo-verified protocol
//! implemented by the `lualink` library.

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use lualink::{
    BinaryConfig, SERIAL_WRITE_SETTLE, SerialConfig, SerialTransport, Session, SessionConfig,
    TcpConfig, TcpTransport, TextJob, Transport, UploadMode, download, nodemcu, ops,
    upload_binary, upload_text,
};
use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod serial;

use config::Config;

/// lualink - upload and fetch Lua scripts on NodeMCU modules.
///
/// Environment variables:
///   LUALINK_PORT              - Default serial port
///   LUALINK_BAUD              - Default baud rate (default: 9600)
///   LUALINK_IP                - Telnet bridge endpoint (HOST[:PORT])
///   LUALINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "lualink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "For more information, visit: https://github.com/lualink/lualink")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "LUALINK_PORT")]
    port: Option<String>,

    /// Baud rate of the module's console UART (default: 9600).
    #[arg(short, long, global = true, env = "LUALINK_BAUD")]
    baud: Option<u32>,

    /// Connect to a telnet bridge on the module instead of a serial port.
    #[arg(
        long,
        global = true,
        env = "LUALINK_IP",
        value_name = "HOST[:PORT]",
        conflicts_with = "port"
    )]
    ip: Option<String>,

    /// Pulse the serial control lines on open to reset the module first.
    #[arg(long, global = true)]
    hard_reset: bool,

    /// Pre-shared authorization tag, sent as a leading comment line.
    #[arg(long, global = true, value_name = "TAG")]
    auth: Option<String>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "LUALINK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Upload a script to the module.
    Upload {
        /// Source file on the computer.
        src: PathBuf,

        /// Destination name on the module (defaults to the source file name).
        #[arg(short = 't', long)]
        dest: Option<String>,

        /// Append to the destination instead of replacing it.
        #[arg(short, long)]
        append: bool,

        /// Stream raw bytes (needs the telnet bridge's byte sink).
        #[arg(short = 'B', long)]
        binary: bool,

        /// Drop blank lines and comment lines before sending.
        #[arg(long)]
        strip: bool,

        /// Compile to bytecode after upload and drop the source.
        #[arg(short, long, conflicts_with = "binary")]
        compile: bool,

        /// Run the uploaded script afterwards.
        #[arg(short, long, conflicts_with = "binary")]
        run: bool,

        /// Restart the module afterwards.
        #[arg(long, conflicts_with = "binary")]
        restart: bool,
    },

    /// Fetch a file from the module.
    Get {
        /// File name on the module.
        name: String,

        /// Write to a local file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the files stored on the module.
    List,

    /// Query the module's chip id.
    Id,

    /// Delete one file from the module.
    Delete {
        /// File name on the module.
        name: String,
    },

    /// Delete every file stored on the module.
    Wipe {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Send one line to the interpreter and print its response.
    Exec {
        /// The line to evaluate.
        command: String,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "lualink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Upload {
            src,
            dest,
            append,
            binary,
            strip,
            compile,
            run,
            restart,
        } => cmd_upload(
            &cli,
            &config,
            UploadArgs {
                src,
                dest: dest.as_deref(),
                append: *append,
                binary: *binary,
                strip: *strip,
                compile: *compile,
                run: *run,
                restart: *restart,
            },
        ),
        Commands::Get { name, output } => cmd_get(&cli, &config, name, output.as_deref()),
        Commands::List => cmd_list(&cli, &config),
        Commands::Id => cmd_id(&cli, &config),
        Commands::Delete { name } => cmd_delete(&cli, &config, name),
        Commands::Wipe { yes } => cmd_wipe(&cli, &config, *yes),
        Commands::Exec { command } => cmd_exec(&cli, &config, command),
        Commands::ListPorts { json } => {
            cmd_list_ports(*json);
            Ok(())
        },
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Open the configured transport and wrap it into a session.
fn open_session(cli: &Cli, config: &Config) -> Result<Session<Box<dyn Transport>>> {
    let (transport, settle): (Box<dyn Transport>, Duration) =
        if let Some(endpoint) = cli.ip.as_deref().or(config.connection.host.as_deref()) {
            let tcp = TcpConfig::parse(endpoint)?;
            let transport = TcpTransport::connect(&tcp)
                .with_context(|| format!("Could not connect to {endpoint}"))?;
            if !cli.quiet {
                eprintln!(
                    "{} Connected to {}",
                    style("🔌").cyan(),
                    style(transport.name()).green()
                );
            }
            (Box::new(transport), Duration::ZERO)
        } else {
            let port = serial::select_serial_port(
                cli.port.as_deref(),
                config.connection.port.as_deref(),
                cli.non_interactive,
            )?;
            let baud = cli
                .baud
                .or(config.connection.baud)
                .unwrap_or(lualink::transport::serial::DEFAULT_BAUD);
            if !cli.quiet {
                eprintln!(
                    "{} Using {} at {} baud",
                    style("🔌").cyan(),
                    style(&port).green(),
                    baud
                );
            }
            let serial_config = SerialConfig::new(port.as_str(), baud).with_hard_reset(cli.hard_reset);
            let transport = SerialTransport::open(&serial_config)
                .with_context(|| format!("Could not open serial port {port}"))?;
            (Box::new(transport), SERIAL_WRITE_SETTLE)
        };

    let session_config = SessionConfig::default()
        .with_write_settle(settle)
        .with_verbose(cli.verbose > 0);
    let mut session = Session::new(transport, session_config);

    if let Some(tag) = &cli.auth {
        ops::authorize(&mut session, tag)?;
    }

    Ok(session)
}

/// Run `f` against a fresh session, closing the transport on every exit
/// path.
fn with_session<F>(cli: &Cli, config: &Config, f: F) -> Result<()>
where
    F: FnOnce(&mut Session<Box<dyn Transport>>) -> Result<()>,
{
    let mut session = open_session(cli, config)?;
    let result = f(&mut session);
    if let Err(e) = session.close() {
        warn!("Failed to close connection: {e}");
    }
    result
}

/// Upload command arguments, bundled to keep the handler signature sane.
struct UploadArgs<'a> {
    src: &'a PathBuf,
    dest: Option<&'a str>,
    append: bool,
    binary: bool,
    strip: bool,
    compile: bool,
    run: bool,
    restart: bool,
}

/// Upload command implementation.
fn cmd_upload(cli: &Cli, config: &Config, args: UploadArgs<'_>) -> Result<()> {
    let dest = match args.dest {
        Some(d) => d.to_string(),
        None => args
            .src
            .file_name()
            .context("Source path has no file name")?
            .to_string_lossy()
            .into_owned(),
    };

    if args.binary {
        let data = fs::read(args.src)
            .with_context(|| format!("Could not open input file {}", args.src.display()))?;

        return with_session(cli, config, |session| {
            let pb = byte_progress(cli, data.len());
            let result = upload_binary(
                session,
                &data,
                &dest,
                args.append,
                &BinaryConfig::default(),
                &mut |sent, _| pb.set_position(sent as u64),
            );
            pb.finish_and_clear();
            result?;

            if !cli.quiet {
                eprintln!(
                    "{} Streamed {} bytes to {}",
                    style("✓").green(),
                    data.len(),
                    style(&dest).cyan()
                );
            }
            Ok(())
        });
    }

    let source = fs::read_to_string(args.src)
        .with_context(|| format!("Could not open input file {}", args.src.display()))?;
    let mode = if args.append {
        UploadMode::Append
    } else {
        UploadMode::Replace
    };
    let job = TextJob::new(&source, dest.as_str(), mode, args.strip);

    // Validate before the connection is even opened: a bad source never
    // sends a single command.
    job.validate()?;

    with_session(cli, config, |session| {
        let total = job.payload_lines().len();
        let pb = line_progress(cli, total);
        let result = upload_text(session, &job, &mut |sent, _| pb.set_position(sent as u64));
        pb.finish_and_clear();
        result?;

        if !cli.quiet {
            eprintln!(
                "{} Uploaded {} lines to {}",
                style("✓").green(),
                total,
                style(&dest).cyan()
            );
        }

        if args.compile {
            ops::compile_file(session, &dest)?;
        }
        if args.run {
            let name = if args.compile {
                nodemcu::compiled_name(&dest)
            } else {
                dest.clone()
            };
            ops::run_file(session, &name)?;
        }
        if args.restart {
            ops::restart(session)?;
        }
        Ok(())
    })
}

/// Get command implementation.
fn cmd_get(cli: &Cli, config: &Config, name: &str, output: Option<&std::path::Path>) -> Result<()> {
    with_session(cli, config, |session| {
        match output {
            Some(path) => {
                let file = fs::File::create(path)
                    .with_context(|| format!("Could not create {}", path.display()))?;
                let mut out = io::BufWriter::new(file);
                download(session, name, &mut out)?;
                out.flush()?;
            },
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                download(session, name, &mut out)?;
                out.flush()?;
            },
        }
        Ok(())
    })
}

/// List command implementation.
fn cmd_list(cli: &Cli, config: &Config) -> Result<()> {
    with_session(cli, config, |session| {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        ops::list(session, &mut out)?;
        out.flush()?;
        Ok(())
    })
}

/// Id command implementation.
fn cmd_id(cli: &Cli, config: &Config) -> Result<()> {
    with_session(cli, config, |session| {
        let id = ops::identify(session)?;
        println!("{id}");
        Ok(())
    })
}

/// Delete command implementation.
fn cmd_delete(cli: &Cli, config: &Config, name: &str) -> Result<()> {
    with_session(cli, config, |session| {
        ops::delete_file(session, name)?;
        if !cli.quiet {
            eprintln!("{} Removed {}", style("✓").green(), style(name).cyan());
        }
        Ok(())
    })
}

/// Wipe command implementation.
fn cmd_wipe(cli: &Cli, config: &Config, yes: bool) -> Result<()> {
    if !yes {
        if cli.non_interactive {
            bail!("Refusing to wipe without --yes in non-interactive mode");
        }
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Delete every file stored on the module?")
            .default(false)
            .interact_opt()?
            .unwrap_or(false);
        if !confirmed {
            bail!("Wipe cancelled");
        }
    }

    with_session(cli, config, |session| {
        let removed = ops::wipe(session)?;
        if !cli.quiet {
            eprintln!(
                "{} Removed {} file(s)",
                style("✓").green(),
                removed.len()
            );
        }
        Ok(())
    })
}

/// Exec command implementation.
fn cmd_exec(cli: &Cli, config: &Config, command: &str) -> Result<()> {
    with_session(cli, config, |session| {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        ops::execute(session, command, &mut out)?;
        out.flush()?;
        Ok(())
    })
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) {
    let detected = serial::discover_ports();

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial_number,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&ports).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());
    if detected.is_empty() {
        eprintln!("  {}", style("none found").dim());
    } else {
        for port in &detected {
            eprintln!("  {} {}", style("•").green(), port.label());
        }
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

/// Progress bar counting uploaded lines.
fn line_progress(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !console::Term::stderr().is_term() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} lines")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    }
}

/// Progress bar counting streamed bytes.
fn byte_progress(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !console::Term::stderr().is_term() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    }
}
