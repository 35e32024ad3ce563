//! Serial port discovery and selection.
//!
//! Selection ladder: an explicitly given port always wins, then a port
//! from the configuration, then a single detected candidate is
//! auto-selected, and only when several remain is the user prompted.
//! Non-interactive mode never prompts; it fails instead.

use {
    anyhow::{Result, bail},
    console::style,
    dialoguer::{Select, theme::ColorfulTheme},
    log::{debug, info},
    std::io::IsTerminal,
};

/// A detected serial port.
#[derive(Debug, Clone)]
pub struct PortCandidate {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

impl PortCandidate {
    /// One-line label for listings and prompts.
    pub fn label(&self) -> String {
        let vid_pid = if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = self
            .product
            .as_ref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();
        format!("{}{vid_pid}{product}", self.name)
    }
}

/// List the serial ports visible on this host.
pub fn discover_ports() -> Vec<PortCandidate> {
    let ports = serialport::available_ports().unwrap_or_default();

    ports
        .into_iter()
        .map(|p| {
            let (vid, pid, manufacturer, product, serial_number) = match &p.port_type {
                serialport::SerialPortType::UsbPort(info) => (
                    Some(info.vid),
                    Some(info.pid),
                    info.manufacturer.clone(),
                    info.product.clone(),
                    info.serial_number.clone(),
                ),
                _ => (None, None, None, None, None),
            };

            PortCandidate {
                name: p.port_name,
                vid,
                pid,
                manufacturer,
                product,
                serial_number,
            }
        })
        .collect()
}

/// Resolve which serial port to use.
pub fn select_serial_port(
    explicit: Option<&str>,
    configured: Option<&str>,
    non_interactive: bool,
) -> Result<String> {
    if let Some(name) = explicit {
        return Ok(name.to_string());
    }
    if let Some(name) = configured {
        debug!("Using port from config: {name}");
        return Ok(name.to_string());
    }

    let candidates = discover_ports();
    match candidates.len() {
        0 => bail!("No serial ports found; specify one with --port or connect with --ip"),
        1 => {
            let name = candidates[0].name.clone();
            info!("Auto-selected port: {name}");
            Ok(name)
        },
        _ => {
            if non_interactive {
                bail!(
                    "Multiple serial ports found ({}); specify one with --port",
                    candidates
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            select_port_interactive(candidates)
        },
    }
}

/// Prompt for a port when several are plugged in.
fn select_port_interactive(candidates: Vec<PortCandidate>) -> Result<String> {
    if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        bail!("Multiple serial ports found and no terminal to choose from; use --port");
    }

    let labels: Vec<String> = candidates.iter().map(PortCandidate::label).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a serial port")
        .items(&labels)
        .default(0)
        .interact_opt()?;

    match selection {
        Some(index) => Ok(candidates[index].name.clone()),
        None => bail!("Port selection cancelled"),
    }
}
