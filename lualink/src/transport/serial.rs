//! Serial transport implementation using the `serialport` crate.

use {
    crate::{error::Result, transport::Transport},
    log::{debug, trace},
    serialport::ClearBuffer,
    std::{io::Read, thread, time::Duration},
};

/// Default baud rate of the module's console UART.
pub const DEFAULT_BAUD: u32 = 9600;

/// Default blocking read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// How long the reset line is held asserted during a hardware reset.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// How long the boot-select line is held after the reset pulse.
const BOOT_HOLD: Duration = Duration::from_millis(50);

/// How long the module is given to boot before the banner is drained.
const BOOT_SETTLE: Duration = Duration::from_millis(500);

/// Read timeout used while draining the boot banner.
const BANNER_TIMEOUT: Duration = Duration::from_millis(200);

/// Serial connection configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port: String,
    /// Baud rate.
    pub baud: u32,
    /// Blocking read timeout.
    pub timeout: Duration,
    /// Pulse the control lines on open to force the module into its normal
    /// run mode, then discard the boot banner.
    pub hard_reset: bool,
}

impl SerialConfig {
    /// Create a configuration with port name and baud rate, defaults for
    /// the rest.
    pub fn new(port: impl Into<String>, baud: u32) -> Self {
        Self {
            port: port.into(),
            baud,
            timeout: DEFAULT_TIMEOUT,
            hard_reset: false,
        }
    }

    /// Enable or disable the hardware reset on open.
    #[must_use]
    pub fn with_hard_reset(mut self, hard_reset: bool) -> Self {
        self.hard_reset = hard_reset;
        self
    }
}

/// Serial transport.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
}

impl SerialTransport {
    /// Open the serial device described by `config`.
    ///
    /// Performs the hardware reset sequence when requested. A port that
    /// cannot be opened is a fatal error reported to the caller.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud)
            .timeout(config.timeout)
            .open()?;

        let mut transport = Self {
            port: Some(port),
            name: config.port.clone(),
            timeout: config.timeout,
        };

        if config.hard_reset {
            transport.hard_reset()?;
        }

        Ok(transport)
    }

    /// Force the module into its normal run mode.
    ///
    /// RTS is wired to the module's reset input and DTR to the boot-select
    /// pin: pulse RTS with DTR released so the module does not enter its
    /// flash bootloader, hold DTR briefly, then let it boot and throw away
    /// the banner.
    fn hard_reset(&mut self) -> Result<()> {
        debug!("Hardware reset on {}", self.name);
        if let Some(ref mut p) = self.port {
            p.write_data_terminal_ready(false)?;
            p.write_request_to_send(true)?;
            thread::sleep(RESET_PULSE);
            p.write_request_to_send(false)?;
            p.write_data_terminal_ready(true)?;
            thread::sleep(BOOT_HOLD);
            p.write_data_terminal_ready(false)?;
        }
        thread::sleep(BOOT_SETTLE);
        self.drain_banner()
    }

    /// Read and discard the boot banner until the line goes quiet.
    fn drain_banner(&mut self) -> Result<()> {
        let Some(ref mut p) = self.port else {
            return Ok(());
        };
        p.set_timeout(BANNER_TIMEOUT)?;

        let mut discarded = 0usize;
        let mut buf = [0u8; 64];
        loop {
            match p.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => {
                    p.set_timeout(self.timeout)?;
                    return Err(e.into());
                },
            }
        }

        p.set_timeout(self.timeout)?;
        trace!("Discarded {discarded} banner bytes");
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.as_mut() {
            Some(p) => match p.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(e.into()),
            },
            None => Ok(0),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if let Some(ref mut p) = self.port {
            std::io::Write::write_all(p, buf)?;
            std::io::Write::flush(p)?;
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        if let Some(ref mut p) = self.port {
            if p.bytes_to_read()? > 0 {
                p.clear(ClearBuffer::Input)?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Take ownership of the port and let it drop (close)
        self.port.take();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyUSB0", DEFAULT_BAUD);
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud, 9600);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.hard_reset);
    }

    #[test]
    fn test_serial_config_with_hard_reset() {
        let config = SerialConfig::new("COM3", 115200).with_hard_reset(true);
        assert!(config.hard_reset);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = SerialConfig::new("/dev/lualink-does-not-exist", 9600);
        assert!(SerialTransport::open(&config).is_err());
    }
}
