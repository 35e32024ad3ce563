//! TCP transport for modules exposing their shell through a telnet bridge.

use {
    crate::{error::Result, transport::Transport},
    log::{debug, trace},
    std::{
        io::{ErrorKind, Read, Write},
        net::{Shutdown, TcpStream},
        time::Duration,
    },
};

/// Default port of the device-side telnet bridge.
pub const DEFAULT_TELNET_PORT: u16 = 23;

/// Default blocking read timeout for command traffic.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Read timeout used while discarding the greeting banner.
const GREETING_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on the greeting banner length.
const GREETING_LEN: usize = 50;

/// TCP connection configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Blocking read timeout for command traffic.
    pub timeout: Duration,
}

impl TcpConfig {
    /// Create a configuration with host and port, default timeout.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Parse a `host[:port]` endpoint, falling back to the default telnet
    /// port when none is given.
    pub fn parse(endpoint: &str) -> Result<Self> {
        match endpoint.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    crate::error::Error::Protocol(format!("Invalid port in endpoint {endpoint:?}"))
                })?;
                Ok(Self::new(host, port))
            },
            None => Ok(Self::new(endpoint, DEFAULT_TELNET_PORT)),
        }
    }
}

/// TCP transport.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    name: String,
}

impl TcpTransport {
    /// Connect to the device's telnet bridge.
    ///
    /// After connecting, up to [`GREETING_LEN`] bytes of greeting banner
    /// are read under a short timeout and discarded; a quiet connection is
    /// fine. Command traffic then runs under the configured timeout.
    pub fn connect(config: &TcpConfig) -> Result<Self> {
        let name = format!("{}:{}", config.host, config.port);
        debug!("Connecting to {name}");
        let mut stream = TcpStream::connect((config.host.as_str(), config.port))?;

        stream.set_read_timeout(Some(GREETING_TIMEOUT))?;
        let mut greeting = [0u8; GREETING_LEN];
        match stream.read(&mut greeting) {
            Ok(n) => trace!("Discarded {n} greeting bytes"),
            Err(e) if is_timeout(&e) => {},
            Err(e) => return Err(e.into()),
        }
        stream.set_read_timeout(Some(config.timeout))?;

        Ok(Self {
            stream: Some(stream),
            name,
        })
    }
}

/// Both `WouldBlock` and `TimedOut` mean the read deadline elapsed,
/// depending on platform.
fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.as_mut() {
            Some(s) => match s.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if is_timeout(&e) => Ok(0),
                Err(e) => Err(e.into()),
            },
            None => Ok(0),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if let Some(ref mut s) = self.stream {
            s.write_all(buf)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(s) = self.stream.take() {
            let _ = s.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
