//! Native serial ports (serialport)

use std::io::{self, Write};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{SerialHost, SerialLink};
use crate::error::{PrinterError, TransportResult};

/// Poll interval of an unbounded write
const UNBOUNDED_POLL: Duration = Duration::from_secs(1);

/// Serial access through the OS port enumeration
///
/// The configured path wins; otherwise the first enumerated port is used.
pub struct NativeSerialHost {
    port_path: Option<String>,
    io_timeout: Option<Duration>,
}

impl NativeSerialHost {
    pub fn new(port_path: Option<String>) -> Self {
        Self {
            port_path,
            io_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Port-level write timeout, `None` blocks until every byte is written
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }
}

#[async_trait]
impl SerialHost for NativeSerialHost {
    fn is_available(&self) -> bool {
        self.port_path.is_some()
            || serialport::available_ports()
                .map(|ports| !ports.is_empty())
                .unwrap_or(false)
    }

    #[instrument(skip(self))]
    async fn request_port(&self) -> TransportResult<Box<dyn SerialLink>> {
        let path = match &self.port_path {
            Some(path) => path.clone(),
            None => {
                let ports = serialport::available_ports().map_err(|e| {
                    PrinterError::CapabilityUnavailable(format!("Port enumeration: {}", e))
                })?;
                let first = ports.into_iter().next().ok_or_else(|| {
                    PrinterError::AccessDenied("No serial port available".to_string())
                })?;
                first.port_name
            }
        };
        debug!(port = %path, "Serial port requested");

        Ok(Box::new(NativeSerialLink {
            path,
            io_timeout: self.io_timeout,
            port: None,
        }))
    }
}

struct NativeSerialLink {
    path: String,
    io_timeout: Option<Duration>,
    port: Option<Box<dyn serialport::SerialPort>>,
}

#[async_trait]
impl SerialLink for NativeSerialLink {
    fn name(&self) -> &str {
        &self.path
    }

    async fn open(&mut self, baud_rate: u32) -> TransportResult<()> {
        let port = serialport::new(&self.path, baud_rate)
            .timeout(self.io_timeout.unwrap_or(UNBOUNDED_POLL))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    PrinterError::AccessDenied(format!("{}: {}", self.path, e))
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    PrinterError::AccessDenied(format!("{}: {}", self.path, e))
                }
                _ => PrinterError::HandshakeFailed(format!("{}: {}", self.path, e)),
            })?;
        self.port = Some(port);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        let mut port = self
            .port
            .take()
            .ok_or_else(|| PrinterError::TransferFailed("port not open".to_string()))?;
        let data = data.to_vec();
        let unbounded = self.io_timeout.is_none();

        // Blocking write; the port comes back with the result
        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = write_fully(port.as_mut(), &data, unbounded).and_then(|_| port.flush());
            (port, result)
        })
        .await
        .map_err(|e| PrinterError::TransferFailed(format!("Task join failed: {}", e)))?;

        self.port = Some(port);
        result.map_err(|e| PrinterError::TransferFailed(e.to_string()))
    }

    async fn close(&mut self) -> TransportResult<()> {
        // Dropping the handle closes the OS port
        self.port.take();
        Ok(())
    }
}

/// `write_all` that keeps waiting through port timeouts when `unbounded`
fn write_fully<W: Write + ?Sized>(
    port: &mut W,
    mut data: &[u8],
    unbounded: bool,
) -> io::Result<()> {
    while !data.is_empty() {
        match port.write(data) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "serial port accepted no bytes",
                ));
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if unbounded && e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts two bytes per call after `stalls` timed-out calls
    struct SlowPort {
        stalls: usize,
        written: Vec<u8>,
    }

    impl Write for SlowPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.stalls > 0 {
                self.stalls -= 1;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out"));
            }
            let n = buf.len().min(2);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unbounded_write_waits_through_timeouts() {
        let mut port = SlowPort {
            stalls: 3,
            written: Vec::new(),
        };
        write_fully(&mut port, b"RECEIPT\n", true).unwrap();
        assert_eq!(port.written, b"RECEIPT\n");
    }

    #[test]
    fn test_bounded_write_gives_up_on_timeout() {
        let mut port = SlowPort {
            stalls: 1,
            written: Vec::new(),
        };
        let err = write_fully(&mut port, b"RECEIPT\n", false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(port.written.is_empty());
    }

    #[test]
    fn test_disabled_timeout_reaches_the_link() {
        let host = NativeSerialHost::new(Some("/dev/ttyUSB0".into())).with_io_timeout(None);
        assert_eq!(host.io_timeout, None);
        assert!(host.is_available());
    }
}
