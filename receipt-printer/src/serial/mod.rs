//! Serial transport
//!
//! No discovery: a port is requested at print time, opened at a fixed baud
//! rate, written, and closed again whatever the write outcome.

mod native;

pub use native::NativeSerialHost;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::driver::TransportDriver;
use crate::encoding::{TextEncoding, encode_content};
use crate::error::{PrinterError, TransportResult};
use crate::registry::Device;
use crate::types::{PrintResult, TransportKind};

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Platform serial access
#[async_trait]
pub trait SerialHost: Send + Sync {
    fn is_available(&self) -> bool;

    /// Obtain a port for this print job (not yet opened)
    async fn request_port(&self) -> TransportResult<Box<dyn SerialLink>>;
}

/// One requested serial port
#[async_trait]
pub trait SerialLink: Send {
    fn name(&self) -> &str;

    async fn open(&mut self, baud_rate: u32) -> TransportResult<()>;

    async fn write(&mut self, data: &[u8]) -> TransportResult<()>;

    async fn close(&mut self) -> TransportResult<()>;
}

/// Serial transport driver
pub struct SerialDriver {
    host: Box<dyn SerialHost>,
    baud_rate: u32,
    encoding: TextEncoding,
    transfer_timeout: Option<Duration>,
}

impl SerialDriver {
    pub fn new(host: Box<dyn SerialHost>) -> Self {
        Self {
            host,
            baud_rate: DEFAULT_BAUD_RATE,
            encoding: TextEncoding::Utf8,
            transfer_timeout: None,
        }
    }

    pub fn from_config(host: Box<dyn SerialHost>, config: &PrinterConfig) -> Self {
        Self::new(host)
            .with_baud_rate(config.serial_baud)
            .with_encoding(config.text_encoding)
            .with_timeout(config.transfer_timeout)
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    async fn write_bounded(&self, port: &mut dyn SerialLink, data: &[u8]) -> TransportResult<()> {
        match self.transfer_timeout {
            Some(limit) => tokio::time::timeout(limit, port.write(data))
                .await
                .map_err(|_| {
                    PrinterError::Timeout(format!("Serial write exceeded {:?}", limit))
                })?,
            None => port.write(data).await,
        }
    }

    /// Request, open, write, close
    ///
    /// An opened port is closed exactly once, also when the write fails.
    async fn transmit(&self, data: &[u8]) -> TransportResult<()> {
        let mut port = self.host.request_port().await?;
        port.open(self.baud_rate).await?;
        info!(port = port.name(), baud = self.baud_rate, "Serial port opened");

        let written = self.write_bounded(port.as_mut(), data).await;

        if let Err(e) = port.close().await {
            warn!(port = port.name(), error = %e, "Serial port close failed");
        }

        written
    }
}

#[async_trait]
impl TransportDriver for SerialDriver {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn is_available(&self) -> bool {
        self.host.is_available()
    }

    #[instrument(skip(self, _target, content), fields(data_len = content.len()))]
    async fn send(
        &self,
        _target: Option<&mut Device>,
        content: &str,
    ) -> TransportResult<PrintResult> {
        let data = encode_content(content, self.encoding);

        match self.transmit(&data).await {
            Ok(()) => {
                info!(bytes = data.len(), "Serial print job sent");
                Ok(PrintResult::ok("Printed via serial port"))
            }
            Err(e) => {
                error!(error = %e, "Serial print failed");
                Ok(PrintResult::failed(format!("Serial printing failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        closed: AtomicUsize,
        baud: AtomicUsize,
        written: Mutex<Vec<u8>>,
    }

    struct FakePort {
        counters: Arc<Counters>,
        fail_open: bool,
        fail_write: bool,
        hang_write: bool,
    }

    #[async_trait]
    impl SerialLink for FakePort {
        fn name(&self) -> &str {
            "fake0"
        }

        async fn open(&mut self, baud_rate: u32) -> TransportResult<()> {
            if self.fail_open {
                return Err(PrinterError::AccessDenied("port busy".into()));
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            self.counters.baud.store(baud_rate as usize, Ordering::SeqCst);
            Ok(())
        }

        async fn write(&mut self, data: &[u8]) -> TransportResult<()> {
            if self.fail_write {
                return Err(PrinterError::TransferFailed("framing error".into()));
            }
            if self.hang_write {
                std::future::pending::<()>().await;
            }
            self.counters.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn close(&mut self) -> TransportResult<()> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeHost {
        counters: Arc<Counters>,
        deny: bool,
        fail_open: bool,
        fail_write: bool,
        hang_write: bool,
    }

    impl FakeHost {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                deny: false,
                fail_open: false,
                fail_write: false,
                hang_write: false,
            }
        }
    }

    #[async_trait]
    impl SerialHost for FakeHost {
        fn is_available(&self) -> bool {
            true
        }

        async fn request_port(&self) -> TransportResult<Box<dyn SerialLink>> {
            if self.deny {
                return Err(PrinterError::AccessDenied("user cancelled".into()));
            }
            Ok(Box::new(FakePort {
                counters: self.counters.clone(),
                fail_open: self.fail_open,
                fail_write: self.fail_write,
                hang_write: self.hang_write,
            }))
        }
    }

    #[tokio::test]
    async fn test_successful_write_closes_once() {
        let counters = Arc::new(Counters::default());
        let driver = SerialDriver::new(Box::new(FakeHost::new(counters.clone())));

        let result = driver.send(None, "RECEIPT\n").await.unwrap();
        assert!(result.success);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(counters.baud.load(Ordering::SeqCst), 9600);
        assert_eq!(*counters.written.lock().unwrap(), b"RECEIPT\n");
    }

    #[tokio::test]
    async fn test_failed_write_still_closes_once() {
        let counters = Arc::new(Counters::default());
        let mut host = FakeHost::new(counters.clone());
        host.fail_write = true;
        let driver = SerialDriver::new(Box::new(host));

        let result = driver.send(None, "RECEIPT\n").await.unwrap();
        assert!(!result.success);
        assert!(result.message.starts_with("Serial printing failed: "));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_failure_reports_and_skips_close() {
        let counters = Arc::new(Counters::default());
        let mut host = FakeHost::new(counters.clone());
        host.fail_open = true;
        let driver = SerialDriver::new(Box::new(host));

        let result = driver.send(None, "x").await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("port busy"));
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_denied_request() {
        let counters = Arc::new(Counters::default());
        let mut host = FakeHost::new(counters.clone());
        host.deny = true;
        let driver = SerialDriver::new(Box::new(host));

        let result = driver.send(None, "x").await.unwrap();
        assert_eq!(
            result.message,
            "Serial printing failed: Access denied: user cancelled"
        );
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_configured_baud_rate() {
        let counters = Arc::new(Counters::default());
        let driver =
            SerialDriver::new(Box::new(FakeHost::new(counters.clone()))).with_baud_rate(19200);
        driver.send(None, "x").await.unwrap();
        assert_eq!(counters.baud.load(Ordering::SeqCst), 19200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_write_times_out_and_closes_once() {
        let counters = Arc::new(Counters::default());
        let mut host = FakeHost::new(counters.clone());
        host.hang_write = true;
        let driver = SerialDriver::new(Box::new(host))
            .with_timeout(Some(Duration::from_millis(100)));

        let result = driver.send(None, "RECEIPT\n").await.unwrap();
        assert!(!result.success);
        assert!(
            result.message.starts_with("Serial printing failed: Timeout: "),
            "{}",
            result.message
        );
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }
}
