//! System print pipeline transport
//!
//! The universal fallback: no detected hardware is required. Content is
//! materialized as a monospaced, preformatted document on a fresh print
//! surface; the host print flow fires once after a fixed settle delay and
//! the surface is closed. The driver does not wait for the job itself.

#[cfg(unix)]
mod lp;
#[cfg(windows)]
mod spooler;

#[cfg(unix)]
pub use lp::LpHost;
#[cfg(windows)]
pub use spooler::SpoolerHost;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::driver::TransportDriver;
use crate::error::{PrinterError, TransportResult};
use crate::registry::Device;
use crate::types::{PrintResult, TransportKind};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Message returned once the host print flow has been triggered
pub const DIALOG_OPENED: &str = "Print dialog opened";

/// Print-oriented style rules of a receipt document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentStyle {
    pub font_family: String,
    pub font_size_pt: f32,
    pub margin_pt: u32,
    pub preformatted: bool,
}

impl Default for DocumentStyle {
    fn default() -> Self {
        Self {
            font_family: "monospace".to_string(),
            font_size_pt: 10.0,
            margin_pt: 0,
            preformatted: true,
        }
    }
}

impl DocumentStyle {
    /// Characters per inch for a fixed-pitch font of this size
    pub fn chars_per_inch(&self) -> f32 {
        120.0 / self.font_size_pt
    }

    /// Lines per inch at 1.2x line height
    pub fn lines_per_inch(&self) -> f32 {
        60.0 / self.font_size_pt
    }
}

/// A minimal styled document wrapping opaque receipt content
#[derive(Debug, Clone)]
pub struct PrintDocument {
    pub title: String,
    pub body: String,
    pub style: DocumentStyle,
}

impl PrintDocument {
    pub fn receipt(content: &str) -> Self {
        Self {
            title: "Receipt".to_string(),
            body: content.to_string(),
            style: DocumentStyle::default(),
        }
    }
}

/// Host print pipeline
#[async_trait]
pub trait PrintHost: Send + Sync {
    fn is_available(&self) -> bool;

    /// Printers known to the host spooler
    async fn list_printers(&self) -> TransportResult<Vec<String>>;

    /// Materialize `document` on a fresh surface bound for `destination`
    /// (host default when `None`)
    async fn open_surface(
        &self,
        document: PrintDocument,
        destination: Option<String>,
    ) -> TransportResult<Box<dyn PrintSurface>>;
}

/// A rendered document waiting for the print flow
#[async_trait]
pub trait PrintSurface: Send {
    /// Trigger the host print flow without waiting for the job
    async fn print(&mut self) -> TransportResult<()>;

    async fn close(&mut self);
}

/// System print transport driver
pub struct SystemDriver {
    host: Box<dyn PrintHost>,
    settle_delay: Duration,
    shutdown_token: CancellationToken,
}

impl SystemDriver {
    pub fn new(host: Box<dyn PrintHost>) -> Self {
        Self {
            host,
            settle_delay: DEFAULT_SETTLE_DELAY,
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn from_config(host: Box<dyn PrintHost>, config: &PrinterConfig) -> Self {
        Self::new(host).with_settle_delay(config.settle_delay)
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Cancelling this token tears down every pending surface
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    /// Fire the print flow once after the settle delay
    ///
    /// Does nothing if the driver shuts down first.
    async fn print_after_settle(&self, surface: &mut dyn PrintSurface) -> TransportResult<()> {
        tokio::select! {
            _ = self.shutdown_token.cancelled() => Err(PrinterError::SurfaceClosed),
            _ = tokio::time::sleep(self.settle_delay) => surface.print().await,
        }
    }
}

#[async_trait]
impl TransportDriver for SystemDriver {
    fn kind(&self) -> TransportKind {
        TransportKind::System
    }

    fn is_available(&self) -> bool {
        self.host.is_available()
    }

    fn shutdown(&self) {
        self.shutdown_token.cancel();
    }

    #[instrument(skip(self))]
    async fn discover(&self) -> Vec<Device> {
        match self.host.list_printers().await {
            Ok(names) => names
                .into_iter()
                .enumerate()
                .map(|(idx, label)| {
                    let label = if label.trim().is_empty() {
                        format!("System Printer {}", idx + 1)
                    } else {
                        label
                    };
                    Device::new(label.clone(), label, TransportKind::System).connected(true)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "System printer enumeration unavailable");
                Vec::new()
            }
        }
    }

    #[instrument(skip(self, target, content), fields(data_len = content.len()))]
    async fn send(
        &self,
        target: Option<&mut Device>,
        content: &str,
    ) -> TransportResult<PrintResult> {
        let destination = target.map(|d| d.id().to_string());
        let document = PrintDocument::receipt(content);

        let mut surface = match self.host.open_surface(document, destination).await {
            Ok(surface) => surface,
            Err(e) => {
                error!(error = %e, "Print document construction failed");
                return Ok(PrintResult::failed(format!("System printing failed: {}", e)));
            }
        };

        let fired = self.print_after_settle(surface.as_mut()).await;
        surface.close().await;

        match fired {
            Ok(()) => {
                info!("Host print flow triggered");
                Ok(PrintResult::ok(DIALOG_OPENED))
            }
            Err(e) => {
                error!(error = %e, "Host print flow failed");
                Ok(PrintResult::failed(format!("System printing failed: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Default)]
    struct Log {
        events: Vec<String>,
        printed_at: Option<Instant>,
        destination: Option<String>,
        document: Option<PrintDocument>,
    }

    struct FakeSurface {
        log: Arc<Mutex<Log>>,
    }

    #[async_trait]
    impl PrintSurface for FakeSurface {
        async fn print(&mut self) -> TransportResult<()> {
            let mut log = self.log.lock().unwrap();
            log.events.push("print".into());
            log.printed_at = Some(Instant::now());
            Ok(())
        }

        async fn close(&mut self) {
            self.log.lock().unwrap().events.push("close".into());
        }
    }

    struct FakeHost {
        log: Arc<Mutex<Log>>,
        printers: Option<Vec<String>>,
        fail_surface: bool,
    }

    impl FakeHost {
        fn new(log: Arc<Mutex<Log>>) -> Self {
            Self {
                log,
                printers: Some(Vec::new()),
                fail_surface: false,
            }
        }
    }

    #[async_trait]
    impl PrintHost for FakeHost {
        fn is_available(&self) -> bool {
            true
        }

        async fn list_printers(&self) -> TransportResult<Vec<String>> {
            self.printers
                .clone()
                .ok_or_else(|| PrinterError::CapabilityUnavailable("no spooler".into()))
        }

        async fn open_surface(
            &self,
            document: PrintDocument,
            destination: Option<String>,
        ) -> TransportResult<Box<dyn PrintSurface>> {
            if self.fail_surface {
                return Err(PrinterError::Io(std::io::Error::other("disk full")));
            }
            {
                let mut log = self.log.lock().unwrap();
                log.destination = destination;
                log.document = Some(document);
            }
            Ok(Box::new(FakeSurface {
                log: self.log.clone(),
            }))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_print_waits_for_settle_delay() {
        let log = Arc::new(Mutex::new(Log::default()));
        let driver = SystemDriver::new(Box::new(FakeHost::new(log.clone())));

        let started = Instant::now();
        let result = driver.send(None, "RECEIPT\n").await.unwrap();

        assert_eq!(result, PrintResult::ok(DIALOG_OPENED));
        let log = log.lock().unwrap();
        assert_eq!(log.events, vec!["print", "close"]);
        assert!(log.printed_at.unwrap() - started >= Duration::from_millis(500));
        let document = log.document.as_ref().unwrap();
        assert_eq!(document.body, "RECEIPT\n");
        assert_eq!(document.style.font_family, "monospace");
        assert!(log.destination.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_settle_never_prints() {
        let log = Arc::new(Mutex::new(Log::default()));
        let driver = SystemDriver::new(Box::new(FakeHost::new(log.clone())));

        let token = driver.shutdown_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let started = Instant::now();
        let result = driver.send(None, "x").await.unwrap();
        assert_eq!(
            result.message,
            "System printing failed: Print surface closed before printing"
        );
        assert!(Instant::now() - started < DEFAULT_SETTLE_DELAY);
        assert_eq!(log.lock().unwrap().events, vec!["close"]);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let log = Arc::new(Mutex::new(Log::default()));
        let driver = SystemDriver::new(Box::new(FakeHost::new(log.clone())));
        driver.shutdown();

        let result = driver.send(None, "x").await.unwrap();
        assert!(!result.success);
        assert!(log.lock().unwrap().events.iter().all(|e| e != "print"));
    }

    #[tokio::test]
    async fn test_surface_failure_is_reported() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut host = FakeHost::new(log);
        host.fail_surface = true;
        let driver = SystemDriver::new(Box::new(host));

        let result = driver.send(None, "x").await.unwrap();
        assert_eq!(result.message, "System printing failed: IO error: disk full");
    }

    #[tokio::test]
    async fn test_selected_system_device_is_destination() {
        let log = Arc::new(Mutex::new(Log::default()));
        let driver = SystemDriver::new(Box::new(FakeHost::new(log.clone())))
            .with_settle_delay(Duration::ZERO);
        let mut device = Device::new("Kitchen_TM", "Kitchen_TM", TransportKind::System);

        driver.send(Some(&mut device), "x").await.unwrap();
        assert_eq!(log.lock().unwrap().destination.as_deref(), Some("Kitchen_TM"));
    }

    #[tokio::test]
    async fn test_discover_lists_spooler_printers() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut host = FakeHost::new(log);
        host.printers = Some(vec!["Kitchen_TM".into(), "".into()]);
        let driver = SystemDriver::new(Box::new(host));

        let devices = driver.discover().await;
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name(), "Kitchen_TM");
        assert_eq!(devices[1].name(), "System Printer 2");
        assert!(devices.iter().all(|d| d.kind() == TransportKind::System));
    }

    #[tokio::test]
    async fn test_discover_without_spooler_is_empty() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut host = FakeHost::new(log);
        host.printers = None;
        let driver = SystemDriver::new(Box::new(host));
        assert!(driver.discover().await.is_empty());
    }

    #[test]
    fn test_style_metrics() {
        let style = DocumentStyle::default();
        assert_eq!(style.chars_per_inch(), 12.0);
        assert_eq!(style.lines_per_inch(), 6.0);
    }
}
