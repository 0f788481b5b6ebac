//! Printer manager
//!
//! The single public surface: discovery across drivers, selection, and the
//! `print` dispatch. Every print call resolves to a [`PrintResult`].

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::driver::TransportDriver;
use crate::error::{PrinterError, TransportResult};
use crate::registry::DeviceRegistry;
use crate::serial::{NativeSerialHost, SerialDriver};
use crate::system::SystemDriver;
use crate::types::{Capabilities, DeviceInfo, PrintRequest, PrintResult, TransportKind};
use crate::usb::{RusbHost, UsbDriver};

/// Owns the drivers and the device registry
///
/// Construct once per process and share by reference (`Arc`).
pub struct PrinterManager {
    usb: Box<dyn TransportDriver>,
    serial: Box<dyn TransportDriver>,
    system: Box<dyn TransportDriver>,
    registry: Mutex<DeviceRegistry>,
}

impl PrinterManager {
    /// Build a manager over explicit drivers
    pub fn with_drivers(
        usb: Box<dyn TransportDriver>,
        serial: Box<dyn TransportDriver>,
        system: Box<dyn TransportDriver>,
    ) -> Self {
        Self {
            usb,
            serial,
            system,
            registry: Mutex::new(DeviceRegistry::new()),
        }
    }

    /// Build a manager over the host's native backends
    pub fn from_config(config: &PrinterConfig) -> Self {
        let usb_host = RusbHost::new()
            .with_preferred(config.usb_preferred)
            .with_write_timeout(config.transfer_timeout);
        let serial_host = NativeSerialHost::new(config.serial_port.clone())
            .with_io_timeout(config.transfer_timeout);

        Self::with_drivers(
            Box::new(UsbDriver::from_config(Box::new(usb_host), config)),
            Box::new(SerialDriver::from_config(Box::new(serial_host), config)),
            Box::new(SystemDriver::from_config(native_print_host(config), config)),
        )
    }

    fn driver(&self, kind: TransportKind) -> &dyn TransportDriver {
        match kind {
            TransportKind::Usb => self.usb.as_ref(),
            TransportKind::Serial => self.serial.as_ref(),
            TransportKind::System => self.system.as_ref(),
        }
    }

    /// Discover USB and system devices and replace the registry snapshot
    #[instrument(skip(self))]
    pub async fn discover_all(&self) -> Vec<DeviceInfo> {
        let mut registry = self.registry.lock().await;

        // Old handles must go before the same device can be claimed again
        registry.release_handles();

        let mut found = Vec::new();
        for kind in [TransportKind::Usb, TransportKind::System] {
            let mut devices = self.driver(kind).discover().await;
            for device in &mut devices {
                device.tag(kind);
            }
            found.append(&mut devices);
        }

        registry.set_discovered(found);
        let snapshot = registry.snapshot();
        info!(count = snapshot.len(), "Discovery finished");
        snapshot
    }

    /// Select a device from the last discovery snapshot
    ///
    /// Fails with [`PrinterError::NotFound`] and keeps the current selection
    /// when `device_id` is unknown.
    pub async fn select(&self, device_id: &str) -> TransportResult<()> {
        let mut registry = self.registry.lock().await;
        registry.select(device_id).inspect_err(|e| {
            warn!(device_id, error = %e, "Device selection failed");
        })?;
        info!(device_id, "Device selected");
        Ok(())
    }

    pub async fn deselect(&self) {
        self.registry.lock().await.clear_selection();
    }

    pub async fn current(&self) -> Option<DeviceInfo> {
        self.registry.lock().await.current().map(|d| d.info())
    }

    /// Last discovery snapshot, without rediscovering
    pub async fn devices(&self) -> Vec<DeviceInfo> {
        self.registry.lock().await.snapshot()
    }

    /// Print through the requested transport (`SYSTEM` when `None`)
    ///
    /// Never fails: driver errors and panics are turned into a failed
    /// [`PrintResult`].
    #[instrument(
        skip(self, content),
        fields(transport = tracing::field::Empty, data_len = content.len())
    )]
    pub async fn print(&self, content: &str, kind: Option<TransportKind>) -> PrintResult {
        let kind = kind.unwrap_or_default();
        tracing::Span::current().record("transport", kind.as_str());

        let mut registry = self.registry.lock().await;
        let selected = registry.current_mut();

        let result = match kind {
            TransportKind::Usb => {
                match selected.filter(|d| d.kind() == TransportKind::Usb && d.is_connected()) {
                    Some(device) => guarded(self.usb.send(Some(device), content)).await,
                    None => PrintResult::failed(format!(
                        "Printing failed: {}",
                        PrinterError::NoDeviceSelected
                    )),
                }
            }
            TransportKind::Serial => guarded(self.serial.send(None, content)).await,
            TransportKind::System => {
                let target = selected.filter(|d| d.kind() == TransportKind::System);
                guarded(self.system.send(target, content)).await
            }
        };

        if result.success {
            info!(message = %result.message, "Print finished");
        } else {
            error!(message = %result.message, "Print failed");
        }
        result
    }

    pub async fn submit(&self, request: PrintRequest) -> PrintResult {
        self.print(&request.content, request.transport_kind).await
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            usb: self.usb.is_available(),
            serial: self.serial.is_available(),
            system: self.system.is_available(),
        }
    }

    /// Whether any hardware or host print option can be offered
    pub fn capabilities_available(&self) -> bool {
        self.capabilities().any()
    }

    /// Tear down pending print surfaces
    ///
    /// A system print still waiting out its settle delay never fires.
    pub fn shutdown(&self) {
        info!("Shutting down printer manager");
        self.usb.shutdown();
        self.serial.shutdown();
        self.system.shutdown();
    }
}

async fn guarded<F>(send: F) -> PrintResult
where
    F: Future<Output = TransportResult<PrintResult>>,
{
    match AssertUnwindSafe(send).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => PrintResult::failed(format!("Printing failed: {}", e)),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(panic = %message, "Printer driver panicked");
            PrintResult::failed(format!("Printing failed: {}", message))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(unix)]
fn native_print_host(config: &PrinterConfig) -> Box<dyn crate::system::PrintHost> {
    Box::new(crate::system::LpHost::new(config.system_command.clone()))
}

#[cfg(windows)]
fn native_print_host(config: &PrinterConfig) -> Box<dyn crate::system::PrintHost> {
    Box::new(crate::system::SpoolerHost::new(config.text_encoding))
}
