//! libusb backend (rusb)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusb::{Context, DeviceHandle, UsbContext};
use tracing::{debug, info, warn};

use super::{UsbDevice, UsbDeviceInfo, UsbHost};
use crate::error::{PrinterError, TransportResult};

/// USB access through libusb
///
/// There is no interactive chooser on a desktop host: the grant goes to the
/// preferred vendor/product pair when present, else to the first
/// allow-listed device in bus order.
pub struct RusbHost {
    context: Option<Context>,
    preferred: Option<(u16, u16)>,
    write_timeout: Duration,
}

impl RusbHost {
    pub fn new() -> Self {
        let context = match Context::new() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!(error = %e, "libusb unavailable");
                None
            }
        };

        Self {
            context,
            preferred: None,
            write_timeout: Duration::ZERO,
        }
    }

    pub fn with_preferred(mut self, preferred: Option<(u16, u16)>) -> Self {
        self.preferred = preferred;
        self
    }

    /// libusb-level write timeout, zero waits forever
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.unwrap_or(Duration::ZERO);
        self
    }
}

impl Default for RusbHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsbHost for RusbHost {
    fn is_available(&self) -> bool {
        self.context.is_some()
    }

    async fn request_device(
        &self,
        vendor_ids: &[u16],
    ) -> TransportResult<Option<Box<dyn UsbDevice>>> {
        let context = self.context.as_ref().ok_or_else(|| {
            PrinterError::CapabilityUnavailable("libusb context not initialised".to_string())
        })?;

        let list = context.devices().map_err(map_access)?;

        let mut candidates = Vec::new();
        for device in list.iter() {
            let Ok(descriptor) = device.device_descriptor() else {
                continue;
            };
            if vendor_ids.contains(&descriptor.vendor_id()) {
                debug!(
                    vendor = descriptor.vendor_id(),
                    product = descriptor.product_id(),
                    "Allow-listed USB device"
                );
                candidates.push((device, descriptor));
            }
        }

        let chosen = match self.preferred {
            Some((vid, pid)) => candidates
                .iter()
                .position(|(_, d)| d.vendor_id() == vid && d.product_id() == pid)
                .unwrap_or(0),
            None => 0,
        };

        if chosen >= candidates.len() {
            return Ok(None);
        }
        let (device, descriptor) = candidates.swap_remove(chosen);

        info!(
            vendor = descriptor.vendor_id(),
            product = descriptor.product_id(),
            "USB printer granted"
        );

        let info = UsbDeviceInfo {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            product_name: None,
        };

        Ok(Some(Box::new(RusbDevice {
            device,
            descriptor,
            handle: None,
            info,
            write_timeout: self.write_timeout,
        })))
    }
}

struct RusbDevice {
    device: rusb::Device<Context>,
    descriptor: rusb::DeviceDescriptor,
    handle: Option<Arc<DeviceHandle<Context>>>,
    info: UsbDeviceInfo,
    write_timeout: Duration,
}

impl RusbDevice {
    fn handle(&self) -> TransportResult<&DeviceHandle<Context>> {
        self.handle
            .as_deref()
            .ok_or_else(|| PrinterError::HandshakeFailed("device not open".to_string()))
    }

    /// Exclusive access for setup calls; fails while a transfer holds the handle
    fn handle_mut(&mut self) -> TransportResult<&mut DeviceHandle<Context>> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| PrinterError::HandshakeFailed("device not open".to_string()))?;
        Arc::get_mut(handle)
            .ok_or_else(|| PrinterError::HandshakeFailed("device busy".to_string()))
    }
}

#[async_trait]
impl UsbDevice for RusbDevice {
    fn info(&self) -> &UsbDeviceInfo {
        &self.info
    }

    async fn open(&mut self) -> TransportResult<()> {
        let handle = self.device.open().map_err(|e| match e {
            rusb::Error::Access => PrinterError::AccessDenied(e.to_string()),
            other => PrinterError::HandshakeFailed(format!("open: {}", other)),
        })?;

        // Not supported on every platform
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!(error = %e, "Kernel driver auto-detach unavailable");
        }

        self.info.product_name = handle.read_product_string_ascii(&self.descriptor).ok();
        self.handle = Some(Arc::new(handle));
        Ok(())
    }

    async fn select_configuration(&mut self, configuration: u8) -> TransportResult<()> {
        if matches!(self.handle()?.active_configuration(), Ok(active) if active == configuration)
        {
            return Ok(());
        }
        self.handle_mut()?
            .set_active_configuration(configuration)
            .map_err(|e| PrinterError::HandshakeFailed(format!("configuration: {}", e)))
    }

    async fn claim_interface(&mut self, interface: u8) -> TransportResult<()> {
        self.handle_mut()?
            .claim_interface(interface)
            .map_err(|e| match e {
                rusb::Error::Access => PrinterError::AccessDenied(e.to_string()),
                other => PrinterError::HandshakeFailed(format!("claim interface: {}", other)),
            })
    }

    async fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> TransportResult<usize> {
        let handle = self
            .handle
            .clone()
            .ok_or_else(|| PrinterError::TransferFailed("device not open".to_string()))?;
        let timeout = self.write_timeout;
        let data = data.to_vec();

        // OUT direction: high bit clear
        let address = endpoint & 0x7f;

        tokio::task::spawn_blocking(move || handle.write_bulk(address, &data, timeout))
            .await
            .map_err(|e| PrinterError::TransferFailed(format!("Task join failed: {}", e)))?
            .map_err(|e| match e {
                rusb::Error::Timeout => PrinterError::Timeout(e.to_string()),
                rusb::Error::NoDevice => PrinterError::TransferFailed("device disconnected".into()),
                other => PrinterError::TransferFailed(other.to_string()),
            })
    }
}

fn map_access(e: rusb::Error) -> PrinterError {
    match e {
        rusb::Error::Access => PrinterError::AccessDenied(e.to_string()),
        rusb::Error::NotSupported => PrinterError::CapabilityUnavailable(e.to_string()),
        other => PrinterError::HandshakeFailed(other.to_string()),
    }
}
