//! USB bulk-transfer transport
//!
//! Discovery is a single grant filtered by vendor id, followed by an
//! open → select-configuration(1) → claim-interface(0) handshake. Sending is
//! a dumb byte pipe over the claimed interface's bulk OUT endpoint.

mod rusb_host;

pub use rusb_host::RusbHost;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::config::PrinterConfig;
use crate::driver::TransportDriver;
use crate::encoding::{TextEncoding, encode_content};
use crate::error::{PrinterError, TransportResult};
use crate::registry::Device;
use crate::types::{PrintResult, TransportKind};

const CONFIGURATION: u8 = 1;
const INTERFACE: u8 = 0;

/// Descriptor data of a granted USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: Option<String>,
}

impl UsbDeviceInfo {
    /// Session-unique id: the vendor/product pair
    pub fn device_id(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }

    pub fn display_name(&self) -> String {
        match self.product_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("USB Printer {}", self.device_id()),
        }
    }
}

/// Platform USB access
#[async_trait]
pub trait UsbHost: Send + Sync {
    fn is_available(&self) -> bool;

    /// Grant at most one device whose vendor id is in `vendor_ids`
    async fn request_device(
        &self,
        vendor_ids: &[u16],
    ) -> TransportResult<Option<Box<dyn UsbDevice>>>;
}

/// A granted USB device
#[async_trait]
pub trait UsbDevice: Send {
    fn info(&self) -> &UsbDeviceInfo;

    async fn open(&mut self) -> TransportResult<()>;

    async fn select_configuration(&mut self, configuration: u8) -> TransportResult<()>;

    async fn claim_interface(&mut self, interface: u8) -> TransportResult<()>;

    /// Single bulk transfer, returns bytes written
    async fn transfer_out(&mut self, endpoint: u8, data: &[u8]) -> TransportResult<usize>;
}

/// USB transport driver
pub struct UsbDriver {
    host: Box<dyn UsbHost>,
    vendor_ids: Vec<u16>,
    endpoint: u8,
    encoding: TextEncoding,
    transfer_timeout: Option<Duration>,
}

impl UsbDriver {
    pub fn new(host: Box<dyn UsbHost>, vendor_ids: Vec<u16>) -> Self {
        Self {
            host,
            vendor_ids,
            endpoint: 1,
            encoding: TextEncoding::Utf8,
            transfer_timeout: None,
        }
    }

    pub fn from_config(host: Box<dyn UsbHost>, config: &PrinterConfig) -> Self {
        Self::new(host, config.usb_vendor_ids.clone())
            .with_endpoint(config.usb_endpoint)
            .with_encoding(config.text_encoding)
            .with_timeout(config.transfer_timeout)
    }

    pub fn with_endpoint(mut self, endpoint: u8) -> Self {
        self.endpoint = endpoint;
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

    async fn handshake(device: &mut dyn UsbDevice) -> TransportResult<()> {
        device.open().await?;
        device.select_configuration(CONFIGURATION).await?;
        device.claim_interface(INTERFACE).await?;
        Ok(())
    }

    async fn transfer(&self, device: &mut Device, data: &[u8]) -> TransportResult<usize> {
        let handle = device
            .usb_handle_mut()
            .ok_or(PrinterError::NoDeviceSelected)?;
        let transfer = handle.transfer_out(self.endpoint, data);

        let written = match self.transfer_timeout {
            Some(limit) => tokio::time::timeout(limit, transfer)
                .await
                .map_err(|_| PrinterError::Timeout(format!("USB transfer exceeded {:?}", limit)))??,
            None => transfer.await?,
        };

        if written != data.len() {
            return Err(PrinterError::TransferFailed(format!(
                "Incomplete write: {} of {} bytes",
                written,
                data.len()
            )));
        }
        Ok(written)
    }
}

#[async_trait]
impl TransportDriver for UsbDriver {
    fn kind(&self) -> TransportKind {
        TransportKind::Usb
    }

    fn is_available(&self) -> bool {
        self.host.is_available()
    }

    #[instrument(skip(self), fields(vendors = self.vendor_ids.len()))]
    async fn discover(&self) -> Vec<Device> {
        let mut granted = match self.host.request_device(&self.vendor_ids).await {
            Ok(Some(device)) => device,
            Ok(None) => {
                info!("No USB printer granted");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "USB device request failed");
                return Vec::new();
            }
        };

        if let Err(e) = Self::handshake(granted.as_mut()).await {
            warn!(device = %granted.info().device_id(), error = %e, "USB handshake failed");
            return Vec::new();
        }

        let info = granted.info().clone();
        info!(device = %info.device_id(), name = %info.display_name(), "USB printer connected");

        vec![
            Device::new(info.device_id(), info.display_name(), TransportKind::Usb)
                .with_usb_handle(granted),
        ]
    }

    #[instrument(
        skip(self, target, content),
        fields(device = tracing::field::Empty, data_len = tracing::field::Empty)
    )]
    async fn send(
        &self,
        target: Option<&mut Device>,
        content: &str,
    ) -> TransportResult<PrintResult> {
        let Some(device) = target else {
            return Ok(PrintResult::failed(format!(
                "USB printing failed: {}",
                PrinterError::NoDeviceSelected
            )));
        };
        tracing::Span::current().record("device", device.id());

        let data = encode_content(content, self.encoding);
        tracing::Span::current().record("data_len", data.len());

        match self.transfer(device, &data).await {
            Ok(written) => {
                info!(bytes = written, "USB print job sent");
                Ok(PrintResult::ok("Printed via USB"))
            }
            Err(e) => {
                error!(error = %e, "USB print failed");
                Ok(PrintResult::failed(format!("USB printing failed: {}", e)))
            }
        }
    }
}
