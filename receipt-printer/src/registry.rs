//! Device registry
//!
//! Holds the latest discovery snapshot and the current selection. Pure
//! bookkeeping, no I/O.

use std::fmt;

use crate::error::{PrinterError, TransportResult};
use crate::types::{DeviceInfo, TransportKind};
use crate::usb::UsbDevice;

/// A discovered printing endpoint
///
/// Owns its live transport handle; never cloned.
pub struct Device {
    id: String,
    name: String,
    kind: TransportKind,
    connected: bool,
    usb: Option<Box<dyn UsbDevice>>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: TransportKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            connected: false,
            usb: None,
        }
    }

    /// Attach an opened and claimed USB interface
    pub fn with_usb_handle(mut self, handle: Box<dyn UsbDevice>) -> Self {
        self.usb = Some(handle);
        self.connected = true;
        self
    }

    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn tag(&mut self, kind: TransportKind) {
        self.kind = kind;
    }

    pub fn usb_handle_mut(&mut self) -> Option<&mut (dyn UsbDevice + 'static)> {
        self.usb.as_deref_mut()
    }

    /// Drop the live handle, releasing the claimed interface
    pub fn release_handle(&mut self) {
        if self.usb.take().is_some() {
            self.connected = false;
        }
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            transport_kind: self.kind,
            connected: self.connected,
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("connected", &self.connected)
            .field("has_handle", &self.usb.is_some())
            .finish()
    }
}

/// Latest discovery snapshot plus the single selected device
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    selected: Option<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot wholesale
    ///
    /// Clears the selection when its id is absent from `devices`.
    pub fn set_discovered(&mut self, devices: Vec<Device>) {
        if let Some(id) = &self.selected
            && !devices.iter().any(|d| d.id() == id)
        {
            tracing::info!(device_id = %id, "Selected device gone after discovery");
            self.selected = None;
        }
        self.devices = devices;
    }

    /// Select a device from the current snapshot
    ///
    /// Leaves the selection unchanged on `NotFound`.
    pub fn select(&mut self, device_id: &str) -> TransportResult<()> {
        if !self.devices.iter().any(|d| d.id() == device_id) {
            return Err(PrinterError::NotFound(device_id.to_string()));
        }
        self.selected = Some(device_id.to_string());
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn current(&self) -> Option<&Device> {
        let id = self.selected.as_deref()?;
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn current_mut(&mut self) -> Option<&mut Device> {
        let id = self.selected.as_deref()?;
        self.devices.iter_mut().find(|d| d.id() == id)
    }

    pub fn snapshot(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(Device::info).collect()
    }

    /// Release every live handle while keeping the snapshot
    pub fn release_handles(&mut self) {
        for device in &mut self.devices {
            device.release_handle();
        }
    }
}
