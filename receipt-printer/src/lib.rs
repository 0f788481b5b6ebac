//! # receipt-printer
//!
//! Printer transport abstraction for receipt printing.
//!
//! ## Scope
//!
//! This crate handles HOW a receipt reaches paper:
//! - USB bulk transfer to an allow-listed thermal printer (libusb)
//! - Serial port writes at a fixed baud rate
//! - The host print pipeline (CUPS `lp`, Windows spooler) as fallback
//! - Device discovery, selection, and a `print` call that never fails
//!
//! WHAT to print stays outside: receipt content arrives as an opaque,
//! preformatted string.
//!
//! ## Example
//!
//! ```ignore
//! use receipt_printer::{PrinterConfig, PrinterManager, TransportKind};
//!
//! let manager = PrinterManager::from_config(&PrinterConfig::from_env());
//!
//! let devices = manager.discover_all().await;
//! if let Some(usb) = devices.iter().find(|d| d.transport_kind == TransportKind::Usb) {
//!     manager.select(&usb.id).await?;
//! }
//!
//! let result = manager.print("RECEIPT\n", Some(TransportKind::Usb)).await;
//! println!("{}", result.message);
//! ```

mod config;
mod driver;
mod encoding;
mod error;
mod manager;
mod registry;
mod types;

pub mod serial;
pub mod system;
pub mod usb;

// Re-exports
pub use config::{DEFAULT_USB_VENDOR_IDS, PrinterConfig, parse_usb_device, parse_vendor_ids};
pub use driver::TransportDriver;
pub use encoding::{TextEncoding, encode_content};
pub use error::{PrinterError, TransportResult};
pub use manager::PrinterManager;
pub use registry::{Device, DeviceRegistry};
pub use types::{Capabilities, DeviceInfo, PrintRequest, PrintResult, TransportKind};
