//! Value types shared with the presentation layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PrinterError;

/// Communication channel kind for reaching a printer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportKind {
    Usb,
    Serial,
    /// Host print pipeline, the fallback when nothing else is chosen
    #[default]
    System,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Usb => "USB",
            TransportKind::Serial => "SERIAL",
            TransportKind::System => "SYSTEM",
        }
    }

    /// Map a loosely typed transport hint to a kind.
    ///
    /// Missing or unrecognized hints route to `System`.
    pub fn from_hint(hint: Option<&str>) -> Self {
        hint.and_then(|h| h.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = PrinterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usb" => Ok(TransportKind::Usb),
            "serial" => Ok(TransportKind::Serial),
            "system" => Ok(TransportKind::System),
            other => Err(PrinterError::InvalidConfig(format!(
                "Unknown transport: {}",
                other
            ))),
        }
    }
}

/// Presentation view of a discovered device (no live handle)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "transportKind")]
    pub transport_kind: TransportKind,
    pub connected: bool,
}

/// One print job as submitted by the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintRequest {
    pub content: String,
    #[serde(default, rename = "transportKind")]
    pub transport_kind: Option<TransportKind>,
}

impl PrintRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            transport_kind: None,
        }
    }

    pub fn via(mut self, kind: TransportKind) -> Self {
        self.transport_kind = Some(kind);
        self
    }
}

/// Outcome of a print call, always carrying a user-facing message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintResult {
    pub success: bool,
    pub message: String,
}

impl PrintResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Per-transport host support
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub usb: bool,
    pub serial: bool,
    pub system: bool,
}

impl Capabilities {
    pub fn any(&self) -> bool {
        self.usb || self.serial || self.system
    }
}
