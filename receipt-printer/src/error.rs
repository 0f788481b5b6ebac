//! Error types for the printer transports

use thiserror::Error;

/// Printer transport error types
#[derive(Debug, Error)]
pub enum PrinterError {
    /// User declined or platform denied the device/port grant
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Open / configure / claim sequence failed
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Byte-level write error mid-transmission
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Device id absent from the current discovery snapshot
    #[error("Device not found: {0}")]
    NotFound(String),

    /// Host lacks support for the transport entirely
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// USB printing requested without a selected, connected device
    #[error("No device selected")]
    NoDeviceSelected,

    /// Transfer did not complete within the configured bound
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Print surface was torn down before the print flow fired
    #[error("Print surface closed before printing")]
    SurfaceClosed,

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Windows spooler error
    #[cfg(windows)]
    #[error("Windows spooler error: {0}")]
    Spooler(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, PrinterError>;
