use std::time::Duration;

use crate::encoding::TextEncoding;
use crate::error::{PrinterError, TransportResult};

/// Vendor ids of common thermal-printer controller chipsets
pub const DEFAULT_USB_VENDOR_IDS: &[u16] = &[
    0x04b8, // Epson
    0x0519, // Star Micronics
    0x1d90, // Citizen
    0x1504, // Bixolon
    0x0416, // Winbond (Xprinter, Zjiang)
    0x0483, // STMicroelectronics
    0x0fe6, // ICS / generic POS
    0x28e9, // GigaDevice
];

/// Printer transport configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | PRINTER_USB_VENDOR_IDS | built-in list | comma separated hex vendor ids |
/// | PRINTER_USB_DEVICE | - | preferred `vvvv:pppp` device |
/// | PRINTER_USB_ENDPOINT | 1 | bulk OUT endpoint |
/// | PRINTER_SERIAL_PORT | - | serial port path, first enumerated if unset |
/// | PRINTER_SERIAL_BAUD | 9600 | baud rate |
/// | PRINTER_SETTLE_DELAY_MS | 500 | wait before triggering the host print flow |
/// | PRINTER_TRANSFER_TIMEOUT_MS | 30000 | USB/serial transfer bound, 0 disables |
/// | PRINTER_SYSTEM_COMMAND | lp | host print command |
/// | PRINTER_TEXT_ENCODING | utf8 | `utf8` or `gbk` |
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub usb_vendor_ids: Vec<u16>,
    pub usb_preferred: Option<(u16, u16)>,
    pub usb_endpoint: u8,
    pub serial_port: Option<String>,
    pub serial_baud: u32,
    pub settle_delay: Duration,
    /// `None` means transfers may block indefinitely
    pub transfer_timeout: Option<Duration>,
    pub system_command: String,
    pub text_encoding: TextEncoding,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            usb_vendor_ids: DEFAULT_USB_VENDOR_IDS.to_vec(),
            usb_preferred: None,
            usb_endpoint: 1,
            serial_port: None,
            serial_baud: 9600,
            settle_delay: Duration::from_millis(500),
            transfer_timeout: Some(Duration::from_secs(30)),
            system_command: "lp".to_string(),
            text_encoding: TextEncoding::Utf8,
        }
    }
}

impl PrinterConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            usb_vendor_ids: std::env::var("PRINTER_USB_VENDOR_IDS")
                .ok()
                .and_then(|v| parse_vendor_ids(&v).ok())
                .unwrap_or(defaults.usb_vendor_ids),
            usb_preferred: std::env::var("PRINTER_USB_DEVICE")
                .ok()
                .and_then(|v| parse_usb_device(&v).ok()),
            usb_endpoint: std::env::var("PRINTER_USB_ENDPOINT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.usb_endpoint),
            serial_port: std::env::var("PRINTER_SERIAL_PORT")
                .ok()
                .filter(|v| !v.is_empty()),
            serial_baud: std::env::var("PRINTER_SERIAL_BAUD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.serial_baud),
            settle_delay: std::env::var("PRINTER_SETTLE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle_delay),
            transfer_timeout: std::env::var("PRINTER_TRANSFER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|ms| (ms > 0).then(|| Duration::from_millis(ms)))
                .unwrap_or(defaults.transfer_timeout),
            system_command: std::env::var("PRINTER_SYSTEM_COMMAND")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.system_command),
            text_encoding: std::env::var("PRINTER_TEXT_ENCODING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.text_encoding),
        }
    }
}

/// Parse a comma separated list of hex vendor ids (`04b8,0x0416`)
pub fn parse_vendor_ids(s: &str) -> TransportResult<Vec<u16>> {
    let ids = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_hex_u16)
        .collect::<TransportResult<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(PrinterError::InvalidConfig(
            "Empty USB vendor id list".to_string(),
        ));
    }
    Ok(ids)
}

/// Parse a `vvvv:pppp` vendor/product pair
pub fn parse_usb_device(s: &str) -> TransportResult<(u16, u16)> {
    let (vendor, product) = s
        .split_once(':')
        .ok_or_else(|| PrinterError::InvalidConfig(format!("Invalid USB device: {}", s)))?;
    Ok((parse_hex_u16(vendor)?, parse_hex_u16(product)?))
}

fn parse_hex_u16(s: &str) -> TransportResult<u16> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
        .map_err(|_| PrinterError::InvalidConfig(format!("Invalid hex id: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrinterConfig::default();
        assert_eq!(config.serial_baud, 9600);
        assert_eq!(config.usb_endpoint, 1);
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert!(config.usb_vendor_ids.contains(&0x04b8));
    }

    #[test]
    fn test_parse_vendor_ids() {
        assert_eq!(parse_vendor_ids("04b8, 0x0416").unwrap(), vec![0x04b8, 0x0416]);
        assert!(parse_vendor_ids("").is_err());
        assert!(parse_vendor_ids("zz").is_err());
    }

    #[test]
    fn test_parse_usb_device() {
        assert_eq!(parse_usb_device("04b8:0e15").unwrap(), (0x04b8, 0x0e15));
        assert!(parse_usb_device("04b8").is_err());
    }
}
