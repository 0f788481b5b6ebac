//! Payload encoding for byte-pipe transports
//!
//! Receipt content arrives as an opaque UTF-8 string. Most printers take it
//! as is; Chinese models with a GBK code page need the text transcoded.
//! No ESC/POS commands are added here.

use std::str::FromStr;

use crate::error::PrinterError;

/// Byte encoding applied to receipt text before transmission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Gbk,
}

impl FromStr for TextEncoding {
    type Err = PrinterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "gbk" | "gb2312" => Ok(TextEncoding::Gbk),
            other => Err(PrinterError::InvalidConfig(format!(
                "Unknown text encoding: {}",
                other
            ))),
        }
    }
}

/// Encode receipt content into the bytes sent to the printer
pub fn encode_content(content: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => content.as_bytes().to_vec(),
        TextEncoding::Gbk => {
            let (bytes, _, had_errors) = encoding_rs::GBK.encode(content);
            if had_errors {
                tracing::warn!("Receipt contains characters outside GBK, replaced");
            }
            bytes.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_passthrough() {
        assert_eq!(encode_content("RECEIPT\n", TextEncoding::Utf8), b"RECEIPT\n");
        assert_eq!(encode_content("你好", TextEncoding::Utf8), "你好".as_bytes());
    }

    #[test]
    fn test_gbk_width() {
        assert_eq!(encode_content("hello", TextEncoding::Gbk).len(), 5);
        assert_eq!(encode_content("你好", TextEncoding::Gbk).len(), 4);
        assert_eq!(encode_content("AB中文CD", TextEncoding::Gbk).len(), 8);
    }

    #[test]
    fn test_parse_encoding() {
        assert_eq!("UTF-8".parse::<TextEncoding>().unwrap(), TextEncoding::Utf8);
        assert_eq!("gbk".parse::<TextEncoding>().unwrap(), TextEncoding::Gbk);
        assert!("latin1".parse::<TextEncoding>().is_err());
    }
}
