//! Windows print spooler backend
//!
//! Submits the encoded body as a single RAW job. The spooler does no
//! layout, so the receipt reaches the driver exactly as formatted by the
//! caller; [`DocumentStyle`](super::DocumentStyle) is not applied here.

use core::ffi::c_void;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use windows::Win32::Graphics::Printing::{
    ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, EnumPrintersW, GetDefaultPrinterW,
    OpenPrinterW, PRINTER_ENUM_CONNECTIONS, PRINTER_ENUM_LOCAL, PRINTER_HANDLE, PRINTER_INFO_5W,
    StartDocPrinterW, StartPagePrinter, WritePrinter,
};
use windows::core::{PCWSTR, PWSTR};

use super::{PrintDocument, PrintHost, PrintSurface};
use crate::encoding::{TextEncoding, encode_content};
use crate::error::{PrinterError, TransportResult};

/// Port prefixes of printers that never reach paper
const VIRTUAL_PORTS: &[&str] = &["file:", "portprompt:", "xpsport:", "nul:", "onenote", "wfsport:"];

/// Host printing through the Windows spooler
pub struct SpoolerHost {
    encoding: TextEncoding,
}

impl SpoolerHost {
    pub fn new(encoding: TextEncoding) -> Self {
        Self { encoding }
    }
}

impl Default for SpoolerHost {
    fn default() -> Self {
        Self::new(TextEncoding::Utf8)
    }
}

#[async_trait]
impl PrintHost for SpoolerHost {
    fn is_available(&self) -> bool {
        true
    }

    #[instrument(skip(self))]
    async fn list_printers(&self) -> TransportResult<Vec<String>> {
        let printers = tokio::task::spawn_blocking(physical_printers)
            .await
            .map_err(|e| PrinterError::Spooler(format!("Task join failed: {}", e)))??;
        debug!(count = printers.len(), "Spooler printers enumerated");
        Ok(printers)
    }

    async fn open_surface(
        &self,
        document: PrintDocument,
        destination: Option<String>,
    ) -> TransportResult<Box<dyn PrintSurface>> {
        let printer = match destination {
            Some(name) => name,
            None => default_printer()?
                .ok_or_else(|| PrinterError::Spooler("No default printer".to_string()))?,
        };

        Ok(Box::new(SpoolerSurface {
            printer,
            title: document.title,
            data: Some(encode_content(&document.body, self.encoding)),
        }))
    }
}

struct SpoolerSurface {
    printer: String,
    title: String,
    data: Option<Vec<u8>>,
}

#[async_trait]
impl PrintSurface for SpoolerSurface {
    async fn print(&mut self) -> TransportResult<()> {
        let data = self.data.take().ok_or(PrinterError::SurfaceClosed)?;
        let printer = self.printer.clone();
        let title = self.title.clone();

        // Submission only; the spooler owns the job afterwards
        tokio::task::spawn_blocking(move || submit_raw_job(&printer, &title, &data))
            .await
            .map_err(|e| PrinterError::Spooler(format!("Task join failed: {}", e)))??;

        info!(printer = %self.printer, "Job submitted to spooler");
        Ok(())
    }

    async fn close(&mut self) {
        self.data.take();
    }
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn is_physical_port(port: &str) -> bool {
    let port = port.to_ascii_lowercase();
    !VIRTUAL_PORTS.iter().any(|prefix| port.starts_with(prefix))
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated UTF-16 string.
unsafe fn read_wide(ptr: PWSTR) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { ptr.to_string() }.unwrap_or_default()
    }
}

/// Local and connected printers whose port is not virtual
fn physical_printers() -> TransportResult<Vec<String>> {
    let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
    let mut needed = 0u32;
    let mut returned = 0u32;

    // First call sizes the buffer
    let _ = unsafe { EnumPrintersW(flags, None, 5, None, &mut needed, &mut returned) };
    if needed == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; needed as usize];
    let listed = unsafe {
        EnumPrintersW(flags, None, 5, Some(buf.as_mut_slice()), &mut needed, &mut returned)
    };
    listed.map_err(|e| PrinterError::Spooler(format!("EnumPrintersW: {}", e)))?;

    let entries = unsafe {
        std::slice::from_raw_parts(buf.as_ptr() as *const PRINTER_INFO_5W, returned as usize)
    };

    Ok(entries
        .iter()
        .filter(|entry| !entry.pPrinterName.is_null())
        .map(|entry| unsafe { (read_wide(entry.pPrinterName), read_wide(entry.pPortName)) })
        .filter(|(_, port)| is_physical_port(port))
        .map(|(name, _)| name)
        .collect())
}

fn default_printer() -> TransportResult<Option<String>> {
    let mut len = 0u32;
    let _ = unsafe { GetDefaultPrinterW(None, &mut len) };
    if len == 0 {
        return Ok(None);
    }

    let mut buf = vec![0u16; len as usize];
    if !unsafe { GetDefaultPrinterW(Some(PWSTR(buf.as_mut_ptr())), &mut len) }.as_bool() {
        return Ok(None);
    }

    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16(&buf[..end])
        .map(Some)
        .map_err(|e| PrinterError::Spooler(format!("Default printer name: {}", e)))
}

/// Open printer handle, closed on drop
struct Printer(PRINTER_HANDLE);

impl Printer {
    fn open(name: &str) -> TransportResult<Self> {
        let name_w = wide(name);
        let mut handle = PRINTER_HANDLE::default();
        unsafe { OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None) }
            .map_err(|e| PrinterError::AccessDenied(format!("{}: {}", name, e)))?;
        Ok(Self(handle))
    }
}

impl Drop for Printer {
    fn drop(&mut self) {
        let _ = unsafe { ClosePrinter(self.0) };
    }
}

/// Started document with one open page, ended on drop
struct RawJob<'a> {
    printer: &'a Printer,
    page_open: bool,
}

impl<'a> RawJob<'a> {
    fn start(printer: &'a Printer, title: &str) -> TransportResult<Self> {
        let title_w = wide(title);
        let datatype_w = wide("RAW");
        let doc_info = DOC_INFO_1W {
            pDocName: PWSTR(title_w.as_ptr() as *mut _),
            pOutputFile: PWSTR::null(),
            pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
        };

        if unsafe { StartDocPrinterW(printer.0, 1, &doc_info) } == 0 {
            return Err(PrinterError::Spooler("StartDocPrinterW rejected the job".to_string()));
        }
        let mut job = Self {
            printer,
            page_open: false,
        };
        if !unsafe { StartPagePrinter(printer.0) }.as_bool() {
            return Err(PrinterError::Spooler("StartPagePrinter failed".to_string()));
        }
        job.page_open = true;
        Ok(job)
    }

    fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        let mut written = 0u32;
        let ok = unsafe {
            WritePrinter(
                self.printer.0,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            )
        };
        if !ok.as_bool() {
            return Err(PrinterError::TransferFailed("WritePrinter failed".to_string()));
        }
        if written as usize != data.len() {
            return Err(PrinterError::TransferFailed(format!(
                "Incomplete write: {} of {} bytes",
                written,
                data.len()
            )));
        }
        Ok(())
    }
}

impl Drop for RawJob<'_> {
    fn drop(&mut self) {
        unsafe {
            if self.page_open {
                let _ = EndPagePrinter(self.printer.0);
            }
            let _ = EndDocPrinter(self.printer.0);
        }
    }
}

fn submit_raw_job(printer: &str, title: &str, data: &[u8]) -> TransportResult<()> {
    let printer = Printer::open(printer)?;
    let mut job = RawJob::start(&printer, title)?;
    job.write(data)
}
