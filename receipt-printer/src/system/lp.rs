//! CUPS / lp backend for unix hosts

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{PrintDocument, PrintHost, PrintSurface};
use crate::error::{PrinterError, TransportResult};

/// Host printing through the `lp` command
pub struct LpHost {
    command: String,
}

impl LpHost {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Write the document to a temp file and prepare the lp invocation
    fn materialize(
        &self,
        document: &PrintDocument,
        destination: Option<String>,
    ) -> TransportResult<LpSurface> {
        let mut file = tempfile::Builder::new()
            .prefix("receipt-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(document.body.as_bytes())?;
        file.flush()?;

        let mut args = vec!["-t".to_string(), document.title.clone()];
        if let Some(dest) = destination {
            args.push("-d".to_string());
            args.push(dest);
        }
        for option in style_options(document) {
            args.push("-o".to_string());
            args.push(option);
        }

        Ok(LpSurface {
            command: self.command.clone(),
            args,
            file: Some(file),
        })
    }

    fn lpstat(&self) -> PathBuf {
        // lpstat ships next to lp; fall back to PATH lookup
        let sibling = which(&self.command).and_then(|lp| lp.parent().map(|dir| dir.join("lpstat")));
        match sibling {
            Some(path) if path.is_file() => path,
            _ => PathBuf::from("lpstat"),
        }
    }
}

impl Default for LpHost {
    fn default() -> Self {
        Self::new("lp")
    }
}

#[async_trait]
impl PrintHost for LpHost {
    fn is_available(&self) -> bool {
        which(&self.command).is_some()
    }

    #[instrument(skip(self))]
    async fn list_printers(&self) -> TransportResult<Vec<String>> {
        let output = Command::new(self.lpstat())
            .arg("-e")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PrinterError::CapabilityUnavailable(format!("lpstat: {}", e)))?;

        if !output.status.success() {
            // lpstat exits non-zero when no destinations exist
            debug!(status = %output.status, "lpstat reported no destinations");
            return Ok(Vec::new());
        }

        Ok(parse_destinations(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn open_surface(
        &self,
        document: PrintDocument,
        destination: Option<String>,
    ) -> TransportResult<Box<dyn PrintSurface>> {
        Ok(Box::new(self.materialize(&document, destination)?))
    }
}

struct LpSurface {
    command: String,
    args: Vec<String>,
    file: Option<NamedTempFile>,
}

#[async_trait]
impl PrintSurface for LpSurface {
    async fn print(&mut self) -> TransportResult<()> {
        let file = self.file.take().ok_or(PrinterError::SurfaceClosed)?;

        // lp only hands the file to the spooler and returns; the job itself is not awaited
        let status = Command::new(&self.command)
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                PrinterError::CapabilityUnavailable(format!("{}: {}", self.command, e))
            })?;

        if !status.success() {
            warn!(command = %self.command, %status, "Host print command rejected the job");
            return Err(PrinterError::TransferFailed(format!(
                "{} exited with {}",
                self.command, status
            )));
        }

        info!(command = %self.command, "Print job handed to host spooler");
        Ok(())
    }

    async fn close(&mut self) {
        self.file.take();
    }
}

fn style_options(document: &PrintDocument) -> Vec<String> {
    let style = &document.style;
    let mut options = vec![
        format!("cpi={:.0}", style.chars_per_inch()),
        format!("lpi={:.0}", style.lines_per_inch()),
    ];
    for side in ["left", "right", "top", "bottom"] {
        options.push(format!("page-{}={}", side, style.margin_pt));
    }
    if style.preformatted {
        options.push("wrap=false".to_string());
    }
    options
}

fn parse_destinations(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.split_whitespace().next().unwrap_or(line).to_string())
        .collect()
}

fn which(command: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then_some(candidate);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|path| path.is_file())
}
