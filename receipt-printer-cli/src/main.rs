//! receipt-print: command line front end for the printer transports
//!
//! ```text
//! receipt-print caps
//! receipt-print discover
//! receipt-print print --transport usb --device 04b8:0e15 receipt.txt
//! echo "RECEIPT" | receipt-print print
//! ```

mod logger;

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use receipt_printer::{PrintRequest, PrinterConfig, PrinterManager, TransportKind};

#[derive(Parser, Debug)]
#[command(name = "receipt-print", version, about = "Send receipts to USB, serial or system printers")]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON", default_value_t = false, global = true)]
    log_json: bool,

    /// Serial port path, overrides PRINTER_SERIAL_PORT
    #[arg(long, global = true)]
    serial_port: Option<String>,

    /// Serial baud rate, overrides PRINTER_SERIAL_BAUD
    #[arg(long, global = true)]
    baud: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which transports this host offers
    Caps,
    /// List USB and system printers
    Discover,
    /// Print a preformatted receipt from a file or stdin
    Print {
        /// usb, serial or system
        #[arg(short, long, default_value = "system")]
        transport: TransportKind,

        /// Device id from `discover` to select before printing
        #[arg(short, long)]
        device: Option<String>,

        /// Receipt file, stdin when omitted
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logger::init_logger(&cli.log_level, cli.log_json)?;

    let mut config = PrinterConfig::from_env();
    if let Some(port) = cli.serial_port {
        config.serial_port = Some(port);
    }
    if let Some(baud) = cli.baud {
        config.serial_baud = baud;
    }
    tracing::debug!(?config, "Printer configuration loaded");

    let manager = Arc::new(PrinterManager::from_config(&config));

    // Ctrl+C tears down a print still waiting on its settle delay
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
                manager.shutdown();
            }
        });
    }

    match cli.command {
        Command::Caps => {
            let caps = manager.capabilities();
            println!("{}", serde_json::to_string_pretty(&caps)?);
            Ok(if caps.any() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Discover => {
            let devices = manager.discover_all().await;
            println!("{}", serde_json::to_string_pretty(&devices)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Print {
            transport,
            device,
            file,
        } => {
            let content = read_content(file.as_ref())?;

            if let Some(id) = device {
                manager.discover_all().await;
                manager
                    .select(&id)
                    .await
                    .with_context(|| format!("Cannot select device {}", id))?;
            }

            let result = manager
                .submit(PrintRequest::new(content).via(transport))
                .await;
            println!("{}", serde_json::to_string_pretty(&result)?);

            Ok(if result.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn read_content(file: Option<&PathBuf>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read stdin")?;
            Ok(content)
        }
    }
}
