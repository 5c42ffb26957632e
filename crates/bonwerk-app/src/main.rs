// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bonwerk — local receipt-printer proxy.
//
// Entry point. Initialises logging and backend services, then either runs the
// printer registry until interrupted or performs a single command.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{error, info};

use bonwerk_core::api::{PrintRequest, PrintResponse};
use bonwerk_core::error::Result;
use bonwerk_core::types::{Alignment, FontSize, PrintOptions};

use services::app_services::AppServices;

/// Bonwerk - receipt printer proxy
#[derive(Parser, Debug)]
#[command(name = "bonwerk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (overrides BONWERK_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep the printer list fresh until interrupted (default)
    Run,

    /// List known printers as JSON
    Printers {
        /// Rediscover instead of serving the cache
        #[arg(long)]
        refresh: bool,
    },

    /// Print the test page
    Test {
        /// Printer id, name or address (omit for the first online printer)
        printer: Option<String>,
    },

    /// Print a text receipt read from FILE or stdin
    Print {
        /// Text file to print; `-` or omitted reads stdin
        file: Option<PathBuf>,

        /// Printer id, name or address (omit for the first online printer)
        #[arg(long, short)]
        printer: Option<String>,

        #[arg(long, value_enum)]
        align: Option<AlignArg>,

        #[arg(long, value_enum)]
        size: Option<SizeArg>,

        #[arg(long)]
        bold: bool,

        /// Do not feed and cut after the receipt
        #[arg(long)]
        no_cut: bool,

        /// CP866, Windows-1251 or UTF-8
        #[arg(long)]
        encoding: Option<String>,
    },

    /// Show the effective config; `--write` saves it to the config file
    Config {
        #[arg(long)]
        write: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlignArg {
    Left,
    Center,
    Right,
}

impl From<AlignArg> for Alignment {
    fn from(arg: AlignArg) -> Self {
        match arg {
            AlignArg::Left => Alignment::Left,
            AlignArg::Center => Alignment::Center,
            AlignArg::Right => Alignment::Right,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SizeArg {
    Small,
    Normal,
    Large,
}

impl From<SizeArg> for FontSize {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Small => FontSize::Small,
            SizeArg::Normal => FontSize::Normal,
            SizeArg::Large => FontSize::Large,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, code = e.code(), "bonwerk failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let services = match cli.config {
        Some(path) => AppServices::with_config_path(path)?,
        None => AppServices::init()?,
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            serve(&services).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Printers { refresh } => {
            let listing = if refresh {
                services.print().refresh_printers().await
            } else {
                services.print().list_printers().await
            };
            emit(&serde_json::to_value(listing)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Test { printer } => {
            let response = services.print().print_test(printer.as_deref()).await;
            respond(response)
        }
        Commands::Print {
            file,
            printer,
            align,
            size,
            bold,
            no_cut,
            encoding,
        } => {
            let content = read_content(file).await?;
            let options = PrintOptions {
                font_size: size.map(FontSize::from),
                alignment: align.map(Alignment::from),
                cut_paper: no_cut.then_some(false),
                bold: bold.then_some(true),
                encoding,
            };
            let response = services
                .print()
                .print(PrintRequest {
                    printer_identifier: printer,
                    content,
                    options: Some(options),
                })
                .await;
            respond(response)
        }
        Commands::Config { write } => {
            let config = services.config();
            if write {
                services.save_config(&config)?;
                info!(path = %services.config_path().display(), "config written");
            }
            emit(&serde_json::to_value(config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Run the background refresh until Ctrl-C.
async fn serve(services: &AppServices) -> Result<()> {
    info!("Bonwerk starting");
    services.start();

    let listing = services.print().list_printers().await;
    info!(count = listing.count, "printers available");
    for printer in &listing.printers {
        info!(
            id = %printer.id,
            name = %printer.name,
            connection = %printer.connection_type,
            status = %printer.status,
            "printer"
        );
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    services.shutdown().await;
    info!(stats = ?services.print().queue_stats(), "Bonwerk stopped");
    Ok(())
}

async fn read_content(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) if path.as_os_str() != "-" => Ok(tokio::fs::read_to_string(path).await?),
        _ => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            Ok(content)
        }
    }
}

fn respond(response: PrintResponse) -> Result<ExitCode> {
    let success = response.success;
    emit(&serde_json::to_value(response)?);
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn emit(value: &Value) {
    println!("{value:#}");
}
