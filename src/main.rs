//! CLI Entry Point for lab-logger
//!
//! # Usage
//!
//! Log one instrument from the equipment register:
//! ```bash
//! lab-logger start config/lab_logger.toml 12345
//! ```
//!
//! Dump stored readings as JSON lines:
//! ```bash
//! lab-logger query data/12345.sqlite3 --start 2024-06-01T00:00:00 --columns temperature,humidity
//! ```
//!
//! List the registered drivers and validators:
//! ```bash
//! lab-logger drivers
//! ```

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use lab_logger::app::{self, Registries};
use lab_logger::config::LoggerConfig;
use lab_logger::logging::{self, LoggingOptions};
use lab_logger::storage::query::{self, Query};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lab-logger")]
#[command(about = "Poll a laboratory instrument and log validated readings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log the instrument with the given serial number until a fatal error
    Start {
        /// Path to the TOML configuration file
        config: PathBuf,

        /// Serial number of the instrument in the equipment register
        serial: String,
    },

    /// Print stored readings as JSON lines
    Query {
        /// Path to a store file
        store: PathBuf,

        /// Only readings at or after this local time (YYYY-MM-DDTHH:MM:SS)
        #[arg(long, value_parser = parse_time)]
        start: Option<NaiveDateTime>,

        /// Only readings before this local time
        #[arg(long, value_parser = parse_time)]
        end: Option<NaiveDateTime>,

        /// Comma-separated field columns to print
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },

    /// List registered sensor patterns and validator names
    Drivers,
}

fn parse_time(text: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("cannot parse '{text}' as a local date/time"))
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { config, serial } => {
            if let Err(e) = start(config, serial) {
                // The operator acknowledges before the console closes
                eprintln!();
                eprintln!("❌ {e:#}");
                eprintln!();
                eprint!("Press <Enter> to exit...");
                let _ = std::io::stderr().flush();
                let _ = std::io::stdin().lock().read_line(&mut String::new());
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Query {
            store,
            start,
            end,
            columns,
        } => run_query(store, Query { start, end, columns }),
        Commands::Drivers => list_drivers(),
    };

    if let Err(e) = result {
        eprintln!("❌ {e:#}");
        std::process::exit(1);
    }
}

fn start(config_path: PathBuf, serial: String) -> Result<()> {
    let config = LoggerConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;
    logging::init(LoggingOptions::from_config(&config.logging)?)?;

    let registries = Registries::builtin()?;
    let mut controller = app::build_controller(&config, &serial, &registries)
        .with_context(|| format!("starting the logger for serial {serial}"))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(controller.run())?;
    Ok(())
}

fn run_query(store: PathBuf, query: Query) -> Result<()> {
    let selection = query::read(&store, &query)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in selection.to_json_lines() {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn list_drivers() -> Result<()> {
    let registries = Registries::builtin()?;
    println!("Sensor drivers (first match wins):");
    for pattern in registries.sensors.patterns() {
        println!("  {pattern}");
    }
    println!("Validators:");
    for name in registries.validators.patterns() {
        println!("  {name}");
    }
    Ok(())
}
