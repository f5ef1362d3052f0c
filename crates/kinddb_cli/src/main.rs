//! KindDB CLI
//!
//! Command-line tools for KindDB datastores and table exports.
//!
//! # Commands
//!
//! - `key encode` / `key decode` - Convert between key paths and URL-safe keys
//! - `inspect` - Summarize a datastore journal
//! - `verify` - Check journal integrity
//! - `export` - Export a JSON table file as CSV, NDJSON or Avro

mod commands;

use clap::{Parser, Subcommand};
use kinddb_warehouse::ExportFormat;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// KindDB command-line tools.
#[derive(Parser)]
#[command(name = "kinddb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the datastore journal file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode or decode keys
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Summarize a datastore journal
    Inspect {
        /// List individual records
        #[arg(short, long)]
        records: bool,

        /// Maximum number of records to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify {
        /// Treat a torn tail as an error
        #[arg(short, long)]
        strict: bool,
    },

    /// Export a JSON table file
    Export {
        /// Table file with `schema` and `rows`
        input: PathBuf,

        /// Directory for the exported files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Export format (CSV, NEWLINE_DELIMITED_JSON, AVRO)
        #[arg(short, long, default_value = "CSV")]
        format: ExportFormat,

        /// Rows per file; writes numbered shards when set
        #[arg(long)]
        page_size: Option<usize>,

        /// Seconds to wait for the export job
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Omit the CSV header line
        #[arg(long)]
        no_header: bool,

        /// CSV column separator
        #[arg(long, default_value = ",")]
        delimiter: char,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum KeyAction {
    /// Build a key from Kind:id pairs, root first, and print it URL-safe
    Encode {
        /// Path pairs such as Account:sandy@foo.com Message:123
        #[arg(required = true)]
        pairs: Vec<String>,

        /// Application id
        #[arg(long)]
        app: Option<String>,

        /// Namespace
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Print the parts of a URL-safe key
    Decode {
        /// URL-safe key
        urlsafe: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Key { action } => match action {
            KeyAction::Encode {
                pairs,
                app,
                namespace,
            } => commands::key::encode(&pairs, app.as_deref(), namespace.as_deref())?,
            KeyAction::Decode { urlsafe, format } => commands::key::decode(&urlsafe, &format)?,
        },
        Commands::Inspect {
            records,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Journal path required for inspect")?;
            commands::inspect::run(&path, records, limit, &format)?;
        }
        Commands::Verify { strict } => {
            let path = cli.path.ok_or("Journal path required for verify")?;
            commands::verify::run(&path, strict)?;
        }
        Commands::Export {
            input,
            output_dir,
            format,
            page_size,
            timeout,
            no_header,
            delimiter,
        } => {
            commands::export::run(&commands::export::ExportArgs {
                input,
                output_dir,
                format,
                page_size,
                timeout: Duration::from_secs(timeout),
                print_header: !no_header,
                field_delimiter: delimiter,
            })?;
        }
        Commands::Version => {
            println!("KindDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("KindDB Core v{}", kinddb_core::VERSION);
        }
    }

    Ok(())
}
