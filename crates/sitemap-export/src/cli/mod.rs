//! Command-line surface of the `sitemap-export` binary.

pub mod export_cmd;
pub mod output;
pub mod progress;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Export search collections to sitemap files and a sitemap index.
#[derive(Debug, Parser)]
#[command(name = "sitemap-export", version, about)]
pub struct Cli {
    /// Search node URL
    #[arg(short = 'u', long = "db-uri")]
    pub db_uri: Option<String>,

    /// Public base URL of the site (required)
    #[arg(short = 'b', long)]
    pub base_url: Option<String>,

    /// Directory tag under /static/ where the files are published (required)
    #[arg(short = 'l', long)]
    pub location: Option<String>,

    /// Country code to slug reference file (JSON)
    #[arg(short = 'c', long)]
    pub countries: Option<PathBuf>,

    /// Restrict the export to one country code
    #[arg(short = 'd', long)]
    pub country: Option<String>,

    /// Dry run: log intended filenames without writing
    #[arg(short = 't', long = "test", visible_alias = "dry-run")]
    pub dry_run: bool,

    /// Output directory [default: sitemaps]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// JSON configuration file with targets and tuning
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// No spinner, no summary, warnings only
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Install the global tracing subscriber. Logs go to stderr.
///
/// `RUST_LOG` wins over the built-in default.
pub fn init_logging(format: LogFormat, quiet: bool) {
    let default = if quiet { "sitemap_export=warn" } else { "sitemap_export=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
