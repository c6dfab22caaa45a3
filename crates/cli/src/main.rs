// fieldkit CLI - config-driven overlap resolution and attribute merges

mod exit_codes;
mod jobs;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fieldkit_recon::unique::ROW_LIMIT;
use fieldkit_recon::FieldType;

use exit_codes::{EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "fieldkit")]
#[command(about = "Overlap resolution and attribute merge policies for tabular layers")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). FIELDKIT_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job from a TOML config file
    #[command(after_help = "\
Examples:
  fieldkit run parcels.fieldkit.toml
  fieldkit run parcels.fieldkit.toml --json
  fieldkit run parcels.fieldkit.toml --write parcels.updated.csv
  fieldkit run overlaps.fieldkit.toml --output resolutions.json

Job kinds: merge, resolve, spatial_join, zones, select")]
    Run {
        /// Path to the job config file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write the JSON report to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the updated table here instead of over the input table
        #[arg(long)]
        write: Option<PathBuf>,

        /// Plan and report without writing the updated table
        #[arg(long)]
        dry_run: bool,
    },

    /// Load a job and run its pre-flight checks without writing anything
    #[command(after_help = "\
Examples:
  fieldkit validate parcels.fieldkit.toml")]
    Validate {
        /// Path to the job config file
        config: PathBuf,
    },

    /// List the distinct values of a column
    #[command(after_help = "\
Examples:
  fieldkit unique parcels.csv --field Zone --type integer
  fieldkit unique parcels.csv --field Owner --output owners.csv")]
    Unique {
        /// Input CSV file
        input: PathBuf,

        /// Column to list
        #[arg(long)]
        field: String,

        /// Field type the column is read as
        #[arg(long = "type", default_value = "string")]
        field_type: FieldType,

        /// Maximum number of values written
        #[arg(long, default_value_t = ROW_LIMIT)]
        limit: usize,

        /// Output JSON to stdout instead of one value per line
        #[arg(long)]
        json: bool,

        /// Write the values as a one-column CSV
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("FIELDKIT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { config, json, output, write, dry_run } => {
            jobs::cmd_run(config, json, output, write, dry_run)
        }
        Commands::Validate { config } => jobs::cmd_validate(config),
        Commands::Unique { input, field, field_type, limit, json, output } => {
            jobs::cmd_unique(input, field, field_type, limit, json, output)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    /// Engine error with its mapped exit code.
    pub fn job(err: fieldkit_recon::ReconError) -> Self {
        let code = exit_codes::job_exit_code(&err);
        let hint = match &err {
            fieldkit_recon::ReconError::MissingColumn { .. } => {
                Some("check the column names in the config against the CSV header".to_string())
            }
            fieldkit_recon::ReconError::AmbiguousField { .. } => {
                Some("map each target field from exactly one source field".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
