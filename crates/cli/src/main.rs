use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod files;
mod settings;

use commands::{PayloadKind, RunContext};
use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "recast", version, about = "Map, project and canonicalize record sets")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true, env = "RECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Fail on the first value a cast cannot convert
    #[arg(long, global = true)]
    strict: bool,

    /// Override the reference cache TTL in seconds
    #[arg(long, global = true, env = "RECAST_TTL_SECONDS")]
    ttl_secs: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rename and cast rows into documents with a mapping
    Transform {
        #[arg(long)]
        mapping: PathBuf,
        /// Rows as a JSON array or CSV
        #[arg(long)]
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Select and rename document fields into table columns
    Project {
        #[arg(long)]
        mapping: PathBuf,
        #[arg(long)]
        input: PathBuf,
        /// Output file; `.csv` writes CSV, anything else JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Nest child tables under their parents as described by a plan file
    Denormalize {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Convert a raw provider payload into canonical accounts or transactions
    Canonicalize {
        #[arg(long)]
        input: PathBuf,
        /// Payload kind (detected from the top-level key when omitted)
        #[arg(long, value_enum)]
        kind: Option<PayloadKind>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(ttl) = cli.ttl_secs {
        settings.ttl_secs = ttl;
        settings.validate()?;
    }
    let ctx = RunContext {
        strict: cli.strict || settings.strict_casts,
        settings,
    };

    match cli.command {
        Command::Transform {
            mapping,
            input,
            output,
        } => commands::run_transform(&ctx, &mapping, &input, output.as_deref()),
        Command::Project {
            mapping,
            input,
            output,
        } => commands::run_project(&ctx, &mapping, &input, output.as_deref()),
        Command::Denormalize { plan, output } => {
            commands::run_denormalize(&ctx, &plan, output.as_deref())
        }
        Command::Canonicalize {
            input,
            kind,
            output,
        } => commands::run_canonicalize(&ctx, &input, kind, output.as_deref()),
    }
}
