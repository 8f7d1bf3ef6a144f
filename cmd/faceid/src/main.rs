//! faceid CLI - inspect and maintain a face identity index.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{AdminCommand, FaceCommand};

/// faceid CLI - operate a face identity index from the shell.
///
/// Embeddings are read from JSON or YAML files holding a list of floats.
/// Identities and face images are kept in a redb database next to the index
/// snapshot.
#[derive(Parser)]
#[command(name = "faceid")]
#[command(about = "Face identity index CLI tool")]
#[command(version)]
pub struct Cli {
    /// Index config file (YAML). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Identity and image database
    #[arg(long, global = true, default_value = "faceid.redb")]
    pub db: String,

    /// Output file (default: stdout)
    #[arg(short = 'o', long, global = true)]
    pub output: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Face(FaceCommand),
    #[command(flatten)]
    Admin(AdminCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Face(cmd) => cmd.run(&cli),
        Commands::Admin(cmd) => cmd.run(&cli),
    }
}
