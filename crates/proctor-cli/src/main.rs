//! proctor CLI — operator tooling for assessment delivery.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Timed assessment session tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a test map TOML file
    Validate {
        /// Path to the test map
        #[arg(long)]
        map: PathBuf,
    },

    /// Replay an exported action snapshot against a test map
    Replay {
        /// Path to the test map
        #[arg(long)]
        map: PathBuf,

        /// Path to the exported queue snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,

        /// Print per-scope durations after the replay
        #[arg(long)]
        durations: bool,
    },

    /// Inspect an exported queue snapshot
    Inspect {
        /// Path to the exported queue snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("proctor=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { map } => commands::validate::execute(map),
        Commands::Replay {
            map,
            snapshot,
            durations,
        } => commands::replay::execute(map, snapshot, durations).await,
        Commands::Inspect { snapshot } => commands::inspect::execute(snapshot),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
