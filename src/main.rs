use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

use rust_spanner_schema::snapshot::load_snapshot;
use rust_spanner_schema::{
    apply_edit_script, describe_graph, import_schema, ApplyOptions, Driver, ImportOptions,
    TargetDialect,
};

#[derive(Parser)]
#[command(name = "rust-spanner-schema")]
#[command(author, version, about = "Keep a converted Spanner schema consistent while editing it")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a source schema (JSON) into a new snapshot
    Import {
        /// Path to the source schema JSON file
        #[arg(short, long)]
        source: PathBuf,

        /// Source database driver (mysql, postgres, sqlserver, oracle, cassandra)
        #[arg(short, long, default_value = "mysql")]
        driver: Driver,

        /// Target dialect (google, postgres)
        #[arg(long, default_value = "google")]
        dialect: TargetDialect,

        /// Output path for the snapshot
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Apply an edit script (JSON) to a snapshot
    Apply {
        /// Path to the input snapshot
        #[arg(long)]
        snapshot: PathBuf,

        /// Path to the edit script
        #[arg(long)]
        script: PathBuf,

        /// Output path (defaults to overwriting the input snapshot)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the tables, keys, parents and issues of a snapshot
    Show {
        #[arg(long)]
        snapshot: PathBuf,

        /// Only show this table
        #[arg(short, long)]
        table: Option<String>,
    },

    /// Verify a snapshot's checksum and invariants
    Check {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Import {
            source,
            driver,
            dialect,
            output,
        } => {
            let options = ImportOptions {
                source_path: source,
                output_path: output,
                driver,
                dialect,
            };
            import_schema(options)?;
        }
        Commands::Apply {
            snapshot,
            script,
            output,
        } => {
            let options = ApplyOptions {
                snapshot_path: snapshot,
                script_path: script,
                output_path: output,
                verbose: cli.verbose,
            };
            apply_edit_script(options)?;
        }
        Commands::Show { snapshot, table } => {
            let document = load_snapshot(&snapshot)?;
            print!("{}", describe_graph(&document.graph, table.as_deref()));
        }
        Commands::Check { snapshot } => {
            let document = load_snapshot(&snapshot)?;
            println!(
                "OK: {} tables, format version {}, checksum {}",
                document.graph.tables.len(),
                document.format_version,
                document.checksum
            );
        }
    }

    Ok(())
}
