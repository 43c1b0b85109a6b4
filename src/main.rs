use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process;

use raw_loader::commands;
use raw_loader::commands::load::LoadArgs;
use raw_loader::display;
use raw_loader::logging;

/// raw_loader (rawload) CLI - PostgreSQL table to dataframe loader
#[derive(Parser)]
#[clap(
    name = "rawload",
    about = "raw_loader - load a PostgreSQL table into a partitioned dataframe",
    version
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the table and convert it into a partitioned dataframe
    Load {
        /// Path to the project file (defaults to ./raw_loader.yaml when present)
        #[clap(short, long)]
        config: Option<PathBuf>,

        /// Path to a .env file (defaults to the nearest .env when present)
        #[clap(short, long)]
        env_file: Option<PathBuf>,

        /// Table to read, optionally schema-qualified
        #[clap(short, long)]
        table: Option<String>,

        /// Number of dataframe partitions
        #[clap(short, long)]
        partitions: Option<usize>,

        /// Output format for the report (text, json)
        #[clap(short, long, default_value = "text")]
        format: String,
    },

    /// Show the column type mapping used for a table
    Schema {
        /// Path to the project file (defaults to ./raw_loader.yaml when present)
        #[clap(short, long)]
        config: Option<PathBuf>,

        /// Path to a .env file (defaults to the nearest .env when present)
        #[clap(short, long)]
        env_file: Option<PathBuf>,

        /// Table to describe, optionally schema-qualified
        #[clap(short, long)]
        table: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = logging::init_logging(cli.verbose) {
        eprintln!("{} {:#}", "Error:".red(), err);
        process::exit(1);
    }

    let result = match cli.command {
        Command::Load {
            config,
            env_file,
            table,
            partitions,
            format,
        } => {
            let args = LoadArgs {
                config,
                env_file,
                table,
                partitions,
                format,
            };
            commands::load::load_command(&args).await
        }
        Command::Schema {
            config,
            env_file,
            table,
        } => commands::schema::schema_command(config, env_file, table).await,
        Command::Version => {
            display::display_version();
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{} {:#}", "Error:".red(), err);
        process::exit(1);
    }
}
