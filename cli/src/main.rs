use std::{path::PathBuf, process::ExitCode};

use clap::{CommandFactory, Parser, Subcommand};
use cli::handlers::{handle_list, handle_run, handle_show_key};

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and verify every row of a scenario table
    Run {
        /// Engine config (JSON); TILESMITH_* variables apply on top
        #[arg(long)]
        config: Option<PathBuf>,
        /// Scenario table (JSON); defaults to the built-in rows
        #[arg(long)]
        rows: Option<PathBuf>,
        /// Seed for operand fills
        #[arg(long, default_value_t = 2024)]
        seed: u64,
        /// Where to write the JSON report
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// List scenario rows and their specialization keys
    List {
        /// Scenario table (JSON); defaults to the built-in rows
        #[arg(long)]
        rows: Option<PathBuf>,
    },
    /// Decode a specialization key and validate the descriptor it names
    ShowKey {
        key: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Some(Commands::Run {
            config,
            rows,
            seed,
            json,
        }) => handle_run(config.as_deref(), rows.as_deref(), seed, json.as_deref()),
        Some(Commands::List {
            rows,
        }) => handle_list(rows.as_deref()),
        Some(Commands::ShowKey {
            key,
        }) => handle_show_key(&key),
        None => {
            let mut cmd = Cli::command();
            cmd.print_help().map_err(Into::into)
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        },
    }
}
