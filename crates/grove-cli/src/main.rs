#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use grove_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "grove")]
#[command(author, version, about = "A task runner with an npm-compatible dependency installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON results on stdout and JSON logs on stderr
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Resolve fresh and overwrite lock profiles
    #[arg(long, global = true)]
    update_lock: bool,

    /// Ignore existing lock profiles and write none
    #[arg(long, global = true, conflicts_with = "update_lock")]
    no_lock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run tasks and everything they depend on
    Run {
        /// Task names, run in the order given
        #[arg(required = true)]
        tasks: Vec<String>,
    },

    /// List the tasks declared in grove.json
    Tasks,

    /// Resolve dependencies and print the tree without installing
    Tree {
        /// The resolve task to run
        #[arg(long, default_value = "resolve")]
        task: String,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_env_flags();
    if cli.update_lock {
        config = config.with_update_lock(true);
    }
    if cli.no_lock {
        config = config.with_use_lock(false).with_update_lock(false);
    }

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Commands::Run { tasks } => commands::run::run(config, &tasks),
        Commands::Tasks => commands::tasks::run(config),
        Commands::Tree { task } => commands::tree::run(config, &task),
        Commands::Version => commands::version::run(),
    }
}
