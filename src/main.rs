mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use memoflow::config_discovery::load_config_with_discovery;
use memoflow::{logging, TaskRegistry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(cli.verbose());

    let registry = TaskRegistry::builtin();

    match &cli.command {
        Commands::Check(args) => commands::check::run(args, &registry),
        Commands::Run(args) => {
            let config = load_config_with_discovery(cli.config.as_deref())?.unwrap_or_default();
            commands::run::run(args, config, registry)
        }
        Commands::Show(args) => commands::show::run(args, &registry),
    }
}
