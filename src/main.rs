use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use assetpipe::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    if matches!(args.command, cli::Command::Version) {
        commands::version::run();
        return Ok(());
    }

    let command = args.command.log_name();
    let timestamps = args.global.timestamps || matches!(args.command, cli::Command::Watch(_));
    logging::init_subscriber(args.verbose, command, timestamps);
    let log = Arc::new(logging::Logger::new(command));

    match &args.command {
        cli::Command::Run(opts) => commands::run::run(&args.global, opts, &log),
        cli::Command::Watch(opts) => commands::watch::run(&args.global, opts, &log),
        cli::Command::List => commands::list::run(&args.global, &log),
        cli::Command::Version => Ok(()),
    }
}
