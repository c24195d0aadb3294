use anyhow::Result;
use clap::Parser;

use networkd_manager::cli::{self, Command};
use networkd_manager::commands::{self, CommandSetup, system::Report};
use networkd_manager::logging;

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();
    logging::init_subscriber(args.verbose, args.command.name());

    if matches!(args.command, Command::Version) {
        commands::version::run();
        return Ok(());
    }

    let setup = CommandSetup::init(&args.global)?;
    match &args.command {
        Command::Convert(opts) => commands::convert::run_convert(&setup, opts),
        Command::Render(opts) => commands::convert::run_render(&setup, opts),
        Command::SchemaVersion(opts) => commands::convert::run_schema_version(&setup, opts),
        Command::Files(command) => commands::files::run(&setup, command),
        Command::Apply(opts) => commands::system::run_apply(&setup, opts),
        Command::Links => commands::system::run_links(&setup),
        Command::Global(command) => commands::system::run_global(&setup, command),
        Command::Reload => commands::system::run_report(&setup, Report::Reload),
        Command::Routes => commands::system::run_report(&setup, Report::Routes),
        Command::Rules => commands::system::run_report(&setup, Report::Rules),
        Command::Logs => commands::system::run_report(&setup, Report::Logs),
        Command::Hosts(command) => commands::hosts::run(&setup, command),
        Command::Version => Ok(()),
    }
}
