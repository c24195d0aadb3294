//! Commands that act on the running daemon: `apply`, `links`, `global`,
//! `reload`, `routes`, `rules` and `logs`.
use anyhow::Result;

use super::{CommandSetup, print_json, print_text, read_input};
use crate::cli::{ApplyOpts, GlobalCommand};

/// Reconfigure the given devices, or reload everything.
///
/// # Errors
///
/// Returns an error if `networkctl` fails.
pub fn run_apply(setup: &CommandSetup, opts: &ApplyOpts) -> Result<()> {
    setup.service.apply(&setup.host, &opts.devices)?;
    if opts.devices.is_empty() {
        tracing::info!("reloaded systemd-networkd on {}", setup.host);
    } else {
        tracing::info!("reconfigured {}", opts.devices.join(", "));
    }
    Ok(())
}

/// Print the link list as JSON.
///
/// # Errors
///
/// Returns an error if the links cannot be listed.
pub fn run_links(setup: &CommandSetup) -> Result<()> {
    print_json(&setup.service.links(&setup.host)?)
}

/// Show or replace `networkd.conf`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or written.
pub fn run_global(setup: &CommandSetup, command: &GlobalCommand) -> Result<()> {
    match command {
        GlobalCommand::Show { raw: true } => {
            print_text(&setup.service.global_config(&setup.host)?);
            Ok(())
        }
        GlobalCommand::Show { raw: false } => {
            print_json(&setup.service.global_config_document(&setup.host)?)
        }
        GlobalCommand::Set { input } => {
            let text = read_input(input.as_deref())?;
            setup.service.set_global_config(&setup.host, &text)?;
            tracing::info!("updated networkd.conf on {}", setup.host);
            Ok(())
        }
    }
}

/// Which plain-text report to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// `networkctl reload` output.
    Reload,
    /// Routing tables.
    Routes,
    /// Policy rules.
    Rules,
    /// Daemon journal.
    Logs,
}

/// Print one plain-text report.
///
/// # Errors
///
/// Returns an error if the underlying command fails.
pub fn run_report(setup: &CommandSetup, report: Report) -> Result<()> {
    let service = &setup.service;
    let host = setup.host.as_str();
    let text = match report {
        Report::Reload => service.reload(host)?,
        Report::Routes => service.routes(host)?,
        Report::Rules => service.rules(host)?,
        Report::Logs => service.logs(host)?,
    };
    print_text(&text);
    Ok(())
}
