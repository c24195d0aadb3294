//! Commands: `hosts list|add|remove`.
use anyhow::Result;

use super::{CommandSetup, print_json};
use crate::cli::{AddHostOpts, HostsCommand};
use crate::hosts::HostEntry;

/// Run a `hosts` subcommand.
///
/// # Errors
///
/// Returns an error if the registry cannot be updated or the host to remove
/// does not exist.
pub fn run(setup: &CommandSetup, command: &HostsCommand) -> Result<()> {
    let registry = setup.service.hosts();
    match command {
        HostsCommand::List => print_json(&registry.list()),
        HostsCommand::Add(opts) => {
            registry.add(entry(opts))?;
            setup.service.invalidate_host(&opts.name);
            Ok(())
        }
        HostsCommand::Remove { name } => {
            if !registry.remove(name)? {
                anyhow::bail!("host '{name}' is not registered");
            }
            setup.service.invalidate_host(name);
            Ok(())
        }
    }
}

fn entry(opts: &AddHostOpts) -> HostEntry {
    HostEntry {
        name: opts.name.clone(),
        host: opts.address.clone(),
        user: opts.user.clone(),
        port: opts.port,
        key_file: opts.key_file.clone(),
    }
}
