//! Commands: `files list|show|cat|write|delete`.
use anyhow::{Context as _, Result};

use super::{CommandSetup, print_json, print_text, read_input};
use crate::cli::{FilesCommand, ListOpts, WriteOpts};
use crate::convert::ConfigDocument;
use crate::schema::ConfigKind;
use crate::service::{FileInfo, MatchCriteria};

/// Run a `files` subcommand.
///
/// # Errors
///
/// Returns an error if the host cannot be reached or the file operation
/// fails.
pub fn run(setup: &CommandSetup, command: &FilesCommand) -> Result<()> {
    let service = &setup.service;
    let host = setup.host.as_str();
    match command {
        FilesCommand::List(opts) => print_json(&list(setup, opts)?),
        FilesCommand::Show { filename } => {
            let (_, document) = service.read_config(host, filename)?;
            print_json(&document)
        }
        FilesCommand::Cat { filename } => {
            print_text(&service.read_raw(host, filename)?);
            Ok(())
        }
        FilesCommand::Write(opts) => write(setup, opts),
        FilesCommand::Delete { filename } => {
            service.delete_config(host, filename)?;
            tracing::info!("deleted {filename}");
            Ok(())
        }
    }
}

fn list(setup: &CommandSetup, opts: &ListOpts) -> Result<Vec<FileInfo>> {
    let criteria = MatchCriteria {
        name: opts.name.clone(),
        mac: opts.mac.clone(),
        kind: opts.link_type.clone(),
    };
    let kinds = opts
        .kind
        .map_or_else(|| ConfigKind::FILE_KINDS.to_vec(), |kind| vec![kind]);

    let mut files = Vec::new();
    for kind in kinds {
        files.extend(
            setup
                .service
                .list_configs(&setup.host, kind, Some(&criteria))?,
        );
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

fn write(setup: &CommandSetup, opts: &WriteOpts) -> Result<()> {
    let input = read_input(opts.input.as_deref())?;
    if opts.raw {
        setup.service.write_raw(&setup.host, &opts.filename, &input)?;
    } else {
        let document: ConfigDocument =
            serde_json::from_str(&input).context("input is not a configuration document")?;
        setup
            .service
            .write_config(&setup.host, &opts.filename, &document)?;
    }
    tracing::info!("wrote {}", opts.filename);
    Ok(())
}
