//! Commands: `convert`, `render` and `schema-version`.
use anyhow::{Context as _, Result};
use serde::Serialize;

use super::{CommandSetup, print_json, print_text, read_input};
use crate::cli::{ConvertOpts, SchemaVersionOpts};
use crate::convert::ConfigDocument;

/// Convert configuration text to a JSON document.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed.
pub fn run_convert(setup: &CommandSetup, opts: &ConvertOpts) -> Result<()> {
    let text = read_input(opts.input.as_deref())?;
    let generation = generation(setup, opts)?;
    let document = setup.service.convert(&text, opts.kind, generation)?;
    print_json(&document)
}

/// Render a JSON document as configuration text.
///
/// # Errors
///
/// Returns an error if the input cannot be read or is not a document.
pub fn run_render(setup: &CommandSetup, opts: &ConvertOpts) -> Result<()> {
    let json = read_input(opts.input.as_deref())?;
    let document: ConfigDocument =
        serde_json::from_str(&json).context("input is not a configuration document")?;
    let generation = generation(setup, opts)?;
    print_text(&setup.service.render(&document, opts.kind, generation)?);
    Ok(())
}

#[derive(Serialize)]
struct SchemaVersionReport<'a> {
    host: Option<&'a str>,
    detected: Option<&'a str>,
    generation: u32,
    available: Vec<u32>,
}

/// Show which schema generation applies.
///
/// # Errors
///
/// Returns an error if the target host cannot be probed.
pub fn run_schema_version(setup: &CommandSetup, opts: &SchemaVersionOpts) -> Result<()> {
    let (host, generation) = match opts.detected.as_deref() {
        Some(detected) => (None, setup.service.resolve_schema_generation(detected)),
        None => (
            Some(setup.host.as_str()),
            setup.service.host_schema_generation(&setup.host)?,
        ),
    };
    print_json(&SchemaVersionReport {
        host,
        detected: opts.detected.as_deref(),
        generation,
        available: setup.service.schemas().available().iter().copied().collect(),
    })
}

/// Generation from `--schema`, or the target host's.
fn generation(setup: &CommandSetup, opts: &ConvertOpts) -> Result<u32> {
    match opts.schema {
        Some(generation) => Ok(generation),
        None => Ok(setup.service.host_schema_generation(&setup.host)?),
    }
}
