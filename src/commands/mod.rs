//! Subcommand implementations.
//!
//! Each command builds a [`CommandSetup`], calls into the
//! [`NetworkdService`] and prints JSON or raw text on stdout.
pub mod convert;
pub mod files;
pub mod hosts;
pub mod system;
pub mod version;

use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;

use crate::cli::GlobalOpts;
use crate::config::{DEFAULT_SETTINGS_PATH, Settings};
use crate::service::NetworkdService;

/// Environment variable overriding the settings file location.
pub const SETTINGS_ENV: &str = "NETWORKD_MANAGER_CONFIG";

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Service wired from the loaded settings.
    pub service: NetworkdService,
    /// Target host selected with `--host`.
    pub host: String,
}

impl CommandSetup {
    /// Load settings and build the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file or the host registry cannot be
    /// read.
    pub fn init(global: &GlobalOpts) -> Result<Self> {
        let path = resolve_settings_path(global);
        let settings = Settings::load(&path)?;
        tracing::debug!("settings from {}", path.display());
        tracing::debug!("schema directory {}", settings.schema_dir.display());
        let service = NetworkdService::from_settings(settings)?;
        Ok(Self {
            service,
            host: global.host.clone(),
        })
    }
}

/// Settings file from `--config`, `$NETWORKD_MANAGER_CONFIG`, or the
/// system default.
#[must_use]
pub fn resolve_settings_path(global: &GlobalOpts) -> PathBuf {
    if let Some(ref path) = global.config {
        return path.clone();
    }
    std::env::var(SETTINGS_ENV).map_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH), PathBuf::from)
}

/// Read a whole input file, or stdin for `None` and `-`.
///
/// # Errors
///
/// Returns an error if the input cannot be read.
pub fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading stdin")?;
            Ok(text)
        }
    }
}

/// Print `value` as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
#[allow(clippy::print_stdout)]
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print command output on stdout, adding a final newline if missing.
#[allow(clippy::print_stdout)]
pub fn print_text(text: &str) {
    if text.is_empty() {
        return;
    }
    if text.ends_with('\n') {
        print!("{text}");
    } else {
        println!("{text}");
    }
}
