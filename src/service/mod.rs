//! Orchestration of schemas, conversion and host connectors.
//!
//! [`NetworkdService`] is the single entry point used by the command-line
//! front end. Every host-facing operation takes a host identifier (empty or
//! `"local"` for this machine) and runs through the [`ConnectorPool`] so that
//! remote calls are bounded by the configured command timeout.
pub mod listing;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;

use crate::config::Settings;
use crate::connector::{
    ConnectorPool, HostConnector, Link, LocalConnector, OpenSshTransport,
};
use crate::convert::{self, ConfigDocument};
use crate::error::{ConnectorError, Error, Result};
use crate::hosts::HostRegistry;
use crate::schema::{ConfigKind, RepeatableSections, SchemaGeneration, SchemaStore, parse_networkctl_version};

pub use listing::{ConfigSummary, FileInfo, MatchCriteria};

/// Manages systemd-networkd configuration on local and remote hosts.
#[derive(Debug)]
pub struct NetworkdService {
    settings: Settings,
    schemas: SchemaStore,
    pool: ConnectorPool,
    host_generations: Mutex<HashMap<String, u32>>,
}

impl NetworkdService {
    /// Service over explicit parts.
    #[must_use]
    pub fn new(settings: Settings, schemas: SchemaStore, pool: ConnectorPool) -> Self {
        Self {
            settings,
            schemas,
            pool,
            host_generations: Mutex::new(HashMap::new()),
        }
    }

    /// Service wired from settings: local filesystem access, the host
    /// registry in the data directory and the system `ssh` client.
    ///
    /// # Errors
    ///
    /// Returns an error if the host registry exists but cannot be read.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let schemas = SchemaStore::open(&settings.schema_dir, settings.default_schema_version);
        let registry = Arc::new(HostRegistry::load(&settings.data_dir)?);
        let local = Arc::new(LocalConnector::new(
            &settings.config_dir,
            &settings.global_config_path,
        ));
        let transport = Arc::new(OpenSshTransport::new(
            &settings.remote.control_dir,
            settings.remote.connect_timeout_secs,
        ));
        let pool = ConnectorPool::new(local, registry, transport, settings.remote.clone());
        Ok(Self::new(settings, schemas, pool))
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Installed schema generations.
    #[must_use]
    pub const fn schemas(&self) -> &SchemaStore {
        &self.schemas
    }

    /// Registered remote hosts.
    #[must_use]
    pub fn hosts(&self) -> &HostRegistry {
        self.pool.registry()
    }

    /// Forget the cached connector and generation for `host`.
    pub fn invalidate_host(&self, host: &str) {
        self.pool.invalidate(host);
        self.host_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host);
    }

    // -----------------------------------------------------------------------
    // Conversion
    // -----------------------------------------------------------------------

    /// Parse configuration text of `kind` using schema `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unavailable generation or structurally
    /// unreadable text.
    pub fn convert(&self, text: &str, kind: ConfigKind, generation: u32) -> Result<ConfigDocument> {
        let (schema, repeatable) = self.conversion_context(generation)?;
        Ok(convert::to_document(text, &schema.types, &repeatable, kind)?)
    }

    /// Render a document of `kind` as configuration text using schema
    /// `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error for an unavailable generation, or for a document
    /// holding names or values that cannot be written as configuration text.
    pub fn render(&self, document: &ConfigDocument, kind: ConfigKind, generation: u32) -> Result<String> {
        let (schema, _) = self.conversion_context(generation)?;
        Ok(convert::to_text(document, &schema.types, kind)?)
    }

    /// Best-fit installed generation for a detected runtime version.
    #[must_use]
    pub fn resolve_schema_generation(&self, detected: &str) -> u32 {
        self.schemas.resolve(detected)
    }

    /// Generation matching the systemd version running on `host`.
    ///
    /// The answer is cached per host until [`Self::invalidate_host`].
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be reached.
    pub fn host_schema_generation(&self, host: &str) -> Result<u32> {
        let key = host_key(host);
        if let Some(cached) = self
            .host_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(*cached);
        }

        let output = self.pool.call(host, |c| Ok(c.runtime_version()))?;
        let detected = parse_networkctl_version(&output).map_or_else(String::new, |v| v.to_string());
        if detected.is_empty() {
            tracing::warn!("could not detect systemd version on {key}, using default schema");
        }
        let generation = self.resolve_schema_generation(&detected);
        tracing::info!("{key}: systemd {detected} uses schema generation v{generation}");

        self.host_generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, generation);
        Ok(generation)
    }

    /// Loaded generation plus the effective repeatable set.
    ///
    /// With no generations installed at all, conversion falls back to an
    /// empty schema: every key is a string and only the configured
    /// repeatable sections repeat.
    fn conversion_context(&self, version: u32) -> Result<(Arc<SchemaGeneration>, RepeatableSections)> {
        let schema = if self.schemas.available().is_empty() {
            tracing::warn!("no schemas installed, converting v{version} untyped");
            Arc::new(SchemaGeneration::from_documents(version, Vec::new()))
        } else {
            self.schemas.generation(version)?
        };
        let repeatable = schema.repeatable.merged_with(&self.settings.repeatable_sections);
        Ok((schema, repeatable))
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    /// Configuration files of `kind` on `host`, sorted by name.
    ///
    /// Files that cannot be read or parsed are listed without a summary.
    /// `criteria` filters network and link files on their `[Match]` section;
    /// netdev files are never filtered.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or the host cannot
    /// be reached.
    pub fn list_configs(
        &self,
        host: &str,
        kind: ConfigKind,
        criteria: Option<&MatchCriteria>,
    ) -> Result<Vec<FileInfo>> {
        if !ConfigKind::FILE_KINDS.contains(&kind) {
            return Err(Error::UnknownKind(kind.to_string()));
        }
        let generation = self.host_schema_generation(host)?;
        let (schema, repeatable) = self.conversion_context(generation)?;

        let contents = self.pool.call(host, move |c| {
            let mut names: Vec<String> = c
                .list_entries()?
                .into_iter()
                .filter(|entry| !entry.is_dir && ConfigKind::from_filename(&entry.name) == Some(kind))
                .map(|entry| entry.name)
                .collect();
            names.sort();
            Ok(names
                .into_par_iter()
                .map(|name| {
                    let content = c.read_file(&name);
                    (name, content)
                })
                .collect::<Vec<_>>())
        })?;

        let filter = criteria.filter(|c| !c.is_empty() && kind != ConfigKind::NetDev);
        let files: Vec<FileInfo> = contents
            .into_par_iter()
            .filter_map(|(name, content)| {
                let bare = FileInfo::bare(name, kind);
                let document = match content {
                    Ok(bytes) => convert::to_document(
                        &String::from_utf8_lossy(&bytes),
                        &schema.types,
                        &repeatable,
                        kind,
                    )
                    .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match document {
                    Ok(document) => {
                        if filter.is_some_and(|f| !f.matches(&document)) {
                            return None;
                        }
                        Some(bare.describe(&document))
                    }
                    Err(e) => {
                        tracing::debug!("{}: no summary: {e}", bare.filename);
                        Some(bare)
                    }
                }
            })
            .collect();
        tracing::debug!("{}: {} {kind} file(s)", host_key(host), files.len());
        Ok(files)
    }

    // -----------------------------------------------------------------------
    // File operations
    // -----------------------------------------------------------------------

    /// Read and convert one configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] for an unsafe name, or an error if
    /// the file cannot be read or parsed.
    pub fn read_config(&self, host: &str, filename: &str) -> Result<(ConfigKind, ConfigDocument)> {
        let kind = validate_filename(filename)?;
        let text = self.read_raw(host, filename)?;
        let generation = self.host_schema_generation(host)?;
        Ok((kind, self.convert(&text, kind, generation)?))
    }

    /// Render and write one configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] for an unsafe name, or an error if
    /// the file cannot be written.
    pub fn write_config(&self, host: &str, filename: &str, document: &ConfigDocument) -> Result<()> {
        let kind = validate_filename(filename)?;
        let generation = self.host_schema_generation(host)?;
        let text = self.render(document, kind, generation)?;
        self.write_raw(host, filename, &text)
    }

    /// Delete one configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] for an unsafe name, or an error if
    /// the file cannot be removed.
    pub fn delete_config(&self, host: &str, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        let name = filename.to_string();
        self.pool.call(host, move |c| c.delete_file(&name))?;
        tracing::info!("deleted {filename} on {}", host_key(host));
        Ok(())
    }

    /// Unconverted content of one configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] for an unsafe name, or an error if
    /// the file cannot be read.
    pub fn read_raw(&self, host: &str, filename: &str) -> Result<String> {
        validate_filename(filename)?;
        let name = filename.to_string();
        let bytes = self.pool.call(host, move |c| c.read_file(&name))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write configuration text unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilename`] for an unsafe name, or an error if
    /// the file cannot be written.
    pub fn write_raw(&self, host: &str, filename: &str, content: &str) -> Result<()> {
        validate_filename(filename)?;
        let name = filename.to_string();
        let bytes = content.as_bytes().to_vec();
        self.pool.call(host, move |c| c.write_file(&name, &bytes))?;
        tracing::info!("wrote {filename} on {}", host_key(host));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // System operations
    // -----------------------------------------------------------------------

    /// Reconfigure `devices`, or reload everything when empty.
    ///
    /// # Errors
    ///
    /// Returns an error if `networkctl` fails or the host cannot be reached.
    pub fn apply(&self, host: &str, devices: &[String]) -> Result<()> {
        let devices = devices.to_vec();
        self.pool.call(host, move |c| c.apply(&devices))?;
        Ok(())
    }

    /// Links known to systemd-networkd.
    ///
    /// # Errors
    ///
    /// Returns an error if the link list cannot be obtained.
    pub fn links(&self, host: &str) -> Result<Vec<Link>> {
        Ok(self.pool.call(host, |c| c.list_links())?)
    }

    /// Text of the global `networkd.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn global_config(&self, host: &str) -> Result<String> {
        Ok(self.pool.call(host, |c| c.global_config())?)
    }

    /// The global `networkd.conf` as a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn global_config_document(&self, host: &str) -> Result<ConfigDocument> {
        let text = self.global_config(host)?;
        let generation = self.host_schema_generation(host)?;
        self.convert(&text, ConfigKind::NetworkdConf, generation)
    }

    /// Replace the global `networkd.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn set_global_config(&self, host: &str, content: &str) -> Result<()> {
        let content = content.to_string();
        self.pool.call(host, move |c| c.set_global_config(&content))?;
        tracing::info!("updated global configuration on {}", host_key(host));
        Ok(())
    }

    /// `networkctl reload` output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn reload(&self, host: &str) -> Result<String> {
        self.text(host, |c| c.reload())
    }

    /// Routing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn routes(&self, host: &str) -> Result<String> {
        self.text(host, |c| c.routes())
    }

    /// Routing policy rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn rules(&self, host: &str) -> Result<String> {
        self.text(host, |c| c.rules())
    }

    /// Recent systemd-networkd journal lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn logs(&self, host: &str) -> Result<String> {
        self.text(host, |c| c.logs())
    }

    fn text<F>(&self, host: &str, op: F) -> Result<String>
    where
        F: FnOnce(&dyn HostConnector) -> std::result::Result<String, ConnectorError> + Send + 'static,
    {
        Ok(self.pool.call(host, op)?)
    }
}

/// Check that `filename` names a file directly inside the configuration
/// directory and return its kind.
///
/// # Errors
///
/// Returns [`Error::InvalidFilename`] for an empty name, a name containing
/// `/`, `..` or NUL, or one without a `.network`, `.netdev` or `.link`
/// extension.
pub fn validate_filename(filename: &str) -> Result<ConfigKind> {
    let unsafe_name = filename.is_empty()
        || filename.contains('/')
        || filename.contains("..")
        || filename.contains('\0');
    if unsafe_name {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    ConfigKind::from_filename(filename).ok_or_else(|| Error::InvalidFilename(filename.to_string()))
}

fn host_key(host: &str) -> String {
    if host.is_empty() {
        crate::connector::LOCAL_HOST.to_string()
    } else {
        host.to_string()
    }
}
