//! Registry of remote hosts, persisted as `hosts.json` in the data directory.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::connector::LOCAL_HOST;
use crate::error::HostRegistryError;

/// Registry file name inside the data directory.
pub const HOSTS_FILE: &str = "hosts.json";

const fn default_port() -> u16 {
    22
}

/// Connection details for one remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Identifier used to select the host.
    pub name: String,
    /// Hostname or address.
    pub host: String,
    /// Login user; empty means the client's default.
    #[serde(default)]
    pub user: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key used for authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

impl HostEntry {
    /// Check that the entry can be handed to `ssh` as a destination.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or reserved name, an empty address, or
    /// an address or user that starts with `-` or contains `@`, whitespace
    /// or control characters.
    pub fn validate(&self) -> Result<(), HostRegistryError> {
        if self.name.trim().is_empty() {
            return Err(HostRegistryError::EmptyName);
        }
        if self.name == LOCAL_HOST {
            return Err(HostRegistryError::Reserved(self.name.clone()));
        }
        if self.host.is_empty() || !is_destination_part(&self.host) {
            return Err(self.invalid("address", &self.host));
        }
        if !self.user.is_empty() && !is_destination_part(&self.user) {
            return Err(self.invalid("user", &self.user));
        }
        Ok(())
    }

    fn invalid(&self, field: &'static str, value: &str) -> HostRegistryError {
        HostRegistryError::InvalidField {
            name: self.name.clone(),
            field,
            value: value.to_string(),
        }
    }

    /// `user@host`, or just `host` without a user.
    #[must_use]
    pub fn destination(&self) -> String {
        if self.user.is_empty() {
            self.host.clone()
        } else {
            format!("{}@{}", self.user, self.host)
        }
    }
}

fn is_destination_part(text: &str) -> bool {
    !text.starts_with('-')
        && !text
            .chars()
            .any(|c| c == '@' || c.is_whitespace() || c.is_control())
}

/// Thread-safe host registry backed by a JSON file.
#[derive(Debug)]
pub struct HostRegistry {
    path: PathBuf,
    hosts: RwLock<BTreeMap<String, HostEntry>>,
}

impl HostRegistry {
    /// Load `hosts.json` from `data_dir`; a missing file is an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(data_dir: &Path) -> Result<Self, HostRegistryError> {
        let path = data_dir.join(HOSTS_FILE);
        let hosts = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| HostRegistryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let entries: Vec<HostEntry> =
                serde_json::from_str(&content).map_err(|source| HostRegistryError::Json {
                    path: path.display().to_string(),
                    source,
                })?;
            entries
                .into_iter()
                .filter(|h| match h.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("skipping entry in {}: {e}", path.display());
                        false
                    }
                })
                .map(|h| (h.name.clone(), h))
                .collect()
        } else {
            tracing::debug!("no host registry at {}", path.display());
            BTreeMap::new()
        };
        Ok(Self {
            path,
            hosts: RwLock::new(hosts),
        })
    }

    /// Look up a host by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<HostEntry> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All hosts, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<HostEntry> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Add or replace a host and persist the registry.
    ///
    /// # Errors
    ///
    /// Returns an error for an entry rejected by [`HostEntry::validate`], or
    /// if the registry cannot be written.
    pub fn add(&self, entry: HostEntry) -> Result<(), HostRegistryError> {
        entry.validate()?;
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        let name = entry.name.clone();
        let previous = hosts.insert(name.clone(), entry);
        if let Err(e) = self.persist(&hosts) {
            match previous {
                Some(old) => hosts.insert(name, old),
                None => hosts.remove(&name),
            };
            return Err(e);
        }
        tracing::info!("registered host {name}");
        Ok(())
    }

    /// Remove a host and persist the registry. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be written.
    pub fn remove(&self, name: &str) -> Result<bool, HostRegistryError> {
        let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
        let Some(removed) = hosts.remove(name) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&hosts) {
            hosts.insert(name.to_string(), removed);
            return Err(e);
        }
        tracing::info!("removed host {name}");
        Ok(true)
    }

    /// Write `hosts` as a pretty JSON array, creating the data directory.
    fn persist(&self, hosts: &BTreeMap<String, HostEntry>) -> Result<(), HostRegistryError> {
        let io_err = |source| HostRegistryError::Io {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let entries: Vec<&HostEntry> = hosts.values().collect();
        let json = serde_json::to_string_pretty(&entries).map_err(|source| HostRegistryError::Json {
            path: self.path.display().to_string(),
            source,
        })?;
        std::fs::write(&self.path, json + "\n").map_err(io_err)
    }
}
