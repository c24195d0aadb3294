//! Host connectors: one capability bundle per target machine.
//!
//! [`HostConnector`] is implemented by [`LocalConnector`] (direct filesystem
//! and process access) and [`RemoteConnector`] (commands over an
//! authenticated remote shell). [`ConnectorPool`] selects the connector for a
//! host identifier.
pub mod links;
pub mod local;
pub mod pool;
pub mod remote;
pub mod shell;

use serde::Serialize;

use crate::error::ConnectorError;

pub use links::Link;
pub use local::LocalConnector;
pub use pool::ConnectorPool;
pub use remote::RemoteConnector;
pub use shell::{OpenSshTransport, ShellSession, ShellTransport, shell_quote};

/// Host identifier of the local connector.
pub const LOCAL_HOST: &str = "local";

/// Returned by [`HostConnector::global_config`] when the file does not exist.
pub const GLOBAL_CONFIG_PLACEHOLDER: &str =
    "# /etc/systemd/networkd.conf\n# No configuration file found.\n";

/// Number of journal lines returned by [`HostConnector::logs`].
pub const LOG_LINES: &str = "100";

/// One entry of a connector's configuration directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    /// File or directory name, without path.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl DirEntry {
    /// A regular file entry.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }
}

/// Configuration and system operations against one host.
///
/// File names are relative to the connector's configuration directory and
/// must already be validated by the caller.
pub trait HostConnector: Send + Sync + std::fmt::Debug {
    /// Host identifier, [`LOCAL_HOST`] for the local machine.
    fn host(&self) -> &str;

    /// Entries of the configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    fn list_entries(&self) -> Result<Vec<DirEntry>, ConnectorError>;

    /// Contents of a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read_file(&self, name: &str) -> Result<Vec<u8>, ConnectorError>;

    /// Create or replace a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write_file(&self, name: &str, content: &[u8]) -> Result<(), ConnectorError>;

    /// Remove a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    fn delete_file(&self, name: &str) -> Result<(), ConnectorError>;

    /// Reconfigure `devices`, or reload every link when `devices` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::CommandFailed`] with the captured output if
    /// `networkctl` fails.
    fn apply(&self, devices: &[String]) -> Result<(), ConnectorError>;

    /// Links known to systemd-networkd, with their addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if no link listing could be obtained.
    fn list_links(&self) -> Result<Vec<Link>, ConnectorError>;

    /// `networkctl --version` output, empty when the probe fails.
    fn runtime_version(&self) -> String;

    /// Global daemon configuration, or [`GLOBAL_CONFIG_PLACEHOLDER`] if the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    fn global_config(&self) -> Result<String, ConnectorError>;

    /// Replace the global daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn set_global_config(&self, content: &str) -> Result<(), ConnectorError>;

    /// `networkctl reload`, returning its output.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::CommandFailed`] if the reload fails.
    fn reload(&self) -> Result<String, ConnectorError>;

    /// Routing tables (`ip route show table all`).
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn routes(&self) -> Result<String, ConnectorError>;

    /// Policy routing rules (`ip rule show`).
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn rules(&self) -> Result<String, ConnectorError>;

    /// Recent systemd-networkd journal lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    fn logs(&self) -> Result<String, ConnectorError>;
}

/// `networkctl` arguments for [`HostConnector::apply`].
fn apply_args(devices: &[String]) -> Vec<&str> {
    if devices.is_empty() {
        vec!["reload"]
    } else {
        std::iter::once("reconfigure")
            .chain(devices.iter().map(String::as_str))
            .collect()
    }
}

/// In-memory [`HostConnector`] for unit tests.
///
/// Files live in a map; commands return canned text and every call to
/// [`HostConnector::apply`] is recorded.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryConnector {
    host: String,
    files: std::sync::Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
    global: std::sync::Mutex<Option<String>>,
    version: String,
    links: Vec<Link>,
    applied: std::sync::Mutex<Vec<Vec<String>>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MemoryConnector {
    /// Empty connector reporting `host`.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    /// Seed a configuration file.
    #[must_use]
    pub fn with_file(self, name: &str, content: &str) -> Self {
        self.files
            .lock()
            .expect("mock files poisoned")
            .insert(name.to_string(), content.as_bytes().to_vec());
        self
    }

    /// Seed the global configuration.
    #[must_use]
    pub fn with_global(self, content: &str) -> Self {
        *self.global.lock().expect("mock global poisoned") = Some(content.to_string());
        self
    }

    /// Set the `runtime_version` answer.
    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set the `list_links` answer.
    #[must_use]
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }

    /// Device lists passed to `apply`, in call order.
    pub fn applied(&self) -> Vec<Vec<String>> {
        self.applied.lock().expect("mock applied poisoned").clone()
    }

    /// Current content of a file, if present.
    pub fn file(&self, name: &str) -> Option<String> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .get(name)
            .map(|b| String::from_utf8_lossy(b).to_string())
    }

    fn not_found(name: &str) -> ConnectorError {
        ConnectorError::Io {
            path: name.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl HostConnector for MemoryConnector {
    fn host(&self) -> &str {
        &self.host
    }

    fn list_entries(&self) -> Result<Vec<DirEntry>, ConnectorError> {
        Ok(self
            .files
            .lock()
            .expect("mock files poisoned")
            .keys()
            .map(DirEntry::file)
            .collect())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, ConnectorError> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Self::not_found(name))
    }

    fn write_file(&self, name: &str, content: &[u8]) -> Result<(), ConnectorError> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .insert(name.to_string(), content.to_vec());
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<(), ConnectorError> {
        self.files
            .lock()
            .expect("mock files poisoned")
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }

    fn apply(&self, devices: &[String]) -> Result<(), ConnectorError> {
        self.applied
            .lock()
            .expect("mock applied poisoned")
            .push(devices.to_vec());
        Ok(())
    }

    fn list_links(&self) -> Result<Vec<Link>, ConnectorError> {
        Ok(self.links.clone())
    }

    fn runtime_version(&self) -> String {
        self.version.clone()
    }

    fn global_config(&self) -> Result<String, ConnectorError> {
        Ok(self
            .global
            .lock()
            .expect("mock global poisoned")
            .clone()
            .unwrap_or_else(|| GLOBAL_CONFIG_PLACEHOLDER.to_string()))
    }

    fn set_global_config(&self, content: &str) -> Result<(), ConnectorError> {
        *self.global.lock().expect("mock global poisoned") = Some(content.to_string());
        Ok(())
    }

    fn reload(&self) -> Result<String, ConnectorError> {
        Ok(String::new())
    }

    fn routes(&self) -> Result<String, ConnectorError> {
        Ok("default via 10.0.0.1 dev eth0 proto static\n".to_string())
    }

    fn rules(&self) -> Result<String, ConnectorError> {
        Ok("0:\tfrom all lookup local\n".to_string())
    }

    fn logs(&self) -> Result<String, ConnectorError> {
        Ok(String::new())
    }
}
