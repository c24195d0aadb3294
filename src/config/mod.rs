//! Service settings and INI/TOML parsing helpers.
pub mod ini;
pub mod toml_loader;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::schema::DEFAULT_SCHEMA_VERSION;

/// Default location of the settings file.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/networkd-manager/config.toml";

/// Directory holding `.network`, `.netdev` and `.link` files.
pub const NETWORKD_CONFIG_DIR: &str = "/etc/systemd/network";

/// Path of the global daemon configuration.
pub const NETWORKD_GLOBAL_CONFIG: &str = "/etc/systemd/networkd.conf";

/// All service settings, loaded from a TOML file.
///
/// Every field has a default, so an absent or partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the versioned schema tree (`<schema_dir>/v257/...`).
    pub schema_dir: PathBuf,
    /// Local configuration directory.
    pub config_dir: PathBuf,
    /// Local global daemon configuration file.
    pub global_config_path: PathBuf,
    /// Directory holding `hosts.json`.
    pub data_dir: PathBuf,
    /// Generation used when a runtime version cannot be parsed or no schema
    /// generations are installed.
    pub default_schema_version: u32,
    /// Sections always treated as repeatable, merged with the schema-derived
    /// set at conversion time.
    pub repeatable_sections: Vec<String>,
    /// Settings for remote hosts.
    pub remote: RemoteSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("/usr/share/networkd-manager/schemas"),
            config_dir: PathBuf::from(NETWORKD_CONFIG_DIR),
            global_config_path: PathBuf::from(NETWORKD_GLOBAL_CONFIG),
            data_dir: PathBuf::from("/var/lib/networkd-manager"),
            default_schema_version: DEFAULT_SCHEMA_VERSION,
            repeatable_sections: ["Address", "Route", "RoutingPolicyRule"]
                .into_iter()
                .map(String::from)
                .collect(),
            remote: RemoteSettings::default(),
        }
    }
}

/// Paths and SSH behaviour applied to every remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Configuration directory on the remote host.
    pub config_dir: PathBuf,
    /// Global daemon configuration on the remote host.
    pub global_config_path: PathBuf,
    /// Privilege-elevation prefix for privileged remote commands.
    pub privilege_prefix: String,
    /// SSH connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Caller-level deadline for one blocking remote operation.
    pub command_timeout_secs: u64,
    /// Directory for OpenSSH control sockets.
    pub control_dir: PathBuf,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(NETWORKD_CONFIG_DIR),
            global_config_path: PathBuf::from(NETWORKD_GLOBAL_CONFIG),
            privilege_prefix: "sudo".to_string(),
            connect_timeout_secs: 5,
            command_timeout_secs: 60,
            control_dir: std::env::temp_dir().join("networkd-manager-ssh"),
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults for a missing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        toml_loader::load_config(path)
    }
}
