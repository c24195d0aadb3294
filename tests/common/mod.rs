// Shared helpers for integration tests.
//
// Provides a temporary directory holding a schema tree, a configuration
// directory and a data directory, plus a fluent builder so each test can set
// up an isolated environment without repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use networkd_manager::config::Settings;
use networkd_manager::schema::{ConfigKind, SchemaGeneration, SchemaStore};
use networkd_manager::service::NetworkdService;

/// Generation installed by [`TestEnv::new`].
pub const GENERATION: u32 = 257;

/// Schema for `.network` files: arrays, booleans, integers, `$ref`
/// definitions and repeatable `[Address]`.
pub const NETWORK_SCHEMA: &str = r##"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "type": "object",
    "properties": {
        "Match": {
            "type": "object",
            "properties": {
                "Name": { "type": "string" },
                "MACAddress": { "type": "string" },
                "Type": { "type": "string" }
            }
        },
        "Network": {
            "type": "object",
            "properties": {
                "DHCP": { "type": "string" },
                "DNS": { "type": "array", "items": { "type": "string" } },
                "Address": { "type": "array", "items": { "type": "string" } },
                "VLAN": { "type": "array", "items": { "type": "string" } },
                "LinkLocalAddressing": { "type": "boolean" },
                "IPv6AcceptRA": { "$ref": "#/definitions/bool" }
            }
        },
        "Address": {
            "oneOf": [
                { "type": "array", "items": { "$ref": "#/definitions/AddressSection" } },
                { "$ref": "#/definitions/AddressSection" }
            ]
        },
        "Route": {
            "type": "object",
            "properties": {
                "Gateway": { "type": "string" },
                "Metric": { "type": "integer" }
            }
        }
    },
    "definitions": {
        "bool": { "type": "boolean" },
        "AddressSection": {
            "type": "object",
            "properties": {
                "Address": { "type": "string" },
                "PreferredLifetime": { "type": "string" }
            }
        }
    }
}"##;

/// Schema for `.netdev` files.
pub const NETDEV_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "NetDev": {
            "type": "object",
            "properties": {
                "Name": { "type": "string" },
                "Kind": { "type": "string" },
                "MTUBytes": { "type": "integer" }
            }
        },
        "VLAN": {
            "type": "object",
            "properties": { "Id": { "type": "integer" } }
        }
    }
}"#;

/// Schema for `networkd.conf`.
pub const NETWORKD_CONF_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "Network": {
            "type": "object",
            "properties": {
                "SpeedMeter": { "type": "boolean" },
                "SpeedMeterIntervalSec": { "type": "string" }
            }
        }
    }
}"#;

/// Write one schema generation under `schema_dir`.
pub fn write_generation(schema_dir: &Path, version: u32) {
    let dir = schema_dir.join(format!("v{version}"));
    std::fs::create_dir_all(&dir).expect("create generation dir");
    for (kind, content) in [
        (ConfigKind::Network, NETWORK_SCHEMA),
        (ConfigKind::NetDev, NETDEV_SCHEMA),
        (ConfigKind::NetworkdConf, NETWORKD_CONF_SCHEMA),
    ] {
        std::fs::write(dir.join(kind.schema_file()), content).expect("write schema");
    }
}

/// The test schema documents as an in-memory generation.
pub fn generation() -> SchemaGeneration {
    let parse = |text: &str| serde_json::from_str(text).expect("valid schema json");
    SchemaGeneration::from_documents(
        GENERATION,
        vec![
            (ConfigKind::Network, parse(NETWORK_SCHEMA)),
            (ConfigKind::NetDev, parse(NETDEV_SCHEMA)),
            (ConfigKind::NetworkdConf, parse(NETWORKD_CONF_SCHEMA)),
        ],
    )
}

/// An isolated environment backed by a [`tempfile::TempDir`].
pub struct TestEnv {
    /// Temporary directory holding everything.
    pub root: tempfile::TempDir,
}

impl TestEnv {
    /// Create an environment with generation [`GENERATION`] installed and an
    /// empty configuration directory.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        write_generation(&root.path().join("schemas"), GENERATION);
        std::fs::create_dir_all(root.path().join("network")).expect("create config dir");
        Self { root }
    }

    /// Add a file to the configuration directory.
    pub fn with_file(self, name: &str, content: &str) -> Self {
        std::fs::write(self.config_dir().join(name), content).expect("write config file");
        self
    }

    /// Directory holding `.network`, `.netdev` and `.link` files.
    pub fn config_dir(&self) -> PathBuf {
        self.root.path().join("network")
    }

    /// Path of a file in the configuration directory.
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    /// Path of the global configuration.
    pub fn global_config_path(&self) -> PathBuf {
        self.root.path().join("networkd.conf")
    }

    /// Settings pointing every directory into the environment.
    pub fn settings(&self) -> Settings {
        Settings {
            schema_dir: self.root.path().join("schemas"),
            config_dir: self.config_dir(),
            global_config_path: self.global_config_path(),
            data_dir: self.root.path().join("data"),
            ..Settings::default()
        }
    }

    /// Schema store over the environment's schema tree.
    pub fn schemas(&self) -> SchemaStore {
        let settings = self.settings();
        SchemaStore::open(&settings.schema_dir, settings.default_schema_version)
    }

    /// Service wired from [`Self::settings`].
    pub fn service(&self) -> NetworkdService {
        NetworkdService::from_settings(self.settings()).expect("build service")
    }
}
