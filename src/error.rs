//! Domain-specific error types for the networkd manager.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Library modules return typed errors (e.g., [`ParseError`],
//! [`ConnectorError`]) while command handlers at the CLI boundary convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! Error
//! ├── Schema(SchemaError)  // schema files, generations
//! ├── Parse(ParseError)  // structurally unreadable config text
//! ├── Connector(ConnectorError)  // unknown host, SSH, commands, local I/O
//! ├── Hosts(HostRegistryError)  // host registry persistence
//! ├── InvalidFilename
//! └── UnknownKind
//! ```

use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type for the networkd manager.
///
/// Aggregates domain-specific sub-errors and is convertible to
/// [`anyhow::Error`] for use at CLI command boundaries.
#[derive(Error, Debug)]
pub enum Error {
    /// Schema loading or generation lookup failed.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Configuration text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A host connector operation failed.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// The host registry could not be read or updated.
    #[error("Host registry error: {0}")]
    Hosts(#[from] HostRegistryError),

    /// A configuration filename was rejected (path traversal, bad extension).
    #[error("Invalid filename '{0}'")]
    InvalidFilename(String),

    /// The requested configuration kind does not exist.
    #[error("Unknown config kind '{0}': must be one of network, netdev, link, networkd-conf")]
    UnknownKind(String),
}

/// Errors that arise from loading schema documents.
///
/// Per-kind failures are logged and degrade to an empty type index; only
/// [`SchemaError::UnknownGeneration`] is surfaced to callers.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A schema file could not be read.
    #[error("IO error reading schema {path}: {source}")]
    Io {
        /// Path to the schema file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A schema file is not valid JSON.
    #[error("Invalid schema JSON in {path}: {source}")]
    InvalidJson {
        /// Path to the schema file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The schema document has no top-level `properties` object.
    #[error("Schema for '{kind}' has no top-level properties")]
    MissingProperties {
        /// Config kind whose schema is malformed.
        kind: String,
    },

    /// No schema directory exists for the requested generation.
    #[error("Schema generation v{0} is not available")]
    UnknownGeneration(u32),
}

/// Errors that arise from structurally unreadable configuration text.
///
/// Value-level irregularities (unparsable integers, odd boolean spellings)
/// are never reported here; they are coerced to defaults.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A `[Section` header is missing its closing bracket.
    #[error("Unterminated section header at line {line}: {text}")]
    UnterminatedHeader {
        /// 1-based line number.
        line: usize,
        /// Offending line.
        text: String,
    },

    /// A `[]` header carries no section name.
    #[error("Empty section header at line {line}")]
    EmptyHeader {
        /// 1-based line number.
        line: usize,
    },

    /// A key line appears before any section header.
    #[error("Entry outside of section at line {line}: {text}")]
    EntryOutsideSection {
        /// 1-based line number.
        line: usize,
        /// Offending line.
        text: String,
    },

    /// A non-comment line inside a section has no `=` separator.
    #[error("Missing '=' at line {line}: {text}")]
    MissingSeparator {
        /// 1-based line number.
        line: usize,
        /// Offending line.
        text: String,
    },

    /// A section name, key or value cannot be written without changing how
    /// the file reads back.
    #[error("Cannot render {text:?} in [{section}]: {reason}")]
    Unrenderable {
        /// Section being written.
        section: String,
        /// Offending name, key or value.
        text: String,
        /// What makes it unrepresentable.
        reason: &'static str,
    },

    /// The source text could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path of the unreadable file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise from host connector operations.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// The host identifier is not present in the host registry.
    #[error("Unknown host '{0}'")]
    UnknownHost(String),

    /// The remote session could not be established or was lost.
    #[error("Connection to {host} failed: {message}")]
    Connection {
        /// Host name from the registry.
        host: String,
        /// Human-readable failure description.
        message: String,
    },

    /// A local or remote command exited non-zero.
    #[error("command '{command}' failed (exit {code}): {output}")]
    CommandFailed {
        /// Command line that was executed.
        command: String,
        /// Exit code, `-1` when terminated by a signal.
        code: i32,
        /// Captured combined output.
        output: String,
    },

    /// A local filesystem operation failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A blocking operation exceeded the caller's deadline.
    #[error("Operation on {host} timed out after {secs}s")]
    Timeout {
        /// Host identifier.
        host: String,
        /// Deadline in seconds.
        secs: u64,
    },

    /// A command succeeded but its output could not be interpreted.
    #[error("Unparsable output from '{command}': {message}")]
    InvalidOutput {
        /// Command line that was executed.
        command: String,
        /// Parser failure description.
        message: String,
    },
}

impl ConnectorError {
    /// Returns `true` for failures that leave a remote session unusable.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Returns `true` if the error is a local "not found" I/O failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Errors that arise from the persisted host registry.
#[derive(Error, Debug)]
pub enum HostRegistryError {
    /// The name is reserved for the local connector.
    #[error("Host name '{0}' is reserved")]
    Reserved(String),

    /// Host entries must carry a name.
    #[error("Host name must not be empty")]
    EmptyName,

    /// An address or user that `ssh` would misread.
    #[error("Invalid {field} {value:?} for host '{name}'")]
    InvalidField {
        /// Host entry name.
        name: String,
        /// Offending field.
        field: &'static str,
        /// Rejected value.
        value: String,
    },

    /// The registry file could not be read or written.
    #[error("IO error on host registry {path}: {source}")]
    Io {
        /// Path to the registry file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The registry file is not valid JSON.
    #[error("Invalid host registry {path}: {source}")]
    Json {
        /// Path to the registry file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    // -----------------------------------------------------------------------
    // ParseError
    // -----------------------------------------------------------------------

    #[test]
    fn parse_error_unterminated_header_display() {
        let e = ParseError::UnterminatedHeader {
            line: 3,
            text: "[Network".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Unterminated section header at line 3: [Network"
        );
    }

    #[test]
    fn parse_error_entry_outside_section_display() {
        let e = ParseError::EntryOutsideSection {
            line: 1,
            text: "Name = eth0".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Entry outside of section at line 1: Name = eth0"
        );
    }

    #[test]
    fn parse_error_io_has_source() {
        use std::error::Error as StdError;
        let e = ParseError::Io {
            path: "/etc/systemd/network/10-eth0.network".to_string(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        };
        assert!(e.source().is_some());
        assert!(e.to_string().contains("10-eth0.network"));
    }

    // -----------------------------------------------------------------------
    // SchemaError
    // -----------------------------------------------------------------------

    #[test]
    fn schema_error_unknown_generation_display() {
        let e = SchemaError::UnknownGeneration(260);
        assert_eq!(e.to_string(), "Schema generation v260 is not available");
    }

    #[test]
    fn schema_error_missing_properties_display() {
        let e = SchemaError::MissingProperties {
            kind: "netdev".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Schema for 'netdev' has no top-level properties"
        );
    }

    // -----------------------------------------------------------------------
    // ConnectorError
    // -----------------------------------------------------------------------

    #[test]
    fn connector_error_command_failed_carries_output() {
        let e = ConnectorError::CommandFailed {
            command: "networkctl reload".to_string(),
            code: 1,
            output: "Failed to reload network settings: Access denied".to_string(),
        };
        assert!(e.to_string().contains("networkctl reload"));
        assert!(e.to_string().contains("exit 1"));
        assert!(e.to_string().contains("Access denied"));
    }

    #[test]
    fn connector_error_unknown_host_display() {
        let e = ConnectorError::UnknownHost("router1".to_string());
        assert_eq!(e.to_string(), "Unknown host 'router1'");
    }

    #[test]
    fn connector_error_connection_classification() {
        let conn = ConnectorError::Connection {
            host: "router1".to_string(),
            message: "Connection refused".to_string(),
        };
        let timeout = ConnectorError::Timeout {
            host: "router1".to_string(),
            secs: 30,
        };
        let unknown = ConnectorError::UnknownHost("router1".to_string());
        assert!(conn.is_connection());
        assert!(timeout.is_connection());
        assert!(!unknown.is_connection());
    }

    #[test]
    fn connector_error_not_found_classification() {
        let e = ConnectorError::Io {
            path: "/etc/systemd/networkd.conf".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(e.is_not_found());
        assert!(!ConnectorError::UnknownHost("x".to_string()).is_not_found());
    }

    // -----------------------------------------------------------------------
    // HostRegistryError
    // -----------------------------------------------------------------------

    #[test]
    fn host_registry_error_reserved_display() {
        let e = HostRegistryError::Reserved("local".to_string());
        assert_eq!(e.to_string(), "Host name 'local' is reserved");
    }

    // -----------------------------------------------------------------------
    // Error conversions
    // -----------------------------------------------------------------------

    #[test]
    fn error_from_parse_error() {
        let e: Error = ParseError::EmptyHeader { line: 2 }.into();
        assert!(e.to_string().contains("Parse error"));
        assert!(e.to_string().contains("line 2"));
    }

    #[test]
    fn error_from_connector_error() {
        let e: Error = ConnectorError::UnknownHost("edge".to_string()).into();
        assert!(e.to_string().contains("Connector error"));
        assert!(e.to_string().contains("edge"));
    }

    #[test]
    fn error_invalid_filename_display() {
        let e = Error::InvalidFilename("../passwd".to_string());
        assert_eq!(e.to_string(), "Invalid filename '../passwd'");
    }

    // -----------------------------------------------------------------------
    // Send + Sync bounds
    // -----------------------------------------------------------------------

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<Error>();
        assert_send_sync::<SchemaError>();
        assert_send_sync::<ParseError>();
        assert_send_sync::<ConnectorError>();
        assert_send_sync::<HostRegistryError>();
    }

    #[test]
    fn connector_error_converts_to_anyhow() {
        let e = ConnectorError::UnknownHost("x".to_string());
        let _anyhow_err: anyhow::Error = e.into();
    }
}
