//! Command-line interface definition.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::schema::ConfigKind;

/// Top-level CLI entry point for the networkd configuration manager.
#[derive(Parser, Debug)]
#[command(
    name = "networkd-manager",
    about = "Manage systemd-networkd configuration on local and remote hosts",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Target host: `local` or a registered host name
    #[arg(short = 'H', long, global = true, default_value = "local")]
    pub host: String,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert configuration text to a JSON document
    Convert(ConvertOpts),
    /// Render a JSON document as configuration text
    Render(ConvertOpts),
    /// Show the schema generation for a version or the target host
    SchemaVersion(SchemaVersionOpts),
    /// Manage .network, .netdev and .link files
    #[command(subcommand)]
    Files(FilesCommand),
    /// Reconfigure devices, or reload everything when none are given
    Apply(ApplyOpts),
    /// List network links
    Links,
    /// Show or replace the global networkd.conf
    #[command(subcommand)]
    Global(GlobalCommand),
    /// Reload systemd-networkd
    Reload,
    /// Show routing tables
    Routes,
    /// Show routing policy rules
    Rules,
    /// Show recent systemd-networkd logs
    Logs,
    /// Manage registered remote hosts
    #[command(subcommand)]
    Hosts(HostsCommand),
    /// Print version information
    Version,
}

impl Command {
    /// Short name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Convert(_) => "convert",
            Self::Render(_) => "render",
            Self::SchemaVersion(_) => "schema-version",
            Self::Files(_) => "files",
            Self::Apply(_) => "apply",
            Self::Links => "links",
            Self::Global(_) => "global",
            Self::Reload => "reload",
            Self::Routes => "routes",
            Self::Rules => "rules",
            Self::Logs => "logs",
            Self::Hosts(_) => "hosts",
            Self::Version => "version",
        }
    }
}

/// Options for `convert` and `render`.
#[derive(Args, Debug, Clone)]
pub struct ConvertOpts {
    /// Configuration kind (network, netdev, link, networkd-conf)
    #[arg(short, long)]
    pub kind: ConfigKind,

    /// Schema generation; defaults to the target host's
    #[arg(short, long)]
    pub schema: Option<u32>,

    /// Input file; stdin when absent or `-`
    pub input: Option<PathBuf>,
}

/// Options for `schema-version`.
#[derive(Args, Debug, Clone)]
pub struct SchemaVersionOpts {
    /// Version string to resolve instead of probing the host
    pub detected: Option<String>,
}

/// `files` subcommands.
#[derive(Subcommand, Debug)]
pub enum FilesCommand {
    /// List configuration files with a summary
    List(ListOpts),
    /// Show one file as a JSON document
    Show {
        /// File name inside the configuration directory
        filename: String,
    },
    /// Print one file unchanged
    Cat {
        /// File name inside the configuration directory
        filename: String,
    },
    /// Write one file from a JSON document, or from text with `--raw`
    Write(WriteOpts),
    /// Delete one file
    Delete {
        /// File name inside the configuration directory
        filename: String,
    },
}

/// Options for `files list`.
#[derive(Args, Debug, Clone)]
pub struct ListOpts {
    /// Kind to list; all file kinds when absent
    #[arg(short, long)]
    pub kind: Option<ConfigKind>,

    /// Only files whose [Match] names this interface
    #[arg(long)]
    pub name: Option<String>,

    /// Only files whose [Match] names this MAC address
    #[arg(long)]
    pub mac: Option<String>,

    /// Only files whose [Match] names this link type
    #[arg(long = "type")]
    pub link_type: Option<String>,
}

/// Options for `files write`.
#[derive(Args, Debug, Clone)]
pub struct WriteOpts {
    /// File name inside the configuration directory
    pub filename: String,

    /// Input file; stdin when absent or `-`
    pub input: Option<PathBuf>,

    /// Treat the input as configuration text instead of JSON
    #[arg(long)]
    pub raw: bool,
}

/// Options for `apply`.
#[derive(Args, Debug, Clone)]
pub struct ApplyOpts {
    /// Devices to reconfigure
    pub devices: Vec<String>,
}

/// `global` subcommands.
#[derive(Subcommand, Debug)]
pub enum GlobalCommand {
    /// Show networkd.conf as a JSON document, or as text with `--raw`
    Show {
        /// Print the file unchanged
        #[arg(long)]
        raw: bool,
    },
    /// Replace networkd.conf with configuration text
    Set {
        /// Input file; stdin when absent or `-`
        input: Option<PathBuf>,
    },
}

/// `hosts` subcommands.
#[derive(Subcommand, Debug)]
pub enum HostsCommand {
    /// List registered hosts
    List,
    /// Register or replace a host
    Add(AddHostOpts),
    /// Remove a host
    Remove {
        /// Host name
        name: String,
    },
}

/// Options for `hosts add`.
#[derive(Args, Debug, Clone)]
pub struct AddHostOpts {
    /// Name used with `--host`
    pub name: String,

    /// Hostname or address
    pub address: String,

    /// Login user
    #[arg(short, long, default_value = "")]
    pub user: String,

    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    pub port: u16,

    /// Private key file
    #[arg(short = 'i', long)]
    pub key_file: Option<PathBuf>,
}
