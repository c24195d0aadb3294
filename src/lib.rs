//! systemd-networkd configuration manager.
//!
//! Reads and writes `.network`, `.netdev`, `.link` and `networkd.conf` files
//! on the local machine or on remote hosts over SSH, converting between the
//! INI-style text and typed JSON documents using versioned schemas.
//!
//! The public API is organised into layers:
//!
//! - **[`schema`]**: type index and repeatable sections per schema generation
//! - **[`convert`]**: text to [`convert::ConfigDocument`] and back
//! - **[`connector`]**: per-host file and command access, pooled per host
//! - **[`service`]**: the operations exposed to callers
//! - **[`commands`]**: top-level subcommand orchestration for the binary
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod connector;
pub mod convert;
pub mod error;
pub mod exec;
pub mod hosts;
pub mod logging;
pub mod schema;
pub mod service;
