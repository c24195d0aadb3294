//! Command: print version information.

/// Print the networkd-manager version to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    let version = option_env!("NETWORKD_MANAGER_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    println!("networkd-manager {version}");
}
