//! Console and file logging for the command-line front end.
//!
//! The library only emits [`tracing`] events; [`init_subscriber`] installs
//! the subscriber that renders them.

mod subscriber;
mod utils;

pub use subscriber::init_subscriber;
pub use utils::{log_file_path, strip_ansi};

/// Serializes `XDG_CACHE_HOME` manipulation across parallel test threads.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
