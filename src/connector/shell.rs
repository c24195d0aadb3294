//! Remote shell sessions and the OpenSSH transport that provides them.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ConnectorError;
use crate::exec::{self, ExecResult};
use crate::hosts::HostEntry;

/// Exit status OpenSSH uses for its own failures.
const SSH_FAILURE: i32 = 255;

/// Distinguishes control sockets of sessions opened by this process.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Quote `arg` for a POSIX shell.
///
/// The result is wrapped in single quotes with each embedded `'` written as
/// `'\''`, so the shell sees exactly one word equal to `arg`.
///
/// # Examples
///
/// ```
/// use networkd_manager::connector::shell_quote;
///
/// assert_eq!(shell_quote("10-eth0.network"), "'10-eth0.network'");
/// assert_eq!(shell_quote("a'b"), r"'a'\''b'");
/// ```
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// An established shell channel to one remote host.
pub trait ShellSession: Send + Sync + std::fmt::Debug {
    /// Run `command` through the remote shell, feeding `stdin` if given.
    ///
    /// A non-zero exit of the remote command is reported in the returned
    /// [`ExecResult`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Connection`] if the channel itself failed.
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecResult, ConnectorError>;

    /// Whether the channel can still carry commands.
    fn is_alive(&self) -> bool;
}

/// Opens authenticated shell sessions to registered hosts.
#[cfg_attr(test, mockall::automock)]
pub trait ShellTransport: Send + Sync + std::fmt::Debug {
    /// Establish a session to `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Connection`] if the host cannot be reached
    /// or authentication fails.
    fn connect(&self, host: &HostEntry) -> Result<Arc<dyn ShellSession>, ConnectorError>;
}

/// [`ShellTransport`] driving the system `ssh` client.
///
/// Every session starts its own ControlMaster on a socket no other session
/// uses; commands ride that connection so authentication happens once per
/// session, and dropping the session closes only its own master.
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    program: String,
    control_dir: PathBuf,
    connect_timeout_secs: u64,
}

impl OpenSshTransport {
    /// Transport placing control sockets in `control_dir`.
    #[must_use]
    pub fn new(control_dir: &Path, connect_timeout_secs: u64) -> Self {
        Self {
            program: "ssh".to_string(),
            control_dir: control_dir.to_path_buf(),
            connect_timeout_secs,
        }
    }

    /// Use a different client binary.
    #[must_use]
    pub fn with_program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Fresh socket path for a new session to `host`.
    fn control_path(&self, host: &HostEntry) -> PathBuf {
        let stem: String = host
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        self.control_dir
            .join(format!("{stem}-{}-{seq}.sock", std::process::id()))
    }
}

impl ShellTransport for OpenSshTransport {
    fn connect(&self, host: &HostEntry) -> Result<Arc<dyn ShellSession>, ConnectorError> {
        host.validate().map_err(|e| ConnectorError::Connection {
            host: host.name.clone(),
            message: e.to_string(),
        })?;
        if !exec::which(&self.program) {
            return Err(ConnectorError::Connection {
                host: host.name.clone(),
                message: format!("{} not found in PATH", self.program),
            });
        }
        std::fs::create_dir_all(&self.control_dir).map_err(|e| ConnectorError::Connection {
            host: host.name.clone(),
            message: format!("cannot create {}: {e}", self.control_dir.display()),
        })?;

        let session = OpenSshSession {
            host: host.name.clone(),
            program: self.program.clone(),
            destination: host.destination(),
            control_path: self.control_path(host),
            options: connection_options(host, self.connect_timeout_secs),
        };

        tracing::info!("connecting to {} ({})", host.name, session.destination);
        let mut args = session.base_args();
        args.extend(
            ["-o", "ControlMaster=yes", "-o", "ControlPersist=yes", "-f", "-N", "--"]
                .map(String::from),
        );
        args.push(session.destination.clone());
        let result = session.run(&args, None)?;
        if !result.success {
            return Err(ConnectorError::Connection {
                host: host.name.clone(),
                message: result.combined().trim().to_string(),
            });
        }
        Ok(Arc::new(session))
    }
}

/// `-o`/`-p`/`-i` options shared by every invocation for `host`.
fn connection_options(host: &HostEntry, connect_timeout_secs: u64) -> Vec<String> {
    let mut options = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={connect_timeout_secs}"),
        "-p".to_string(),
        host.port.to_string(),
    ];
    if let Some(key) = &host.key_file {
        options.push("-i".to_string());
        options.push(key.display().to_string());
    }
    options
}

/// One ControlMaster-backed session.
#[derive(Debug)]
pub struct OpenSshSession {
    host: String,
    program: String,
    destination: String,
    control_path: PathBuf,
    options: Vec<String>,
}

impl OpenSshSession {
    fn base_args(&self) -> Vec<String> {
        let mut args = self.options.clone();
        args.push("-o".to_string());
        args.push(format!("ControlPath={}", self.control_path.display()));
        args
    }

    fn control(&self, operation: &str) -> Result<ExecResult, ConnectorError> {
        let mut args = self.base_args();
        args.extend([
            "-O".to_string(),
            operation.to_string(),
            "--".to_string(),
            self.destination.clone(),
        ]);
        self.run(&args, None)
    }

    fn run(&self, args: &[String], stdin: Option<&[u8]>) -> Result<ExecResult, ConnectorError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = match stdin {
            Some(input) => exec::run_with_input(&self.program, &args, input),
            None => exec::run_unchecked(&self.program, &args),
        };
        result.map_err(|e| ConnectorError::Connection {
            host: self.host.clone(),
            message: e.to_string(),
        })
    }
}

impl ShellSession for OpenSshSession {
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecResult, ConnectorError> {
        tracing::debug!("{}: {command}", self.host);
        let mut args = self.base_args();
        args.extend([
            "-o".to_string(),
            "ControlMaster=no".to_string(),
            "--".to_string(),
            self.destination.clone(),
            command.to_string(),
        ]);
        let result = self.run(&args, stdin)?;
        if result.code == Some(SSH_FAILURE) {
            return Err(ConnectorError::Connection {
                host: self.host.clone(),
                message: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }

    fn is_alive(&self) -> bool {
        self.control("check").is_ok_and(|r| r.success)
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        if self.control_path.exists() {
            tracing::debug!("closing control master for {}", self.host);
            let _ = self.control("exit");
        }
    }
}

/// Scripted [`ShellSession`] for unit tests.
///
/// Responses are matched by command prefix in registration order; unmatched
/// commands succeed with empty output. Every command and its stdin is
/// recorded. Once killed, every command reports a lost connection.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockShellSession {
    responses: Vec<(String, ExecResult)>,
    broken: Vec<String>,
    dead: std::sync::atomic::AtomicBool,
    commands: std::sync::Mutex<Vec<(String, Option<Vec<u8>>)>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MockShellSession {
    /// Session where every command succeeds with no output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `stdout` to commands starting with `prefix`.
    #[must_use]
    pub fn with_output(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            ExecResult {
                stdout: stdout.to_string(),
                raw_stdout: stdout.as_bytes().to_vec(),
                success: true,
                code: Some(0),
                ..ExecResult::default()
            },
        ));
        self
    }

    /// Reply with raw `stdout` bytes to commands starting with `prefix`.
    #[must_use]
    pub fn with_bytes(mut self, prefix: &str, stdout: &[u8]) -> Self {
        self.responses.push((
            prefix.to_string(),
            ExecResult {
                stdout: String::from_utf8_lossy(stdout).to_string(),
                raw_stdout: stdout.to_vec(),
                success: true,
                code: Some(0),
                ..ExecResult::default()
            },
        ));
        self
    }

    /// Fail commands starting with `prefix` with `code` and `stderr`.
    #[must_use]
    pub fn with_failure(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            ExecResult {
                stderr: stderr.to_string(),
                code: Some(code),
                ..ExecResult::default()
            },
        ));
        self
    }

    /// Report a lost connection for commands starting with `prefix`.
    #[must_use]
    pub fn with_connection_loss(mut self, prefix: &str) -> Self {
        self.broken.push(prefix.to_string());
        self
    }

    /// Make `is_alive` return false and every later command fail.
    pub fn kill(&self) {
        self.dead.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Commands executed so far.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .expect("mock commands poisoned")
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Stdin passed with the last command starting with `prefix`.
    pub fn stdin_for(&self, prefix: &str) -> Option<Vec<u8>> {
        self.commands
            .lock()
            .expect("mock commands poisoned")
            .iter()
            .rev()
            .find(|(c, _)| c.starts_with(prefix))
            .and_then(|(_, stdin)| stdin.clone())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl ShellSession for MockShellSession {
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecResult, ConnectorError> {
        self.commands
            .lock()
            .expect("mock commands poisoned")
            .push((command.to_string(), stdin.map(<[u8]>::to_vec)));
        if !self.is_alive() || self.broken.iter().any(|p| command.starts_with(p.as_str())) {
            self.kill();
            return Err(ConnectorError::Connection {
                host: "mock".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(self
            .responses
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map_or_else(
                || ExecResult {
                    success: true,
                    code: Some(0),
                    ..ExecResult::default()
                },
                |(_, result)| result.clone(),
            ))
    }

    fn is_alive(&self) -> bool {
        !self.dead.load(std::sync::atomic::Ordering::SeqCst)
    }
}
