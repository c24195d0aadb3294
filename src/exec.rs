//! Local process execution used by the local connector and the SSH transport.
use std::io::Write as _;
use std::process::{Command, Output, Stdio};

use crate::error::ConnectorError;

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard output, byte for byte.
    pub raw_stdout: Vec<u8>,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// Stdout followed by stderr, as shown to users on failure.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }

    /// Convert a non-zero exit into [`ConnectorError::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error carrying the combined output if the command failed.
    pub fn check(self, command: &str) -> Result<Self, ConnectorError> {
        if self.success {
            return Ok(self);
        }
        Err(ConnectorError::CommandFailed {
            command: command.to_string(),
            code: self.code.unwrap_or(-1),
            output: self.combined().trim().to_string(),
        })
    }
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
            raw_stdout: output.stdout,
        }
    }
}

/// Render `program args…` for log and error messages.
#[must_use]
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and return its output. Fails if the command exits non-zero.
///
/// # Errors
///
/// Returns [`ConnectorError::Io`] if the program cannot be spawned and
/// [`ConnectorError::CommandFailed`] if it exits non-zero.
pub fn run(program: &str, args: &[&str]) -> Result<ExecResult, ConnectorError> {
    run_unchecked(program, args)?.check(&command_line(program, args))
}

/// Run a command, allowing failure (returns result without bailing).
///
/// # Errors
///
/// Returns [`ConnectorError::Io`] if the program cannot be spawned.
pub fn run_unchecked(program: &str, args: &[&str]) -> Result<ExecResult, ConnectorError> {
    tracing::debug!("exec: {}", command_line(program, args));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ConnectorError::Io {
            path: program.to_string(),
            source,
        })?;
    Ok(ExecResult::from(output))
}

/// Run a command with `input` written to its stdin, allowing failure.
///
/// # Errors
///
/// Returns [`ConnectorError::Io`] if the program cannot be spawned or its
/// stdin cannot be written.
pub fn run_with_input(
    program: &str,
    args: &[&str],
    input: &[u8],
) -> Result<ExecResult, ConnectorError> {
    tracing::debug!(
        "exec: {} (stdin {} bytes)",
        command_line(program, args),
        input.len()
    );
    let io_err = |source| ConnectorError::Io {
        path: program.to_string(),
        source,
    };
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(io_err)?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input).map_err(io_err)?;
    }
    let output = child.wait_with_output().map_err(io_err)?;
    Ok(ExecResult::from(output))
}

/// Check if a program is available on PATH.
#[must_use]
pub fn which(program: &str) -> bool {
    which::which(program).is_ok()
}
