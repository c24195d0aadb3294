//! Connector for a registered remote host, driven over a shell session.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::links::{self, Link};
use super::shell::{ShellSession, ShellTransport, shell_quote};
use super::{DirEntry, GLOBAL_CONFIG_PLACEHOLDER, HostConnector, LOG_LINES, apply_args};
use crate::config::RemoteSettings;
use crate::error::ConnectorError;
use crate::exec::ExecResult;
use crate::hosts::HostEntry;

/// Remote host connector.
///
/// Starts unconnected; the first operation establishes a session through the
/// transport. The session mutex makes establishment single-flight. Commands
/// reuse the held session; when one fails with a connection error and the
/// session is no longer alive, it is dropped and the next call reconnects.
#[derive(Debug)]
pub struct RemoteConnector {
    entry: HostEntry,
    transport: Arc<dyn ShellTransport>,
    config_dir: PathBuf,
    global_config_path: PathBuf,
    privilege_prefix: String,
    session: Mutex<Option<Arc<dyn ShellSession>>>,
}

impl RemoteConnector {
    /// Unconnected connector for `entry`.
    #[must_use]
    pub fn new(entry: HostEntry, transport: Arc<dyn ShellTransport>, settings: &RemoteSettings) -> Self {
        Self {
            entry,
            transport,
            config_dir: settings.config_dir.clone(),
            global_config_path: settings.global_config_path.clone(),
            privilege_prefix: settings.privilege_prefix.trim().to_string(),
            session: Mutex::new(None),
        }
    }

    /// Establish the session now instead of on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Connection`] if the host cannot be reached.
    pub fn connect(&self) -> Result<(), ConnectorError> {
        self.ensure_connected().map(drop)
    }

    /// Whether a session is currently held.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Held session, establishing one if there is none.
    fn ensure_connected(&self) -> Result<Arc<dyn ShellSession>, ConnectorError> {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }
        let session = self.transport.connect(&self.entry)?;
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Forget `session` unless another caller already replaced it.
    fn drop_session(&self, session: &Arc<dyn ShellSession>) {
        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|held| Arc::ptr_eq(held, session)) {
            slot.take();
        }
    }

    /// Run `command`; a channel failure on a dead session drops it so the
    /// next call reconnects.
    fn exec(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecResult, ConnectorError> {
        let session = self.ensure_connected()?;
        session.exec(command, stdin).inspect_err(|e| {
            if e.is_connection() && !session.is_alive() {
                tracing::warn!("lost connection to {}: {e}", self.entry.name);
                self.drop_session(&session);
            }
        })
    }

    /// Run `command`, failing on non-zero exit.
    fn run(&self, command: &str, stdin: Option<&[u8]>) -> Result<ExecResult, ConnectorError> {
        self.exec(command, stdin)?.check(command)
    }

    fn privileged(&self, command: &str) -> String {
        if self.privilege_prefix.is_empty() {
            command.to_string()
        } else {
            format!("{} {command}", self.privilege_prefix)
        }
    }

    fn quoted_path(path: &Path) -> String {
        shell_quote(&path.display().to_string())
    }

    fn file_path(&self, name: &str) -> String {
        Self::quoted_path(&self.config_dir.join(name))
    }

    fn read_path(&self, path: &str) -> Result<ExecResult, ConnectorError> {
        self.exec(&self.privileged(&format!("cat -- {path}")), None)
    }

    fn write_path(&self, path: &str, content: &[u8]) -> Result<(), ConnectorError> {
        let command = self.privileged(&format!("tee -- {path} > /dev/null"));
        self.run(&command, Some(content)).map(drop)
    }
}

/// Whether `cat` failed because the file does not exist.
fn is_missing(result: &ExecResult) -> bool {
    result.combined().contains("No such file or directory")
}

impl HostConnector for RemoteConnector {
    fn host(&self) -> &str {
        &self.entry.name
    }

    fn list_entries(&self) -> Result<Vec<DirEntry>, ConnectorError> {
        let command = format!(
            "find {} -mindepth 1 -maxdepth 1 -printf '%y\\t%f\\n'",
            Self::quoted_path(&self.config_dir)
        );
        let result = self.run(&command, None)?;
        Ok(result
            .stdout
            .lines()
            .filter_map(|line| line.split_once('\t'))
            .map(|(kind, name)| DirEntry {
                name: name.to_string(),
                is_dir: kind == "d",
            })
            .collect())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, ConnectorError> {
        let path = self.file_path(name);
        let result = self.read_path(&path)?;
        if !result.success && is_missing(&result) {
            return Err(ConnectorError::Io {
                path: self.config_dir.join(name).display().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        Ok(result.check(&format!("cat -- {path}"))?.raw_stdout)
    }

    fn write_file(&self, name: &str, content: &[u8]) -> Result<(), ConnectorError> {
        self.write_path(&self.file_path(name), content)?;
        tracing::debug!("{}: wrote {name} ({} bytes)", self.entry.name, content.len());
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<(), ConnectorError> {
        let command = self.privileged(&format!("rm -- {}", self.file_path(name)));
        self.run(&command, None).map(drop)
    }

    fn apply(&self, devices: &[String]) -> Result<(), ConnectorError> {
        let args: Vec<String> = apply_args(devices)
            .into_iter()
            .enumerate()
            .map(|(i, arg)| if i == 0 { arg.to_string() } else { shell_quote(arg) })
            .collect();
        let command = self.privileged(&format!("networkctl {}", args.join(" ")));
        self.run(&command, None).map(drop)
    }

    fn list_links(&self) -> Result<Vec<Link>, ConnectorError> {
        links::gather_links(|argv| self.exec(&argv.join(" "), None))
    }

    fn runtime_version(&self) -> String {
        match self.exec("networkctl --version", None) {
            Ok(result) if result.success => result.stdout,
            Ok(result) => {
                tracing::debug!(
                    "{}: version probe failed: {}",
                    self.entry.name,
                    result.combined().trim()
                );
                String::new()
            }
            Err(e) => {
                tracing::debug!("{}: version probe failed: {e}", self.entry.name);
                String::new()
            }
        }
    }

    fn global_config(&self) -> Result<String, ConnectorError> {
        let path = Self::quoted_path(&self.global_config_path);
        let result = self.read_path(&path)?;
        if !result.success && is_missing(&result) {
            return Ok(GLOBAL_CONFIG_PLACEHOLDER.to_string());
        }
        Ok(result.check(&format!("cat -- {path}"))?.stdout)
    }

    fn set_global_config(&self, content: &str) -> Result<(), ConnectorError> {
        self.write_path(&Self::quoted_path(&self.global_config_path), content.as_bytes())
    }

    fn reload(&self) -> Result<String, ConnectorError> {
        Ok(self
            .run(&self.privileged("networkctl reload"), None)?
            .combined())
    }

    fn routes(&self) -> Result<String, ConnectorError> {
        Ok(self.run("ip route show table all", None)?.combined())
    }

    fn rules(&self) -> Result<String, ConnectorError> {
        Ok(self.run("ip rule show", None)?.combined())
    }

    fn logs(&self) -> Result<String, ConnectorError> {
        let command = format!("journalctl -u systemd-networkd -n {LOG_LINES} --no-pager");
        Ok(self.run(&command, None)?.combined())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::connector::shell::{MockShellSession, MockShellTransport};

    fn entry() -> HostEntry {
        HostEntry {
            name: "router1".to_string(),
            host: "192.0.2.1".to_string(),
            user: "admin".to_string(),
            port: 22,
            key_file: None,
        }
    }

    /// Connector whose transport hands out `session` exactly `connects` times.
    fn connector_with(session: &Arc<MockShellSession>, connects: usize) -> RemoteConnector {
        let mut transport = MockShellTransport::new();
        let handed = Arc::clone(session);
        transport
            .expect_connect()
            .times(connects)
            .returning(move |_| Ok(Arc::clone(&handed) as Arc<dyn ShellSession>));
        RemoteConnector::new(entry(), Arc::new(transport), &RemoteSettings::default())
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn connects_lazily_and_reuses_session() {
        let session = Arc::new(MockShellSession::new());
        let remote = connector_with(&session, 1);
        assert!(!remote.is_connected());
        remote.routes().unwrap();
        remote.rules().unwrap();
        assert!(remote.is_connected());
        assert_eq!(session.commands(), ["ip route show table all", "ip rule show"]);
    }

    #[test]
    fn dead_session_is_replaced_on_next_call() {
        let first = Arc::new(MockShellSession::new());
        let second = Arc::new(MockShellSession::new());
        let handed = Mutex::new(vec![
            Arc::clone(&second) as Arc<dyn ShellSession>,
            Arc::clone(&first) as Arc<dyn ShellSession>,
        ]);
        let mut transport = MockShellTransport::new();
        transport
            .expect_connect()
            .times(2)
            .returning(move |_| Ok(handed.lock().unwrap().pop().unwrap()));
        let remote = RemoteConnector::new(entry(), Arc::new(transport), &RemoteSettings::default());

        remote.routes().unwrap();
        first.kill();
        assert!(remote.rules().unwrap_err().is_connection());
        assert!(!remote.is_connected());
        remote.rules().unwrap();
        assert_eq!(first.commands(), ["ip route show table all", "ip rule show"]);
        assert_eq!(second.commands(), ["ip rule show"]);
    }

    #[test]
    fn dropping_a_replaced_session_keeps_the_current_one() {
        let session = Arc::new(MockShellSession::new());
        let mut transport = MockShellTransport::new();
        let handed = Arc::clone(&session);
        transport.expect_connect().times(1).returning(move |_| {
            Ok(Arc::clone(&handed) as Arc<dyn ShellSession>)
        });
        let remote = RemoteConnector::new(entry(), Arc::new(transport), &RemoteSettings::default());
        remote.routes().unwrap();

        let flaky: Arc<dyn ShellSession> = Arc::new(MockShellSession::new());
        remote.drop_session(&flaky);
        assert!(remote.is_connected());
    }

    #[test]
    fn connection_loss_drops_session() {
        let session = Arc::new(MockShellSession::new().with_connection_loss("ip route"));
        let remote = connector_with(&session, 1);
        let err = remote.routes().unwrap_err();
        assert!(err.is_connection());
        assert!(!remote.is_connected());
    }

    #[test]
    fn connect_failure_is_reported() {
        let mut transport = MockShellTransport::new();
        transport.expect_connect().times(1).returning(|host| {
            Err(ConnectorError::Connection {
                host: host.name.clone(),
                message: "Permission denied (publickey)".to_string(),
            })
        });
        let remote = RemoteConnector::new(entry(), Arc::new(transport), &RemoteSettings::default());
        let err = remote.connect().unwrap_err();
        assert!(err.to_string().contains("Permission denied"));
        assert!(!remote.is_connected());
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    #[test]
    fn file_operations_are_quoted_and_privileged() {
        let session = Arc::new(MockShellSession::new().with_output("sudo cat", "[Match]\n"));
        let remote = connector_with(&session, 1);

        assert_eq!(remote.read_file("a'b.network").unwrap(), b"[Match]\n");
        remote.write_file("10-eth0.network", b"[Match]\nName=eth0\n").unwrap();
        remote.delete_file("10-eth0.network").unwrap();

        assert_eq!(
            session.commands(),
            [
                r"sudo cat -- '/etc/systemd/network/a'\''b.network'",
                "sudo tee -- '/etc/systemd/network/10-eth0.network' > /dev/null",
                "sudo rm -- '/etc/systemd/network/10-eth0.network'",
            ]
        );
        assert_eq!(
            session.stdin_for("sudo tee").as_deref(),
            Some(&b"[Match]\nName=eth0\n"[..])
        );
    }

    #[test]
    fn read_file_returns_bytes_unchanged() {
        let content = b"[Link]\nDescription=caf\xe9\n";
        let session = Arc::new(MockShellSession::new().with_bytes("sudo cat", content));
        let remote = connector_with(&session, 1);
        assert_eq!(remote.read_file("10-wan.link").unwrap(), content);
    }

    #[test]
    fn privilege_prefix_is_configurable() {
        let session = Arc::new(MockShellSession::new());
        let mut transport = MockShellTransport::new();
        let handed = Arc::clone(&session);
        transport
            .expect_connect()
            .returning(move |_| Ok(Arc::clone(&handed) as Arc<dyn ShellSession>));
        let settings = RemoteSettings {
            privilege_prefix: String::new(),
            ..RemoteSettings::default()
        };
        let remote = RemoteConnector::new(entry(), Arc::new(transport), &settings);
        remote.reload().unwrap();
        assert_eq!(session.commands(), ["networkctl reload"]);
    }

    #[test]
    fn list_entries_parses_find_output() {
        let session = Arc::new(
            MockShellSession::new().with_output("find", "f\t10-eth0.network\nd\tdropins\nf\t25-br0.netdev\n"),
        );
        let remote = connector_with(&session, 1);
        let entries = remote.list_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[1].is_dir);
        assert_eq!(entries[2].name, "25-br0.netdev");
        assert_eq!(
            session.commands()[0],
            r"find '/etc/systemd/network' -mindepth 1 -maxdepth 1 -printf '%y\t%f\n'"
        );
    }

    #[test]
    fn apply_quotes_devices_or_reloads() {
        let session = Arc::new(MockShellSession::new());
        let remote = connector_with(&session, 1);
        remote.apply(&["eth0".to_string(), "br 0".to_string()]).unwrap();
        remote.apply(&[]).unwrap();
        assert_eq!(
            session.commands(),
            [
                "sudo networkctl reconfigure 'eth0' 'br 0'",
                "sudo networkctl reload"
            ]
        );
    }

    #[test]
    fn apply_failure_carries_output() {
        let session = Arc::new(MockShellSession::new().with_failure(
            "sudo networkctl",
            1,
            "Interface \"eth9\" not found.",
        ));
        let remote = connector_with(&session, 1);
        let err = remote.apply(&["eth9".to_string()]).unwrap_err();
        assert!(matches!(err, ConnectorError::CommandFailed { code: 1, .. }));
        assert!(err.to_string().contains("eth9\" not found"));
    }

    #[test]
    fn missing_files_are_not_found() {
        let session = Arc::new(MockShellSession::new().with_failure(
            "sudo cat",
            1,
            "cat: /etc/systemd/networkd.conf: No such file or directory",
        ));
        let remote = connector_with(&session, 1);
        assert_eq!(remote.global_config().unwrap(), GLOBAL_CONFIG_PLACEHOLDER);
        assert!(remote.read_file("gone.network").unwrap_err().is_not_found());
    }

    #[test]
    fn version_probe_is_best_effort() {
        let session = Arc::new(
            MockShellSession::new().with_output("networkctl --version", "systemd 256 (256.4)\n"),
        );
        let remote = connector_with(&session, 1);
        assert_eq!(remote.runtime_version(), "systemd 256 (256.4)\n");

        let failing = Arc::new(MockShellSession::new().with_failure("networkctl", 127, "not found"));
        assert_eq!(connector_with(&failing, 1).runtime_version(), "");
    }

    #[test]
    fn links_use_remote_probes() {
        let session = Arc::new(
            MockShellSession::new()
                .with_output(
                    "networkctl list --json=short",
                    r#"{"Interfaces": [{"Index": 2, "Name": "eth0", "OperationalState": "routable"}]}"#,
                )
                .with_output(
                    "ip -j addr",
                    r#"[{"ifindex": 2, "addr_info": [{"local": "10.0.0.2", "prefixlen": 24}]}]"#,
                ),
        );
        let remote = connector_with(&session, 1);
        let links = remote.list_links().unwrap();
        assert_eq!(links[0].addresses, ["10.0.0.2/24"]);
    }
}
