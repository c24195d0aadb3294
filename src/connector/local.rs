//! Connector for the machine this process runs on.
use std::path::{Path, PathBuf};

use super::links::{self, Link};
use super::{DirEntry, GLOBAL_CONFIG_PLACEHOLDER, HostConnector, LOCAL_HOST, LOG_LINES, apply_args};
use crate::error::ConnectorError;
use crate::exec;

/// Direct filesystem and process access on the local host.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    config_dir: PathBuf,
    global_config_path: PathBuf,
}

impl LocalConnector {
    /// Connector rooted at `config_dir`, with the global configuration at
    /// `global_config_path`.
    #[must_use]
    pub fn new(config_dir: &Path, global_config_path: &Path) -> Self {
        Self {
            config_dir: config_dir.to_path_buf(),
            global_config_path: global_config_path.to_path_buf(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.config_dir.join(name)
    }

    /// Run a command and return its combined output, failing on non-zero exit.
    fn output(program: &str, args: &[&str]) -> Result<String, ConnectorError> {
        Ok(exec::run(program, args)?.combined())
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConnectorError + '_ {
    move |source| ConnectorError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl HostConnector for LocalConnector {
    fn host(&self) -> &str {
        LOCAL_HOST
    }

    fn list_entries(&self) -> Result<Vec<DirEntry>, ConnectorError> {
        std::fs::read_dir(&self.config_dir)
            .map_err(io_error(&self.config_dir))?
            .map(|entry| {
                let entry = entry.map_err(io_error(&self.config_dir))?;
                Ok(DirEntry {
                    name: entry.file_name().to_string_lossy().to_string(),
                    is_dir: entry.file_type().is_ok_and(|t| t.is_dir()),
                })
            })
            .collect()
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>, ConnectorError> {
        let path = self.path(name);
        std::fs::read(&path).map_err(io_error(&path))
    }

    fn write_file(&self, name: &str, content: &[u8]) -> Result<(), ConnectorError> {
        let path = self.path(name);
        std::fs::write(&path, content).map_err(io_error(&path))?;
        tracing::debug!("wrote {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    fn delete_file(&self, name: &str) -> Result<(), ConnectorError> {
        let path = self.path(name);
        std::fs::remove_file(&path).map_err(io_error(&path))?;
        tracing::debug!("removed {}", path.display());
        Ok(())
    }

    fn apply(&self, devices: &[String]) -> Result<(), ConnectorError> {
        exec::run("networkctl", &apply_args(devices))?;
        Ok(())
    }

    fn list_links(&self) -> Result<Vec<Link>, ConnectorError> {
        links::gather_links(|argv| match argv.split_first() {
            Some((program, args)) => exec::run_unchecked(program, args),
            None => Ok(exec::ExecResult::default()),
        })
    }

    fn runtime_version(&self) -> String {
        match exec::run("networkctl", &["--version"]) {
            Ok(result) => result.stdout,
            Err(e) => {
                tracing::debug!("local version probe failed: {e}");
                String::new()
            }
        }
    }

    fn global_config(&self) -> Result<String, ConnectorError> {
        match std::fs::read_to_string(&self.global_config_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(GLOBAL_CONFIG_PLACEHOLDER.to_string())
            }
            Err(e) => Err(io_error(&self.global_config_path)(e)),
        }
    }

    fn set_global_config(&self, content: &str) -> Result<(), ConnectorError> {
        std::fs::write(&self.global_config_path, content).map_err(io_error(&self.global_config_path))
    }

    fn reload(&self) -> Result<String, ConnectorError> {
        Self::output("networkctl", &["reload"])
    }

    fn routes(&self) -> Result<String, ConnectorError> {
        Self::output("ip", &["route", "show", "table", "all"])
    }

    fn rules(&self) -> Result<String, ConnectorError> {
        Self::output("ip", &["rule", "show"])
    }

    fn logs(&self) -> Result<String, ConnectorError> {
        Self::output(
            "journalctl",
            &["-u", "systemd-networkd", "-n", LOG_LINES, "--no-pager"],
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn connector(dir: &Path) -> LocalConnector {
        LocalConnector::new(&dir.join("network"), &dir.join("networkd.conf"))
    }

    #[test]
    fn file_round_trip_in_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("network")).expect("mkdir");
        std::fs::create_dir_all(dir.path().join("network/10-eth0.network.d")).expect("mkdir");
        let local = connector(dir.path());

        local.write_file("10-eth0.network", b"[Match]\nName=eth0\n").unwrap();
        assert_eq!(
            local.read_file("10-eth0.network").unwrap(),
            b"[Match]\nName=eth0\n"
        );

        let mut entries = local.list_entries().unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            [
                DirEntry::file("10-eth0.network"),
                DirEntry {
                    name: "10-eth0.network.d".to_string(),
                    is_dir: true
                }
            ]
        );

        local.delete_file("10-eth0.network").unwrap();
        assert!(local.read_file("10-eth0.network").unwrap_err().is_not_found());
    }

    #[test]
    fn missing_config_dir_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = connector(dir.path()).list_entries().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn global_config_placeholder_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = connector(dir.path());
        assert_eq!(local.global_config().unwrap(), GLOBAL_CONFIG_PLACEHOLDER);

        local
            .set_global_config("[Network]\nSpeedMeter=yes\n")
            .unwrap();
        assert_eq!(local.global_config().unwrap(), "[Network]\nSpeedMeter=yes\n");
    }

    #[test]
    fn host_is_local() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(connector(dir.path()).host(), LOCAL_HOST);
    }
}
