//! Per-host connector cache.
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::remote::RemoteConnector;
use super::shell::ShellTransport;
use super::{HostConnector, LOCAL_HOST};
use crate::config::RemoteSettings;
use crate::error::ConnectorError;
use crate::hosts::HostRegistry;

/// Selects the connector for a host identifier.
///
/// The local connector is shared for the life of the pool. Remote
/// connectors are created on first use, connected eagerly, and cached until
/// evicted by a connection failure, a timeout or [`ConnectorPool::invalidate`].
#[derive(Debug)]
pub struct ConnectorPool {
    local: Arc<dyn HostConnector>,
    registry: Arc<HostRegistry>,
    transport: Arc<dyn ShellTransport>,
    settings: RemoteSettings,
    remotes: Mutex<HashMap<String, Arc<RemoteConnector>>>,
}

impl ConnectorPool {
    /// Pool serving `local` for the local host and registry hosts through
    /// `transport`.
    #[must_use]
    pub fn new(
        local: Arc<dyn HostConnector>,
        registry: Arc<HostRegistry>,
        transport: Arc<dyn ShellTransport>,
        settings: RemoteSettings,
    ) -> Self {
        Self {
            local,
            registry,
            transport,
            settings,
            remotes: Mutex::new(HashMap::new()),
        }
    }

    /// The host registry backing remote lookups.
    #[must_use]
    pub const fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Deadline applied by [`ConnectorPool::call`].
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.command_timeout_secs)
    }

    /// Connector for `host`; empty or `"local"` selects the local connector.
    ///
    /// Remote connectors are connected before being returned. Two concurrent
    /// first calls for the same host share one connector and one session.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::UnknownHost`] for an unregistered host, or
    /// the connection error if the session cannot be established (the
    /// connector is then evicted).
    pub fn get(&self, host: &str) -> Result<Arc<dyn HostConnector>, ConnectorError> {
        if is_local(host) {
            return Ok(Arc::clone(&self.local));
        }
        self.remote(host)
            .map(|remote| remote as Arc<dyn HostConnector>)
    }

    /// Cached or newly created remote connector for `host`, connected.
    fn remote(&self, host: &str) -> Result<Arc<RemoteConnector>, ConnectorError> {
        let connector = {
            let mut remotes = self.remotes.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = remotes.get(host) {
                Arc::clone(existing)
            } else {
                let entry = self
                    .registry
                    .get(host)
                    .ok_or_else(|| ConnectorError::UnknownHost(host.to_string()))?;
                tracing::debug!("creating connector for {host}");
                let created = Arc::new(RemoteConnector::new(
                    entry,
                    Arc::clone(&self.transport),
                    &self.settings,
                ));
                remotes.insert(host.to_string(), Arc::clone(&created));
                created
            }
        };

        if let Err(e) = connector.connect() {
            self.evict(host, &connector);
            return Err(e);
        }
        Ok(connector)
    }

    /// Drop the cached connector for `host`, if any.
    pub fn invalidate(&self, host: &str) {
        if self
            .remotes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host)
            .is_some()
        {
            tracing::debug!("evicted connector for {host}");
        }
    }

    /// Run `op` against `host` with the configured command timeout.
    ///
    /// # Errors
    ///
    /// See [`ConnectorPool::call_with_timeout`].
    pub fn call<T, F>(&self, host: &str, op: F) -> Result<T, ConnectorError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HostConnector) -> Result<T, ConnectorError> + Send + 'static,
    {
        self.call_with_timeout(host, self.command_timeout(), op)
    }

    /// Run the blocking `op` against `host` on a worker thread, waiting at
    /// most `timeout` for it.
    ///
    /// On timeout the host's connector is evicted so the next call starts a
    /// fresh session; the abandoned worker finishes in the background. A
    /// connection error from `op` also evicts. Eviction only removes the
    /// connector `op` ran against, never a replacement cached meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Timeout`] if the deadline passes, or any
    /// error from [`ConnectorPool::get`] or `op`.
    pub fn call_with_timeout<T, F>(
        &self,
        host: &str,
        timeout: Duration,
        op: F,
    ) -> Result<T, ConnectorError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HostConnector) -> Result<T, ConnectorError> + Send + 'static,
    {
        let (connector, remote): (Arc<dyn HostConnector>, _) = if is_local(host) {
            (Arc::clone(&self.local), None)
        } else {
            let remote = self.remote(host)?;
            (Arc::clone(&remote) as Arc<dyn HostConnector>, Some(remote))
        };
        let evict = || {
            if let Some(remote) = &remote {
                self.evict(host, remote);
            }
        };

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name(format!("connector-{}", connector.host()))
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(op(connector.as_ref()));
            })
            .map_err(|source| ConnectorError::Io {
                path: "worker thread".to_string(),
                source,
            })?;

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.is_connection() {
                    evict();
                }
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("operation on {host} exceeded {}s", timeout.as_secs());
                evict();
                Err(ConnectorError::Timeout {
                    host: host.to_string(),
                    secs: timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                evict();
                Err(ConnectorError::Connection {
                    host: host.to_string(),
                    message: "operation aborted".to_string(),
                })
            }
        }
    }

    /// Remove `connector` from the cache unless it was already replaced.
    fn evict(&self, host: &str, connector: &Arc<RemoteConnector>) {
        let mut remotes = self.remotes.lock().unwrap_or_else(PoisonError::into_inner);
        if remotes.get(host).is_some_and(|cached| Arc::ptr_eq(cached, connector)) {
            remotes.remove(host);
            tracing::debug!("evicted connector for {host}");
        }
    }
}

fn is_local(host: &str) -> bool {
    host.is_empty() || host == LOCAL_HOST
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::connector::shell::{MockShellSession, MockShellTransport, ShellSession};
    use crate::hosts::HostEntry;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry_with(names: &[&str]) -> (tempfile::TempDir, Arc<HostRegistry>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = HostRegistry::load(dir.path()).expect("load registry");
        for name in names {
            registry
                .add(HostEntry {
                    name: (*name).to_string(),
                    host: format!("{name}.example.net"),
                    user: "admin".to_string(),
                    port: 22,
                    key_file: None,
                })
                .expect("add host");
        }
        (dir, Arc::new(registry))
    }

    fn pool(registry: Arc<HostRegistry>, transport: Arc<dyn ShellTransport>) -> ConnectorPool {
        ConnectorPool::new(
            Arc::new(MemoryConnector::new(LOCAL_HOST)),
            registry,
            transport,
            RemoteSettings::default(),
        )
    }

    /// Transport that counts connections and takes a while to establish them.
    #[derive(Debug, Default)]
    struct CountingTransport {
        connects: AtomicUsize,
    }

    impl ShellTransport for CountingTransport {
        fn connect(&self, _host: &HostEntry) -> Result<Arc<dyn ShellSession>, ConnectorError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(MockShellSession::new()))
        }
    }

    #[test]
    fn empty_and_local_select_local_connector() {
        let (_dir, registry) = registry_with(&[]);
        let mut transport = MockShellTransport::new();
        transport.expect_connect().never();
        let pool = pool(registry, Arc::new(transport));
        assert_eq!(pool.get("").unwrap().host(), LOCAL_HOST);
        assert_eq!(pool.get("local").unwrap().host(), LOCAL_HOST);
    }

    #[test]
    fn unknown_host_never_connects() {
        let (_dir, registry) = registry_with(&["router1"]);
        let mut transport = MockShellTransport::new();
        transport.expect_connect().never();
        let pool = pool(registry, Arc::new(transport));
        let err = pool.get("router9").unwrap_err();
        assert!(matches!(err, ConnectorError::UnknownHost(ref h) if h == "router9"));
    }

    #[test]
    fn concurrent_first_use_connects_once() {
        let (_dir, registry) = registry_with(&["host1"]);
        let transport = Arc::new(CountingTransport::default());
        let pool = pool(registry, Arc::clone(&transport) as Arc<dyn ShellTransport>);
        let barrier = Barrier::new(2);

        let (a, b) = std::thread::scope(|s| {
            let first = s.spawn(|| {
                barrier.wait();
                pool.get("host1").unwrap()
            });
            let second = s.spawn(|| {
                barrier.wait();
                pool.get("host1").unwrap()
            });
            (first.join().unwrap(), second.join().unwrap())
        });

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn cached_connector_is_reused_until_invalidated() {
        let (_dir, registry) = registry_with(&["host1"]);
        let transport = Arc::new(CountingTransport::default());
        let pool = pool(registry, Arc::clone(&transport) as Arc<dyn ShellTransport>);

        let a = pool.get("host1").unwrap();
        let b = pool.get("host1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        pool.invalidate("host1");
        let c = pool.get("host1").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_connect_evicts_connector() {
        let (_dir, registry) = registry_with(&["host1"]);
        let mut transport = MockShellTransport::new();
        transport.expect_connect().times(2).returning(|host| {
            Err(ConnectorError::Connection {
                host: host.name.clone(),
                message: "No route to host".to_string(),
            })
        });
        let pool = pool(registry, Arc::new(transport));
        assert!(pool.get("host1").unwrap_err().is_connection());
        assert!(pool.get("host1").unwrap_err().is_connection());
    }

    #[test]
    fn call_returns_operation_result() {
        let (_dir, registry) = registry_with(&[]);
        let pool = pool(registry, Arc::new(MockShellTransport::new()));
        let lines = pool
            .call("local", |c| Ok(c.routes()?.lines().count()))
            .unwrap();
        assert_eq!(lines, 1);
    }

    #[test]
    fn timeout_evicts_and_reports() {
        let (_dir, registry) = registry_with(&["host1"]);
        let transport = Arc::new(CountingTransport::default());
        let pool = pool(registry, Arc::clone(&transport) as Arc<dyn ShellTransport>);

        let err = pool
            .call_with_timeout("host1", Duration::from_millis(20), |_| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Timeout { ref host, .. } if host == "host1"));

        pool.get("host1").unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connection_error_from_operation_evicts() {
        let (_dir, registry) = registry_with(&["host1"]);
        let transport = Arc::new(CountingTransport::default());
        let pool = pool(registry, Arc::clone(&transport) as Arc<dyn ShellTransport>);

        let err = pool
            .call("host1", |_| -> Result<(), ConnectorError> {
                Err(ConnectorError::Connection {
                    host: "host1".to_string(),
                    message: "broken pipe".to_string(),
                })
            })
            .unwrap_err();
        assert!(err.is_connection());
        pool.get("host1").unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn late_failure_leaves_replacement_cached() {
        let (_dir, registry) = registry_with(&["host1"]);
        let transport = Arc::new(CountingTransport::default());
        let pool = pool(registry, Arc::clone(&transport) as Arc<dyn ShellTransport>);
        let (started_tx, started_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();

        let replacement = std::thread::scope(|s| {
            let failing = s.spawn(|| {
                pool.call("host1", move |_| -> Result<(), ConnectorError> {
                    started_tx.send(()).unwrap();
                    go_rx.recv().unwrap();
                    Err(ConnectorError::Connection {
                        host: "host1".to_string(),
                        message: "broken pipe".to_string(),
                    })
                })
            });
            started_rx.recv().unwrap();
            pool.invalidate("host1");
            let replacement = pool.get("host1").unwrap();
            go_tx.send(()).unwrap();
            assert!(failing.join().unwrap().unwrap_err().is_connection());
            replacement
        });

        assert!(Arc::ptr_eq(&pool.get("host1").unwrap(), &replacement));
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }
}
