//! Versioned schema generations and the per-kind type lookups built from them.
pub mod index;
pub mod version;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{Error, SchemaError};

pub use index::{KindIndex, build_index, try_build_index};
pub use version::{
    DEFAULT_SCHEMA_VERSION, parse_networkctl_version, parse_version, resolve_version,
    resolve_version_with_default,
};

/// The four configuration kinds managed by systemd-networkd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigKind {
    /// `.network` files.
    Network,
    /// `.netdev` files.
    #[serde(rename = "netdev")]
    NetDev,
    /// `.link` files.
    Link,
    /// The global `networkd.conf`.
    NetworkdConf,
}

impl ConfigKind {
    /// Every kind, in schema-loading order.
    pub const ALL: [Self; 4] = [Self::Network, Self::NetDev, Self::Link, Self::NetworkdConf];

    /// Kinds stored as individual files in the configuration directory.
    pub const FILE_KINDS: [Self; 3] = [Self::Network, Self::NetDev, Self::Link];

    /// Identifier used on the command line and in JSON output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::NetDev => "netdev",
            Self::Link => "link",
            Self::NetworkdConf => "networkd-conf",
        }
    }

    /// Filename extension, including the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Network => ".network",
            Self::NetDev => ".netdev",
            Self::Link => ".link",
            Self::NetworkdConf => ".conf",
        }
    }

    /// Schema document filename inside a generation directory.
    #[must_use]
    pub const fn schema_file(self) -> &'static str {
        match self {
            Self::Network => "systemd.network.schema.json",
            Self::NetDev => "systemd.netdev.schema.json",
            Self::Link => "systemd.link.schema.json",
            Self::NetworkdConf => "systemd.networkd.conf.schema.json",
        }
    }

    /// Kind of a file in the configuration directory, by extension.
    ///
    /// `networkd.conf` never lives in the configuration directory, so only
    /// the three file kinds are recognized.
    #[must_use]
    pub fn from_filename(name: &str) -> Option<Self> {
        Self::FILE_KINDS
            .into_iter()
            .find(|kind| name.len() > kind.extension().len() && name.ends_with(kind.extension()))
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// Cumulative type flags for one configuration key. All flags unset means a
/// scalar string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    /// The key may repeat; values form a list.
    pub is_array: bool,
    /// Values are booleans.
    pub is_bool: bool,
    /// Values are integers.
    pub is_int: bool,
}

/// Lookup of (kind, section, key) to [`TypeInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeIndex {
    kinds: HashMap<ConfigKind, BTreeMap<String, BTreeMap<String, TypeInfo>>>,
}

impl TypeIndex {
    /// Replace the section/key table for `kind`.
    pub fn insert(&mut self, kind: ConfigKind, sections: BTreeMap<String, BTreeMap<String, TypeInfo>>) {
        self.kinds.insert(kind, sections);
    }

    /// Type of `key` in `section`; unknown keys are scalar strings.
    #[must_use]
    pub fn lookup(&self, kind: ConfigKind, section: &str, key: &str) -> TypeInfo {
        self.kinds
            .get(&kind)
            .and_then(|sections| sections.get(section))
            .and_then(|keys| keys.get(key))
            .copied()
            .unwrap_or_default()
    }

    /// Number of typed keys recorded for `kind`.
    #[must_use]
    pub fn key_count(&self, kind: ConfigKind) -> usize {
        self.kinds
            .get(&kind)
            .map_or(0, |sections| sections.values().map(BTreeMap::len).sum())
    }
}

/// Per-kind sets of section names that may appear more than once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepeatableSections {
    kinds: HashMap<ConfigKind, BTreeSet<String>>,
}

impl RepeatableSections {
    /// Replace the repeatable set for `kind`.
    pub fn insert(&mut self, kind: ConfigKind, sections: BTreeSet<String>) {
        self.kinds.insert(kind, sections);
    }

    /// Whether `section` is repeatable for `kind`.
    #[must_use]
    pub fn contains(&self, kind: ConfigKind, section: &str) -> bool {
        self.kinds
            .get(&kind)
            .is_some_and(|sections| sections.contains(section))
    }

    /// Sorted repeatable section names for `kind`.
    #[must_use]
    pub fn sections(&self, kind: ConfigKind) -> Vec<&str> {
        self.kinds
            .get(&kind)
            .map(|sections| sections.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// This set extended with `fallback` for every kind.
    #[must_use]
    pub fn merged_with(&self, fallback: &[String]) -> Self {
        let mut merged = self.clone();
        for kind in ConfigKind::ALL {
            merged
                .kinds
                .entry(kind)
                .or_default()
                .extend(fallback.iter().cloned());
        }
        merged
    }
}

/// One loaded schema generation.
#[derive(Debug, Default)]
pub struct SchemaGeneration {
    /// Generation number (directory `v<N>`).
    pub version: u32,
    /// Key types for every kind.
    pub types: TypeIndex,
    /// Schema-derived repeatable sections for every kind.
    pub repeatable: RepeatableSections,
    raw: HashMap<ConfigKind, Arc<serde_json::Value>>,
}

impl SchemaGeneration {
    /// Build a generation from already-parsed schema documents.
    #[must_use]
    pub fn from_documents(version: u32, documents: Vec<(ConfigKind, serde_json::Value)>) -> Self {
        let mut generation = Self {
            version,
            ..Self::default()
        };
        for (kind, document) in documents {
            let built = build_index(kind, &document);
            generation.types.insert(kind, built.types);
            generation.repeatable.insert(kind, built.repeatable);
            generation.raw.insert(kind, Arc::new(document));
        }
        generation
    }

    /// Raw schema document for `kind`, if it loaded.
    #[must_use]
    pub fn raw(&self, kind: ConfigKind) -> Option<Arc<serde_json::Value>> {
        self.raw.get(&kind).cloned()
    }
}

/// Discovers schema generations under a base directory and caches loaded
/// generations for the life of the process.
#[derive(Debug)]
pub struct SchemaStore {
    base_dir: PathBuf,
    default_version: u32,
    available: BTreeSet<u32>,
    cache: Mutex<HashMap<u32, Arc<SchemaGeneration>>>,
}

impl SchemaStore {
    /// Scan `base_dir` for `v<N>` subdirectories.
    ///
    /// A missing or unreadable base directory yields a store with no
    /// available generations.
    #[must_use]
    pub fn open(base_dir: &Path, default_version: u32) -> Self {
        let available = discover_generations(base_dir);
        if available.is_empty() {
            tracing::warn!("no schema generations found under {}", base_dir.display());
        } else {
            tracing::debug!(
                "schema generations under {}: {:?}",
                base_dir.display(),
                available
            );
        }
        Self {
            base_dir: base_dir.to_path_buf(),
            default_version,
            available,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Available generation numbers, ascending.
    #[must_use]
    pub const fn available(&self) -> &BTreeSet<u32> {
        &self.available
    }

    /// Generation used when no runtime version is known.
    #[must_use]
    pub const fn default_version(&self) -> u32 {
        self.default_version
    }

    /// Best-fit generation for a detected runtime version.
    ///
    /// Accepts a plain version (`256`, `v257-rc1`) or raw
    /// `networkctl --version` output (`systemd 256 (256.4)`).
    #[must_use]
    pub fn resolve(&self, detected: &str) -> u32 {
        match parse_networkctl_version(detected) {
            Some(version) => {
                resolve_version_with_default(&version.to_string(), &self.available, self.default_version)
            }
            None => resolve_version_with_default(detected, &self.available, self.default_version),
        }
    }

    /// Load (or fetch from cache) generation `version`.
    ///
    /// Individual schema files that are missing or malformed degrade to an
    /// empty index for their kind.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownGeneration`] if there is no `v<N>`
    /// directory for `version`.
    pub fn generation(&self, version: u32) -> Result<Arc<SchemaGeneration>, SchemaError> {
        if !self.available.contains(&version) {
            return Err(SchemaError::UnknownGeneration(version));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(generation) = cache.get(&version) {
            tracing::debug!("schema generation v{version} served from cache");
            return Ok(Arc::clone(generation));
        }

        let dir = self.base_dir.join(format!("v{version}"));
        let documents = ConfigKind::ALL
            .into_iter()
            .filter_map(|kind| match load_document(&dir.join(kind.schema_file())) {
                Ok(document) => Some((kind, document)),
                Err(e) => {
                    tracing::warn!("schema for {kind} in v{version} unavailable: {e}");
                    None
                }
            })
            .collect();

        let generation = Arc::new(SchemaGeneration::from_documents(version, documents));
        tracing::info!("loaded schema generation v{version}");
        cache.insert(version, Arc::clone(&generation));
        Ok(generation)
    }

    /// Raw schema document for `kind` in generation `version`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownGeneration`] for an unavailable
    /// generation, or [`SchemaError::MissingProperties`] if that kind's
    /// schema did not load.
    pub fn raw_schema(
        &self,
        version: u32,
        kind: ConfigKind,
    ) -> Result<Arc<serde_json::Value>, SchemaError> {
        self.generation(version)?
            .raw(kind)
            .ok_or_else(|| SchemaError::MissingProperties {
                kind: kind.to_string(),
            })
    }
}

/// Collect `N` for every `v<N>` subdirectory of `base_dir`.
fn discover_generations(base_dir: &Path) -> BTreeSet<u32> {
    let Ok(entries) = std::fs::read_dir(base_dir) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_prefix('v'))
                .and_then(|n| n.parse().ok())
        })
        .collect()
}

/// Read and parse one schema document.
fn load_document(path: &Path) -> Result<serde_json::Value, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| SchemaError::InvalidJson {
        path: path.display().to_string(),
        source,
    })
}
