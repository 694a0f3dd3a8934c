use std::collections::btree_map::{BTreeMap, Iter};
use std::num::NonZeroUsize;

/// Static process and host metadata attached to every snapshot.
///
/// Entries are kept in key order so that reporters render them deterministically.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EnvironmentInfo {
    entries: BTreeMap<String, String>,
}

impl EnvironmentInfo {
    /// Creates an empty `EnvironmentInfo`.
    pub fn new() -> EnvironmentInfo {
        EnvironmentInfo::default()
    }

    /// Discovers basic metadata about the current process.
    ///
    /// Collects the process ID and name, operating system, architecture, the available parallelism
    /// and, where the environment exposes it, the host name.
    pub fn from_process() -> EnvironmentInfo {
        let mut info = EnvironmentInfo::new()
            .with("process.id", std::process::id().to_string())
            .with("os.name", std::env::consts::OS)
            .with("os.family", std::env::consts::FAMILY)
            .with("os.arch", std::env::consts::ARCH)
            .with(
                "runtime.available_parallelism",
                std::thread::available_parallelism().map_or(1, NonZeroUsize::get).to_string(),
            )
            .with("metrics_engine.version", env!("CARGO_PKG_VERSION"));

        let process_name = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()));
        if let Some(name) = process_name {
            info.insert("process.name", name);
        }

        let host_name = ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|value| !value.is_empty()));
        if let Some(host) = host_name {
            info.insert("host.name", host);
        }

        info
    }

    /// Adds an entry, replacing any existing entry with the same key.
    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.insert(key, value);
        self
    }

    /// Inserts an entry, returning the value it replaced.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.entries.insert(key.into(), value.into())
    }

    /// Gets the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Iterates over every entry, in key order.
    pub fn iter(&self) -> Iter<'_, String, String> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a EnvironmentInfo {
    type Item = (&'a String, &'a String);
    type IntoIter = Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Supplies the environment metadata for a context.
///
/// Consulted once, when the context is built; the result is attached verbatim to every snapshot.
pub trait EnvironmentInfoProvider: Send + Sync {
    /// Collects the environment metadata.
    fn environment_info(&self) -> EnvironmentInfo;
}

/// Provides [`EnvironmentInfo::from_process`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl EnvironmentInfoProvider for ProcessEnvironment {
    fn environment_info(&self) -> EnvironmentInfo {
        EnvironmentInfo::from_process()
    }
}

impl EnvironmentInfoProvider for EnvironmentInfo {
    fn environment_info(&self) -> EnvironmentInfo {
        self.clone()
    }
}
