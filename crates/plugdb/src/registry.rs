//! Backend registry.
//!
//! Maps backend names to constructors so callers can pick a storage engine
//! by name at runtime. A process-wide registry preloaded with the built-in
//! backends sits behind [`new_db`] and [`register_backend`]; independent
//! [`Registry`] values can be built for tests or embedding.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::backends::{LogDb, MemDb, NullDb, RedbDb};
use crate::engine::{Database, StorageError, StorageResult};

/// A function that opens the store `name` inside directory `dir`.
pub type Constructor = Arc<dyn Fn(&str, &Path) -> StorageResult<Box<dyn Database>> + Send + Sync>;

/// The backends compiled into this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// In-memory ordered map.
    MemDb,
    /// In-memory table with a write-ahead log.
    LogDb,
    /// Embedded redb B-tree.
    Redb,
    /// Stores nothing.
    NullDb,
}

impl BackendType {
    /// Every built-in backend.
    pub const ALL: [Self; 4] = [Self::MemDb, Self::LogDb, Self::Redb, Self::NullDb];

    /// The name the backend is registered under.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MemDb => "memdb",
            Self::LogDb => "logdb",
            Self::Redb => "redb",
            Self::NullDb => "nulldb",
        }
    }

    /// Whether the backend keeps data on disk.
    pub const fn is_persistent(self) -> bool {
        matches!(self, Self::LogDb | Self::Redb)
    }

    fn constructor(self) -> Constructor {
        match self {
            Self::MemDb => Arc::new(open_memdb),
            Self::LogDb => Arc::new(open_logdb),
            Self::Redb => Arc::new(open_redb),
            Self::NullDb => Arc::new(open_nulldb),
        }
    }
}

fn open_memdb(_name: &str, _dir: &Path) -> StorageResult<Box<dyn Database>> {
    Ok(Box::new(MemDb::new()))
}

fn open_logdb(name: &str, dir: &Path) -> StorageResult<Box<dyn Database>> {
    let path = store_path(name, dir, "logdb")?;
    Ok(Box::new(LogDb::open(path)?))
}

fn open_redb(name: &str, dir: &Path) -> StorageResult<Box<dyn Database>> {
    let path = store_path(name, dir, "redb")?;
    Ok(Box::new(RedbDb::open(path)?))
}

fn open_nulldb(_name: &str, _dir: &Path) -> StorageResult<Box<dyn Database>> {
    Ok(Box::new(NullDb::new()))
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| StorageError::UnknownBackend(s.to_string()))
    }
}

/// `<dir>/<name>.<ext>`, creating `dir` if needed.
///
/// An empty `dir` means the working directory.
fn store_path(name: &str, dir: &Path, ext: &str) -> StorageResult<PathBuf> {
    if name.is_empty() {
        return Err(StorageError::InvalidArgument("database name must not be empty".into()));
    }
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dir.join(format!("{name}.{ext}")))
}

/// A name to constructor mapping.
///
/// Safe to share: registration and lookup may race freely. Registering a
/// name twice replaces the earlier constructor.
#[derive(Default)]
pub struct Registry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every [`BackendType`].
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for backend in BackendType::ALL {
            registry.register_constructor(backend.as_str(), backend.constructor());
        }
        registry
    }

    /// Register `constructor` under `name`, replacing any earlier one.
    pub fn register<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &Path) -> StorageResult<Box<dyn Database>> + Send + Sync + 'static,
    {
        self.register_constructor(name, Arc::new(constructor));
    }

    /// Register an already shared constructor under `name`.
    pub fn register_constructor(&self, name: impl Into<String>, constructor: Constructor) {
        let name = name.into();
        // The map is valid after any panic, so poisoning is ignored.
        let mut constructors = self.constructors.write().unwrap_or_else(PoisonError::into_inner);
        if constructors.insert(name.clone(), constructor).is_some() {
            debug!(backend = %name, "replaced backend constructor");
        } else {
            debug!(backend = %name, "registered backend");
        }
    }

    /// Open store `name` in `dir` with the backend registered as `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::UnknownBackend`] if nothing is registered under
    /// `backend`, or [`StorageError::BackendOpen`] wrapping the constructor's
    /// failure.
    pub fn open(
        &self,
        name: &str,
        backend: &str,
        dir: impl AsRef<Path>,
    ) -> StorageResult<Box<dyn Database>> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(backend)
            .cloned()
            .ok_or_else(|| StorageError::UnknownBackend(backend.to_string()))?;

        // The lock is released before the constructor runs, so constructors
        // may do I/O or register further backends.
        let dir = dir.as_ref();
        debug!(name, backend, dir = %dir.display(), "opening database");
        constructor(name, dir).map_err(|e| match e {
            e @ StorageError::BackendOpen { .. } => e,
            e => StorageError::open(backend, e),
        })
    }

    /// Names of every registered backend, sorted.
    pub fn backends(&self) -> Vec<String> {
        let constructors = self.constructors.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a constructor is registered under `name`.
    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("backends", &self.backends()).finish()
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// The process-wide registry, with the built-ins registered on first use.
pub fn global() -> &'static Registry {
    GLOBAL.get_or_init(Registry::with_builtins)
}

/// Register a backend in the process-wide registry.
///
/// A later registration under the same name replaces the earlier one.
pub fn register_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn(&str, &Path) -> StorageResult<Box<dyn Database>> + Send + Sync + 'static,
{
    global().register(name, constructor);
}

/// Open store `name` in `dir` using the backend registered as `backend`.
///
/// On-disk backends store their data at `<dir>/<name>.<backend>` and create
/// `dir` if it is missing.
///
/// # Errors
///
/// Returns [`StorageError::UnknownBackend`] for an unregistered backend, or
/// [`StorageError::BackendOpen`] if the backend fails to open the store.
///
/// # Example
///
/// ```ignore
/// use plugdb::{new_db, Database};
///
/// let db = new_db("state", "logdb", "data")?; // data/state.logdb
/// db.set_sync(b"height", b"42")?;
/// db.close()?;
/// ```
pub fn new_db(name: &str, backend: &str, dir: impl AsRef<Path>) -> StorageResult<Box<dyn Database>> {
    global().open(name, backend, dir)
}
