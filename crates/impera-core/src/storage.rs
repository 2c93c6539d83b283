//! Persistence collaborators.
//!
//! The engine persists each state variable under its own name through a
//! [`StorageBackend`]: a synchronous key-value text store. The engine never
//! deletes keys.
//!
//! # Backends
//!
//! - [`MemoryStorage`]: shared in-memory map. Clones share contents, which
//!   lets a test keep a handle and inspect what the engine wrote.
//! - [`PrefixedStorage`]: namespaces every key of an inner backend.
//! - `FileStorage` (feature `state-persistence`): a JSON object file holding
//!   every key, rewritten atomically on each store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::StorageError;

/// Synchronous key-value text store keyed by cell name.
pub trait StorageBackend {
    /// Read the text stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `text` under `key`, replacing any previous text.
    fn store(&self, key: &str, text: &str) -> Result<(), StorageError>;
}

/// In-memory storage. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored text for `key`.
    #[must_use]
    pub fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    /// Write raw text, bypassing any cell (used to seed or corrupt entries).
    pub fn insert_raw(&self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.borrow_mut().insert(key.into(), text.into());
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get_raw(key))
    }

    fn store(&self, key: &str, text: &str) -> Result<(), StorageError> {
        self.insert_raw(key, text);
        Ok(())
    }
}

/// Prepends a fixed prefix to every key of the wrapped backend.
pub struct PrefixedStorage {
    prefix: String,
    inner: Rc<dyn StorageBackend>,
}

impl PrefixedStorage {
    #[must_use]
    pub fn new(prefix: impl Into<String>, inner: Rc<dyn StorageBackend>) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl std::fmt::Debug for PrefixedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedStorage")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl StorageBackend for PrefixedStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.load(&self.key(key))
    }

    fn store(&self, key: &str, text: &str) -> Result<(), StorageError> {
        self.inner.store(&self.key(key), text)
    }
}

#[cfg(feature = "state-persistence")]
pub use file::FileStorage;

#[cfg(feature = "state-persistence")]
mod file {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use super::StorageBackend;
    use crate::error::StorageError;

    /// JSON-file storage: one object mapping keys to stored text.
    ///
    /// The file is read on first access and cached. Every store rewrites the
    /// whole document through a sibling temp file followed by a rename, so a
    /// crash never leaves a half-written document behind.
    #[derive(Debug)]
    pub struct FileStorage {
        path: PathBuf,
        cache: RefCell<Option<BTreeMap<String, String>>>,
    }

    impl FileStorage {
        #[must_use]
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self {
                path: path.into(),
                cache: RefCell::new(None),
            }
        }

        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn read_document(&self) -> Result<BTreeMap<String, String>, StorageError> {
            match fs::read_to_string(&self.path) {
                Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
                Ok(text) => serde_json::from_str(&text)
                    .map_err(|err| StorageError::Malformed(err.to_string())),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
                Err(err) => Err(err.into()),
            }
        }

        fn with_entries<R>(
            &self,
            f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
        ) -> Result<R, StorageError> {
            let mut cache = self.cache.borrow_mut();
            if cache.is_none() {
                *cache = Some(self.read_document()?);
            }
            match cache.as_mut() {
                Some(entries) => Ok(f(entries)),
                None => Ok(f(&mut BTreeMap::new())),
            }
        }

        fn write_document(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
            let text = serde_json::to_string_pretty(entries)
                .map_err(|err| StorageError::Malformed(err.to_string()))?;
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let tmp = self.path.with_extension("tmp");
            fs::write(&tmp, text)?;
            fs::rename(&tmp, &self.path)?;
            Ok(())
        }
    }

    impl StorageBackend for FileStorage {
        fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.with_entries(|entries| entries.get(key).cloned())
        }

        fn store(&self, key: &str, text: &str) -> Result<(), StorageError> {
            let mut next = self.with_entries(|entries| entries.clone())?;
            next.insert(key.to_owned(), text.to_owned());
            self.write_document(&next)?;
            *self.cache.borrow_mut() = Some(next);
            Ok(())
        }
    }

}
