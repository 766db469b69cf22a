//! Key-value storage handed out to plugins.

use scriptforge_runtime::RuntimeResult;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// An open key-value store.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> RuntimeResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> RuntimeResult<()>;

    /// Remove a key. Returns true if it existed.
    fn remove(&self, key: &str) -> RuntimeResult<bool>;

    /// All keys, sorted.
    fn keys(&self) -> RuntimeResult<Vec<String>>;
}

/// Opens stores by file path.
pub trait StorageEngine {
    fn open(&self, path: &Path) -> RuntimeResult<Rc<dyn KeyValueStore>>;
}

/// A named store owned by one plugin.
#[derive(Clone)]
pub struct StorageHandle {
    name: String,
    path: PathBuf,
    store: Rc<dyn KeyValueStore>,
}

impl StorageHandle {
    pub fn new(name: impl Into<String>, path: PathBuf, store: Rc<dyn KeyValueStore>) -> Self {
        Self {
            name: name.into(),
            path,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// True if both handles refer to the same open store.
    pub fn same_store(&self, other: &StorageHandle) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> RuntimeResult<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> RuntimeResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> RuntimeResult<bool> {
        Ok(self.entries.borrow_mut().remove(key).is_some())
    }

    fn keys(&self) -> RuntimeResult<Vec<String>> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

/// Storage engine keeping every store in memory, keyed by path.
///
/// Reopening a path returns the same contents, like a file-backed engine.
#[derive(Default)]
pub struct MemoryStorage {
    stores: RefCell<HashMap<PathBuf, Rc<MemoryStore>>>,
    opens: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `open` was called.
    pub fn open_count(&self) -> usize {
        self.opens.get()
    }
}

impl StorageEngine for MemoryStorage {
    fn open(&self, path: &Path) -> RuntimeResult<Rc<dyn KeyValueStore>> {
        self.opens.set(self.opens.get() + 1);
        let store = Rc::clone(
            self.stores
                .borrow_mut()
                .entry(path.to_path_buf())
                .or_default(),
        );
        Ok(store as Rc<dyn KeyValueStore>)
    }
}
