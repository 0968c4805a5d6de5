//! Item registry
//!
//! Persistent store of installed item records, keyed by `(kind, name)`.
//! The store is a single JSON document; every mutation is written through
//! before the call returns so later reads in the same process never see
//! stale state.

mod document;

use log::{debug, info};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::item::{Item, Kind};
use crate::runtime::Runtime;

use document::RegistryDocument;

type Key = (Kind, String);

/// Registry of installed items backed by `registry.json`.
pub struct ItemRegistry<'a, R: Runtime> {
    runtime: &'a R,
    path: PathBuf,
    items: BTreeMap<Key, Item>,
    initialized: bool,
}

impl<'a, R: Runtime> ItemRegistry<'a, R> {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty, uninitialized registry; nothing is
    /// written until [`initialize`](Self::initialize) or the first mutation.
    #[tracing::instrument(skip(runtime))]
    pub fn open(runtime: &'a R, path: &Path) -> Result<Self> {
        let mut registry = Self {
            runtime,
            path: path.to_path_buf(),
            items: BTreeMap::new(),
            initialized: false,
        };

        if runtime.exists(path) {
            let content = runtime
                .read_to_string(path)
                .or_io(|| format!("Failed to read registry {:?}", path))?;
            let document = RegistryDocument::parse(&content)?;
            for item in document.items {
                registry.items.insert((item.kind, item.name.clone()), item);
            }
            registry.initialized = true;
            debug!("Loaded {} item(s) from {:?}", registry.items.len(), path);
        }

        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the backing store has been created yet.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Create the backing store if it does not exist yet.
    pub fn initialize(&mut self) -> Result<()> {
        if !self.initialized {
            info!("Creating registry at {:?}", self.path);
            self.save()?;
        }
        Ok(())
    }

    /// Insert a record. Fails with `AlreadyExists` unless `force` is set.
    #[tracing::instrument(skip(self, item), fields(kind = %item.kind, name = %item.name))]
    pub fn create(&mut self, item: Item, force: bool) -> Result<()> {
        item.validate()?;

        let key = (item.kind, item.name.clone());
        if !force && self.items.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: item.kind,
                name: item.name,
            });
        }

        let previous = self.items.insert(key.clone(), item);
        if let Err(e) = self.save() {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => self.items.insert(key, old),
                None => self.items.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove a record. `force` only matters to interactive callers.
    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, kind: Kind, name: &str, force: bool) -> Result<Item> {
        let key = (kind, name.to_string());
        let removed = self
            .items
            .remove(&key)
            .ok_or_else(|| Error::not_found(kind, name))?;

        if let Err(e) = self.save() {
            self.items.insert(key, removed);
            return Err(e);
        }
        debug!("Removed {} '{}' from registry (force={})", kind, name, force);
        Ok(removed)
    }

    pub fn get(&self, kind: Kind, name: &str) -> Result<&Item> {
        self.items
            .get(&(kind, name.to_string()))
            .ok_or_else(|| Error::not_found(kind, name))
    }

    pub fn exists(&self, kind: Kind, name: &str) -> bool {
        self.items.contains_key(&(kind, name.to_string()))
    }

    /// Records of one kind, ordered by name.
    pub fn list(&self, kind: Kind) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, item)| item)
            .collect()
    }

    /// Every record, ordered by kind then name.
    pub fn list_all(&self) -> Vec<&Item> {
        self.items.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every record and rewrite an empty store. Idempotent.
    #[tracing::instrument(skip(self))]
    pub fn purge(&mut self) -> Result<()> {
        self.items.clear();
        if self.runtime.exists(&self.path) {
            self.runtime
                .remove_file(&self.path)
                .or_io(|| format!("Failed to remove registry {:?}", self.path))?;
        }
        self.initialized = false;
        self.save()
    }

    fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !self.runtime.exists(parent)
        {
            self.runtime
                .create_dir_all(parent)
                .or_io(|| format!("Failed to create {:?}", parent))?;
        }

        let document = RegistryDocument::new(self.items.values().cloned().collect());
        let content = document.render()?;
        self.runtime
            .write(&self.path, content.as_bytes())
            .or_io(|| format!("Failed to save registry to {:?}", self.path))?;
        self.initialized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Health, Version};
    use crate::runtime::{MockRuntime, RealRuntime};
    use tempfile::tempdir;

    fn module(name: &str) -> Item {
        Item::new(Kind::Module, name, Health::Stable)
            .with_version(Version::new(1, 2))
            .with_author("tester")
            .with_about("does things")
    }

    #[test]
    fn test_open_missing_store_is_uninitialized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let registry = ItemRegistry::open(&RealRuntime, &path).unwrap();
        assert!(!registry.is_initialized());
        assert!(registry.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_create_then_get() {
        let dir = tempdir().unwrap();
        let mut registry = ItemRegistry::open(&RealRuntime, &dir.path().join("r.json")).unwrap();

        registry.create(module("hello"), false).unwrap();

        assert!(registry.is_initialized());
        assert_eq!(registry.get(Kind::Module, "hello").unwrap(), &module("hello"));
        assert!(registry.exists(Kind::Module, "hello"));
        assert!(!registry.exists(Kind::Binary, "hello"));
    }

    #[test]
    fn test_create_twice_without_force_keeps_original() {
        let dir = tempdir().unwrap();
        let mut registry = ItemRegistry::open(&RealRuntime, &dir.path().join("r.json")).unwrap();
        registry.create(module("hello"), false).unwrap();

        let replacement = Item::new(Kind::Module, "hello", Health::Broken);
        let err = registry.create(replacement.clone(), false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: Kind::Module, .. }));
        assert_eq!(registry.get(Kind::Module, "hello").unwrap(), &module("hello"));

        // With force the record is overwritten
        registry.create(replacement.clone(), true).unwrap();
        assert_eq!(registry.get(Kind::Module, "hello").unwrap(), &replacement);
    }

    #[test]
    fn test_same_name_different_kind_is_allowed() {
        let dir = tempdir().unwrap();
        let mut registry = ItemRegistry::open(&RealRuntime, &dir.path().join("r.json")).unwrap();

        registry.create(module("tool"), false).unwrap();
        registry
            .create(Item::new(Kind::Binary, "tool", Health::Beta), false)
            .unwrap();

        assert_eq!(registry.list_all().len(), 2);
    }

    #[test]
    fn test_invalid_name_does_not_mutate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        let mut registry = ItemRegistry::open(&RealRuntime, &path).unwrap();

        let err = registry
            .create(Item::new(Kind::Module, "../escape", Health::Stable), false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(registry.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let mut registry = ItemRegistry::open(&RealRuntime, &dir.path().join("r.json")).unwrap();

        let err = registry.delete(Kind::Module, "ghost", false).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        registry.create(module("hello"), false).unwrap();
        let removed = registry.delete(Kind::Module, "hello", true).unwrap();
        assert_eq!(removed.name, "hello");
        assert!(matches!(
            registry.get(Kind::Module, "hello"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_is_ordered_by_name() {
        let dir = tempdir().unwrap();
        let mut registry = ItemRegistry::open(&RealRuntime, &dir.path().join("r.json")).unwrap();
        for name in ["zeta", "alpha", "mid"] {
            registry.create(module(name), false).unwrap();
        }
        registry
            .create(Item::new(Kind::Binary, "aaa", Health::Stable), false)
            .unwrap();

        let names: Vec<_> = registry
            .list(Kind::Module)
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);

        // Binaries sort before modules
        assert_eq!(registry.list_all()[0].kind, Kind::Binary);
    }

    #[test]
    fn test_mutations_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        {
            let mut registry = ItemRegistry::open(&RealRuntime, &path).unwrap();
            registry.create(module("one"), false).unwrap();
            registry.create(module("two"), false).unwrap();
            registry.delete(Kind::Module, "one", false).unwrap();
        }

        let registry = ItemRegistry::open(&RealRuntime, &path).unwrap();
        assert!(registry.is_initialized());
        assert_eq!(registry.list_all(), vec![&module("two")]);
    }

    #[test]
    fn test_purge_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        let mut registry = ItemRegistry::open(&RealRuntime, &path).unwrap();
        registry.create(module("one"), false).unwrap();

        registry.purge().unwrap();
        registry.purge().unwrap();

        assert!(registry.is_empty());
        assert!(registry.is_initialized());
        let reopened = ItemRegistry::open(&RealRuntime, &path).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn test_failed_write_rolls_back_memory() {
        let mut runtime = MockRuntime::new();
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_write()
            .returning(|_, _| Err(anyhow::anyhow!("read-only file system")));

        let mut registry = ItemRegistry {
            runtime: &runtime,
            path: PathBuf::from("/data/registry.json"),
            items: BTreeMap::new(),
            initialized: true,
        };

        let err = registry.create(module("hello"), false).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!registry.exists(Kind::Module, "hello"));
    }
}
