//! Installation engine
//!
//! Copies payloads into the managed layout and commits their records to the
//! registry, in that order, rolling the payload back when the commit fails.

pub mod detect;
pub mod helpers;
pub mod payload;

use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::item::{Item, Kind};
use crate::layout::DataLayout;
use crate::registry::ItemRegistry;
use crate::runtime::Runtime;

pub use detect::detect_module;
pub use payload::{TreeEntry, walk_tree};

/// An item together with where its payload currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub item: Item,
    pub local_name: PathBuf,
}

impl InstallRequest {
    pub fn new(item: Item, local_name: impl Into<PathBuf>) -> Self {
        Self {
            item,
            local_name: local_name.into(),
        }
    }
}

pub struct Installer<'a, R: Runtime> {
    runtime: &'a R,
    layout: DataLayout,
    registry: ItemRegistry<'a, R>,
}

impl<'a, R: Runtime> Installer<'a, R> {
    /// Open the registry of `layout`. Nothing is created on disk yet.
    pub fn new(runtime: &'a R, layout: DataLayout) -> Result<Self> {
        let registry = ItemRegistry::open(runtime, &layout.registry_path())?;
        Ok(Self {
            runtime,
            layout,
            registry,
        })
    }

    pub fn runtime(&self) -> &'a R {
        self.runtime
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn registry(&self) -> &ItemRegistry<'a, R> {
        &self.registry
    }

    /// Create the managed directories, the helper scripts and the registry
    /// store if any of them are missing.
    #[tracing::instrument(skip(self))]
    pub fn ensure_layout(&mut self) -> Result<()> {
        for dir in self.layout.managed_dirs() {
            if !self.runtime.is_dir(&dir) {
                debug!("Creating {:?}", dir);
                self.runtime
                    .create_dir_all(&dir)
                    .or_io(|| format!("Failed to create {:?}", dir))?;
            }
        }
        for (path, content) in [
            (self.layout.log_helper(), helpers::LOG_SH),
            (self.layout.core_helper(), helpers::CORE_SH),
        ] {
            if !self.runtime.exists(&path) {
                self.runtime
                    .write(&path, content.as_bytes())
                    .or_io(|| format!("Failed to write {:?}", path))?;
                self.runtime
                    .set_permissions(&path, 0o755)
                    .or_io(|| format!("Failed to set permissions on {:?}", path))?;
            }
        }
        self.registry.initialize()
    }

    /// Install a single item from its local payload. Returns the install path.
    #[tracing::instrument(skip(self, request), fields(kind = %request.item.kind, name = %request.item.name))]
    pub fn install(&mut self, request: InstallRequest, force: bool) -> Result<PathBuf> {
        let InstallRequest { item, local_name } = request;
        item.validate()?;
        payload::validate_source(self.runtime, item.kind, &local_name)?;
        self.check_conflict(&item, force)?;

        let dest = self.layout.install_path(item.kind, &item.name);
        if force {
            self.clear_payload(item.kind, &dest)?;
        }
        if let Err(e) = payload::copy_payload(self.runtime, item.kind, &local_name, &dest) {
            self.discard_payload(item.kind, &dest);
            return Err(e);
        }
        self.commit(item, &dest, force)?;
        Ok(dest)
    }

    /// Detect a module's metadata from the file itself, then install it.
    pub fn install_module_auto(&mut self, local_name: &Path, force: bool) -> Result<Item> {
        let item = detect_module(self.runtime, local_name)?;
        self.install(InstallRequest::new(item.clone(), local_name), force)?;
        Ok(item)
    }

    /// Remove an item's payload and its record.
    ///
    /// Both steps are attempted. A payload that is already gone only warns.
    #[tracing::instrument(skip(self))]
    pub fn delete(&mut self, kind: Kind, name: &str, force: bool) -> Result<Item> {
        let existing = self.registry.get(kind, name)?.clone();
        let path = self.layout.install_path(kind, name);

        let payload_result = match payload::remove_payload(self.runtime, kind, &path) {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!("Payload of {} '{}' was already missing at {:?}", kind, name, path);
                Ok(())
            }
            Err(e) => Err(e),
        };
        let record_result = self.registry.delete(kind, name, force);

        match (payload_result, record_result) {
            (Ok(()), Ok(_)) => {
                info!("Deleted {} '{}'", kind, name);
                Ok(existing)
            }
            (Err(e), Ok(_)) => {
                warn!("Record of {} '{}' removed but its payload was not", kind, name);
                Err(e)
            }
            (Ok(()), Err(e)) => {
                warn!("Payload of {} '{}' removed but its record was not", kind, name);
                Err(e)
            }
            (Err(payload_err), Err(record_err)) => {
                warn!("Failed to remove record of {} '{}': {}", kind, name, record_err);
                Err(payload_err)
            }
        }
    }

    /// Wipe every managed directory and record, then recreate the empty layout.
    #[tracing::instrument(skip(self))]
    pub fn purge(&mut self) -> Result<()> {
        for dir in self.layout.managed_dirs() {
            if self.runtime.exists(&dir) {
                self.runtime
                    .remove_dir_all(&dir)
                    .or_io(|| format!("Failed to remove {:?}", dir))?;
            }
        }
        self.registry.purge()?;
        self.ensure_layout()?;
        info!("Purged all installed content");
        Ok(())
    }

    pub(crate) fn check_conflict(&self, item: &Item, force: bool) -> Result<()> {
        if !force && self.registry.exists(item.kind, &item.name) {
            return Err(Error::AlreadyExists {
                kind: item.kind,
                name: item.name.clone(),
            });
        }
        Ok(())
    }

    /// Remove whatever currently occupies `dest` before a forced reinstall.
    pub(crate) fn clear_payload(&self, kind: Kind, dest: &Path) -> Result<()> {
        if payload::remove_payload(self.runtime, kind, dest)? {
            debug!("Removed previous payload at {:?}", dest);
        }
        Ok(())
    }

    /// Commit `item` whose payload already sits at `dest`. On failure the
    /// payload is removed again.
    pub(crate) fn commit(&mut self, item: Item, dest: &Path, force: bool) -> Result<()> {
        let kind = item.kind;
        let name = item.name.clone();
        if let Err(e) = self.registry.create(item, force) {
            self.discard_payload(kind, dest);
            return Err(e);
        }
        info!("Installed {} '{}' to {:?}", kind, name, dest);
        Ok(())
    }

    /// Best-effort removal of a payload whose install did not complete.
    fn discard_payload(&self, kind: Kind, dest: &Path) {
        if let Err(cleanup) = payload::remove_payload(self.runtime, kind, dest) {
            warn!("Failed to roll back payload at {:?}: {}", dest, cleanup);
        }
    }
}
