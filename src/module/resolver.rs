//! Module resolution: built-in, then project-local, then globally installed.

use log::debug;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::item::{Kind, validate_name};
use crate::layout::DataLayout;
use crate::registry::ItemRegistry;
use crate::runtime::Runtime;

use super::HandlerRegistry;
use super::inspect::{self, Flavor};

/// Directory under a project root holding project-local modules.
pub const LOCAL_MODULES_DIR: &str = "local_modules";

/// Where a module was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Builtin,
    Local,
    Global,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Builtin => "built-in",
            Tier::Local => "local",
            Tier::Global => "global",
        };
        write!(f, "{}", s)
    }
}

/// How a resolved module is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleTarget {
    /// A handler compiled into the binary.
    Builtin,
    /// A script run as a child process.
    Script(PathBuf),
    /// A native shared object loaded in-process.
    Source(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub name: String,
    pub tier: Tier,
    pub target: ModuleTarget,
}

pub struct ModuleResolver<'a, R: Runtime> {
    runtime: &'a R,
    layout: &'a DataLayout,
    registry: &'a ItemRegistry<'a, R>,
    builtins: &'a HandlerRegistry,
    project_root: Option<&'a Path>,
}

impl<'a, R: Runtime> ModuleResolver<'a, R> {
    pub fn new(
        runtime: &'a R,
        layout: &'a DataLayout,
        registry: &'a ItemRegistry<'a, R>,
        builtins: &'a HandlerRegistry,
    ) -> Self {
        Self {
            runtime,
            layout,
            registry,
            builtins,
            project_root: None,
        }
    }

    pub fn with_project_root(mut self, root: Option<&'a Path>) -> Self {
        self.project_root = root;
        self
    }

    /// Path a project-local module named `name` would have.
    pub fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.project_root
            .map(|root| root.join(LOCAL_MODULES_DIR).join(name))
    }

    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, name: &str) -> Result<ResolvedModule> {
        validate_name(name)?;

        if self.builtins.contains(name) {
            debug!("'{}' is a built-in module", name);
            return Ok(ResolvedModule {
                name: name.to_string(),
                tier: Tier::Builtin,
                target: ModuleTarget::Builtin,
            });
        }

        if let Some(path) = self.local_path(name)
            && self.runtime.is_file(&path)
        {
            debug!("'{}' found in project at {:?}", name, path);
            return self.classified(name, Tier::Local, path);
        }

        if self.registry.exists(Kind::Module, name) {
            let path = self.layout.install_path(Kind::Module, name);
            if !self.runtime.is_file(&path) {
                return Err(Error::Resolution(format!(
                    "module '{}' is registered but {:?} is missing",
                    name, path
                )));
            }
            debug!("'{}' installed at {:?}", name, path);
            return self.classified(name, Tier::Global, path);
        }

        Err(Error::NotFound(format!("module '{}'", name)))
    }

    fn classified(&self, name: &str, tier: Tier, path: PathBuf) -> Result<ResolvedModule> {
        let target = match inspect::classify(self.runtime, &path)? {
            Flavor::Script => ModuleTarget::Script(path),
            Flavor::Source => ModuleTarget::Source(path),
        };
        Ok(ResolvedModule {
            name: name.to_string(),
            tier,
            target,
        })
    }
}
