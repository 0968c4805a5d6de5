use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

use crate::{
    layout::{DataLayout, resolve_data_root},
    project::ProjectProperties,
    runtime::Runtime,
};

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub layout: DataLayout,
    pub project: Option<ProjectProperties>,
}

impl<R: Runtime> Config<R> {
    /// Resolve the data root and the enclosing project, if any.
    ///
    /// An explicit `project_root` is loaded as is; otherwise the project is
    /// discovered by walking up from the current directory.
    pub fn new(
        runtime: R,
        data_root: Option<PathBuf>,
        project_root: Option<PathBuf>,
    ) -> Result<Self> {
        let root = resolve_data_root(&runtime, data_root)?;
        debug!("Data root: {}", root.display());

        let project = match project_root {
            Some(root) => Some(
                ProjectProperties::load(&runtime, &root)
                    .with_context(|| format!("Failed to load project at {}", root.display()))?,
            ),
            None => {
                let cwd = runtime.current_dir()?;
                ProjectProperties::discover(&runtime, &cwd)?
            }
        };
        if let Some(project) = &project {
            debug!("Project root: {}", project.root().display());
        }

        Ok(Self {
            runtime,
            layout: DataLayout::new(root),
            project,
        })
    }
}
