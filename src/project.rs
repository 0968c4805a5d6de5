//! Project properties: the working project root and its device identifier.

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::runtime::Runtime;

/// Marker directory identifying a project root.
pub const PROJECT_DIR: &str = ".plugkit";
const PROPERTIES_FILE: &str = "properties.json";

/// Environment variable naming the project root explicitly.
pub const PROJECT_ENV: &str = "PLUGKIT_PROJECT";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
struct PropertiesFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectProperties {
    root: PathBuf,
    device_id: Option<String>,
}

impl ProjectProperties {
    pub fn new(root: impl Into<PathBuf>, device_id: Option<String>) -> Self {
        Self {
            root: root.into(),
            device_id,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn properties_path(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR).join(PROPERTIES_FILE)
    }

    /// Read the properties of the project at `root`. A project without a
    /// properties file simply has no device id.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, root: &Path) -> Result<Self> {
        let path = Self::properties_path(root);
        if !runtime.exists(&path) {
            debug!("No project properties at {:?}", path);
            return Ok(Self::new(root, None));
        }
        let content = runtime
            .read_to_string(&path)
            .or_io(|| format!("Failed to read {:?}", path))?;
        let file: PropertiesFile = serde_json::from_str(&content)
            .map_err(|e| Error::Parse(format!("{:?}: {}", path, e)))?;
        Ok(Self::new(root, file.device_id))
    }

    /// Find the enclosing project of `start` and load it.
    pub fn discover<R: Runtime>(runtime: &R, start: &Path) -> Result<Option<Self>> {
        match find_project_root(runtime, start) {
            Some(root) => Self::load(runtime, &root).map(Some),
            None => Ok(None),
        }
    }

    /// Persist the device id of this project.
    #[cfg(test)]
    pub(crate) fn save<R: Runtime>(&self, runtime: &R) -> Result<()> {
        let path = Self::properties_path(&self.root);
        if let Some(parent) = path.parent() {
            runtime
                .create_dir_all(parent)
                .or_io(|| format!("Failed to create {:?}", parent))?;
        }
        let file = PropertiesFile {
            device_id: self.device_id.clone(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::Parse(format!("Unable to serialize properties: {}", e)))?;
        runtime
            .write(&path, content.as_bytes())
            .or_io(|| format!("Failed to write {:?}", path))
    }
}

/// Walk up from `start` to the first directory containing `.plugkit/`.
pub fn find_project_root<R: Runtime>(runtime: &R, start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| runtime.is_dir(&dir.join(PROJECT_DIR)))
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use mockall::predicate::eq;
    use tempfile::tempdir;

    #[test]
    fn test_find_project_root_walks_up() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_is_dir()
            .with(eq(PathBuf::from("/work/app/.plugkit")))
            .returning(|_| true);
        runtime.expect_is_dir().returning(|_| false);

        assert_eq!(
            find_project_root(&runtime, Path::new("/work/app/src/deep")),
            Some(PathBuf::from("/work/app"))
        );
    }

    #[test]
    fn test_find_project_root_none() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_dir().returning(|_| false);

        assert_eq!(find_project_root(&runtime, Path::new("/tmp/x")), None);
    }

    #[test]
    fn test_save_then_discover() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        ProjectProperties::new(dir.path(), Some("usb:1-2".into()))
            .save(&RealRuntime)
            .unwrap();

        let found = ProjectProperties::discover(&RealRuntime, &nested)
            .unwrap()
            .unwrap();
        assert_eq!(found.root(), dir.path());
        assert_eq!(found.device_id(), Some("usb:1-2"));
    }

    #[test]
    fn test_project_without_properties_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(PROJECT_DIR)).unwrap();

        let found = ProjectProperties::discover(&RealRuntime, dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(found.device_id(), None);
    }

    #[test]
    fn test_corrupt_properties() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(PROJECT_DIR)).unwrap();
        std::fs::write(ProjectProperties::properties_path(dir.path()), "{nope").unwrap();

        let err = ProjectProperties::load(&RealRuntime, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
