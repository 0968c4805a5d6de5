pub mod bundle;
pub mod commands;
pub mod error;
pub mod install;
pub mod item;
pub mod layout;
pub mod module;
pub mod project;
pub mod registry;
pub mod runtime;

pub use error::{Error, Result};

/// Test utilities for cross-platform path handling.
#[cfg(test)]
pub mod test_utils {
    use std::path::{Path, PathBuf};

    /// Returns a test home directory path based on the platform.
    /// - Unix: `/home/user`
    /// - Windows: `C:\Users\user`
    pub fn test_home() -> PathBuf {
        #[cfg(not(windows))]
        {
            PathBuf::from("/home/user")
        }
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\Users\user")
        }
    }

    /// Write an executable script named `name` into `dir`.
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    /// Locate a shared library shipped with the system, e.g. `libm.so.6`.
    /// Logs the skip when the library is missing so callers can return early.
    pub fn system_library(name: &str) -> Option<PathBuf> {
        let found = [
            "/lib/x86_64-linux-gnu",
            "/lib/aarch64-linux-gnu",
            "/usr/lib/x86_64-linux-gnu",
            "/usr/lib/aarch64-linux-gnu",
            "/lib64",
            "/usr/lib64",
            "/usr/lib",
            "/lib",
        ]
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|path| path.is_file());
        if found.is_none() {
            eprintln!("skipping: system library {} not found", name);
        }
        found
    }
}
