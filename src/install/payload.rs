//! Physical payload operations: copy in, walk, and remove.

use log::debug;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};
use crate::item::Kind;
use crate::runtime::Runtime;

/// One entry of a payload tree, relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub relative: PathBuf,
    pub is_dir: bool,
}

/// Check that `source` exists and has the shape `kind` expects.
pub fn validate_source<R: Runtime>(runtime: &R, kind: Kind, source: &Path) -> Result<()> {
    if !runtime.exists(source) {
        return Err(Error::io(
            format!("Local payload {:?} does not exist", source),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }
    let shape_ok = if kind.is_directory() {
        runtime.is_dir(source)
    } else {
        runtime.is_file(source)
    };
    if !shape_ok {
        let expected = if kind.is_directory() { "a directory" } else { "a file" };
        return Err(Error::io(
            format!("Local payload {:?} for a {} must be {}", source, kind, expected),
            io::Error::from(io::ErrorKind::InvalidInput),
        ));
    }
    Ok(())
}

/// Copy `source` to `dest`: a single file for binaries and modules, a whole
/// tree (empty directories included) for libraries and packages.
#[tracing::instrument(skip(runtime))]
pub fn copy_payload<R: Runtime>(runtime: &R, kind: Kind, source: &Path, dest: &Path) -> Result<()> {
    if !kind.is_directory() {
        return copy_file(runtime, source, dest);
    }

    runtime
        .create_dir_all(dest)
        .or_io(|| format!("Failed to create {:?}", dest))?;
    for entry in walk_tree(runtime, source)? {
        let from = source.join(&entry.relative);
        let to = dest.join(&entry.relative);
        if entry.is_dir {
            runtime
                .create_dir_all(&to)
                .or_io(|| format!("Failed to create {:?}", to))?;
        } else {
            copy_file(runtime, &from, &to)?;
        }
    }
    Ok(())
}

fn copy_file<R: Runtime>(runtime: &R, from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent()
        && !runtime.exists(parent)
    {
        runtime
            .create_dir_all(parent)
            .or_io(|| format!("Failed to create {:?}", parent))?;
    }
    debug!("Copying {:?} -> {:?}", from, to);
    runtime
        .copy(from, to)
        .or_io(|| format!("Failed to copy {:?} to {:?}", from, to))?;
    Ok(())
}

/// Every directory and file below `root`, parents before children, sorted.
pub fn walk_tree<R: Runtime>(runtime: &R, root: &Path) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let children = runtime
            .read_dir(&dir)
            .or_io(|| format!("Failed to list {:?}", dir))?;
        let mut subdirs = Vec::new();
        for child in children {
            let Ok(relative) = child.strip_prefix(root) else {
                continue;
            };
            let is_dir = runtime.is_dir(&child);
            entries.push(TreeEntry {
                relative: relative.to_path_buf(),
                is_dir,
            });
            if is_dir {
                subdirs.push(child);
            }
        }
        pending.extend(subdirs.into_iter().rev());
    }
    entries.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(entries)
}

/// Remove an installed payload. Returns `false` when there was nothing to remove.
#[tracing::instrument(skip(runtime))]
pub fn remove_payload<R: Runtime>(runtime: &R, kind: Kind, path: &Path) -> Result<bool> {
    if !runtime.exists(path) {
        return Ok(false);
    }
    if runtime.is_dir(path) {
        runtime
            .remove_dir_all(path)
            .or_io(|| format!("Failed to remove {:?}", path))?;
    } else {
        runtime
            .remove_file(path)
            .or_io(|| format!("Failed to remove {:?}", path))?;
    }
    debug!("Removed {} payload {:?}", kind, path);
    Ok(true)
}
