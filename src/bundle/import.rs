use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

use crate::error::{Error, IoResultExt, Result};
use crate::install::Installer;
use crate::install::payload::remove_payload;
use crate::item::Item;
use crate::runtime::Runtime;

use super::MANIFEST_NAME;
use super::manifest::{ManifestEntry, parse_manifest};

type Archive = ZipArchive<Cursor<Vec<u8>>>;

struct ArchiveEntry {
    index: usize,
    path: PathBuf,
    is_dir: bool,
    mode: Option<u32>,
}

/// Install every item of the bundle at `archive`.
///
/// The manifest and every `(kind, name)` conflict are checked before anything
/// is written. Items are then materialized and committed one by one; an item
/// that fails to install removes its own partial payload.
#[tracing::instrument(skip(installer))]
pub fn import_bundle<R: Runtime>(
    installer: &mut Installer<'_, R>,
    archive: &Path,
    force: bool,
) -> Result<Vec<Item>> {
    let runtime = installer.runtime();
    let bytes = runtime
        .read(archive)
        .or_io(|| format!("Failed to read bundle {:?}", archive))?;
    let mut zip = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::malformed(format!("{:?} is not a valid ZIP file: {}", archive, e)))?;

    let manifest = read_manifest(&mut zip)?;
    let entries = list_entries(&mut zip)?;

    let mut seen = BTreeSet::new();
    for entry in &manifest {
        if !is_safe_relative(&entry.local_name) {
            return Err(Error::malformed(format!(
                "localName '{}' escapes the archive root",
                entry.local_name
            )));
        }
        if !seen.insert((entry.item.kind, entry.item.name.clone())) {
            return Err(Error::malformed(format!(
                "{} '{}' is listed twice",
                entry.item.kind, entry.item.name
            )));
        }
        installer.check_conflict(&entry.item, force)?;
    }

    let mut imported = Vec::with_capacity(manifest.len());
    for entry in manifest {
        let kind = entry.item.kind;
        let dest = installer.layout().install_path(kind, &entry.item.name);
        if force {
            installer.clear_payload(kind, &dest)?;
        }
        if let Err(e) = materialize(runtime, &mut zip, &entries, &entry, &dest) {
            if let Err(cleanup) = remove_payload(runtime, kind, &dest) {
                warn!("Failed to clean up {:?}: {}", dest, cleanup);
            }
            return Err(e);
        }
        installer.commit(entry.item.clone(), &dest, force)?;
        imported.push(entry.item);
    }

    info!("Imported {} item(s) from {:?}", imported.len(), archive);
    Ok(imported)
}

fn read_manifest(zip: &mut Archive) -> Result<Vec<ManifestEntry>> {
    let mut file = zip
        .by_name(MANIFEST_NAME)
        .map_err(|_| Error::malformed(format!("bundle has no {}", MANIFEST_NAME)))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| Error::malformed(format!("unreadable {}: {}", MANIFEST_NAME, e)))?;
    parse_manifest(&xml)
}

fn list_entries(zip: &mut Archive) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let file = zip
            .by_index(index)
            .map_err(|e| Error::malformed(format!("entry {}: {}", index, e)))?;
        let path = match file.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(Error::malformed(format!(
                    "entry '{}' escapes the archive root",
                    file.name()
                )));
            }
        };
        if path == Path::new(MANIFEST_NAME) {
            continue;
        }
        entries.push(ArchiveEntry {
            index,
            path,
            is_dir: file.is_dir(),
            mode: file.unix_mode(),
        });
    }
    Ok(entries)
}

fn is_safe_relative(path: &str) -> bool {
    let path = Path::new(path);
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn materialize<R: Runtime>(
    runtime: &R,
    zip: &mut Archive,
    entries: &[ArchiveEntry],
    manifest_entry: &ManifestEntry,
    dest: &Path,
) -> Result<()> {
    let root = Path::new(&manifest_entry.local_name);

    if !manifest_entry.item.kind.is_directory() {
        let entry = entries
            .iter()
            .find(|e| !e.is_dir && e.path == root)
            .ok_or_else(|| {
                Error::malformed(format!("payload '{}' is missing", manifest_entry.local_name))
            })?;
        return extract_file(runtime, zip, entry, dest);
    }

    runtime
        .create_dir_all(dest)
        .or_io(|| format!("Failed to create {:?}", dest))?;
    for entry in entries {
        let Ok(relative) = entry.path.strip_prefix(root) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);
        if entry.is_dir {
            runtime
                .create_dir_all(&target)
                .or_io(|| format!("Failed to create {:?}", target))?;
        } else {
            extract_file(runtime, zip, entry, &target)?;
        }
    }
    Ok(())
}

fn extract_file<R: Runtime>(
    runtime: &R,
    zip: &mut Archive,
    entry: &ArchiveEntry,
    target: &Path,
) -> Result<()> {
    let mut file = zip
        .by_index(entry.index)
        .map_err(|e| Error::malformed(format!("{:?}: {}", entry.path, e)))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)
        .map_err(|e| Error::malformed(format!("{:?}: {}", entry.path, e)))?;

    if let Some(parent) = target.parent() {
        runtime
            .create_dir_all(parent)
            .or_io(|| format!("Failed to create {:?}", parent))?;
    }
    runtime
        .write(target, &content)
        .or_io(|| format!("Failed to write {:?}", target))?;

    #[cfg(unix)]
    if let Some(mode) = entry.mode
        && let Err(e) = runtime.set_permissions(target, mode & 0o7777)
    {
        debug!("Failed to set permissions on {:?}: {}", target, e);
    }
    #[cfg(not(unix))]
    let _ = entry.mode;

    Ok(())
}
