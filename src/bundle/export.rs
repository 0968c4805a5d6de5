use log::{debug, info};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ArchiveError, Error, IoResultExt, Result};
use crate::install::walk_tree;
use crate::layout::DataLayout;
use crate::registry::ItemRegistry;
use crate::runtime::Runtime;

use super::MANIFEST_NAME;
use super::manifest::{ManifestEntry, render_manifest};

type Zip = ZipWriter<Cursor<Vec<u8>>>;

fn zip_error(context: &str, e: zip::result::ZipError) -> Error {
    Error::Io {
        context: format!("{}: {}", context, e),
        source: Box::new(e),
    }
}

fn options(mode: Option<u32>) -> SimpleFileOptions {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    match mode {
        Some(mode) => options.unix_permissions(mode),
        None => options,
    }
}

/// Write every registered item and its payload into a new bundle at `output`.
///
/// Never overwrites: an existing `output` fails with `OutputExists`. The
/// archive is assembled in memory and written in one go. Returns the number
/// of exported items.
#[tracing::instrument(skip(runtime, layout, registry))]
pub fn export_bundle<R: Runtime>(
    runtime: &R,
    layout: &DataLayout,
    registry: &ItemRegistry<'_, R>,
    output: &Path,
) -> Result<usize> {
    if runtime.exists(output) {
        return Err(ArchiveError::OutputExists(output.to_path_buf()).into());
    }
    let items = registry.list_all();
    if items.is_empty() {
        return Err(ArchiveError::NothingToExport.into());
    }

    let entries: Vec<ManifestEntry> = items.into_iter().cloned().map(ManifestEntry::new).collect();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file(MANIFEST_NAME, options(None))
        .map_err(|e| zip_error("Failed to add manifest", e))?;
    zip.write_all(render_manifest(&entries).as_bytes())
        .map_err(|e| Error::io("Failed to write manifest", e))?;

    for entry in &entries {
        let payload = layout.install_path(entry.item.kind, &entry.item.name);
        add_payload(runtime, &mut zip, &payload, &entry.local_name, entry.item.kind.is_directory())?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| zip_error("Failed to finish bundle", e))?;
    runtime
        .write(output, &cursor.into_inner())
        .or_io(|| format!("Failed to write bundle {:?}", output))?;

    info!("Exported {} item(s) to {:?}", entries.len(), output);
    Ok(entries.len())
}

fn add_payload<R: Runtime>(
    runtime: &R,
    zip: &mut Zip,
    payload: &Path,
    root: &str,
    is_directory: bool,
) -> Result<()> {
    if !runtime.exists(payload) {
        return Err(Error::io(
            format!("Payload {:?} is missing", payload),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    if !is_directory {
        return add_file(runtime, zip, payload, root);
    }

    zip.add_directory(format!("{}/", root), options(None))
        .map_err(|e| zip_error("Failed to add directory", e))?;
    for entry in walk_tree(runtime, payload)? {
        let name = format!(
            "{}/{}",
            root,
            entry.relative.to_string_lossy().replace('\\', "/")
        );
        if entry.is_dir {
            zip.add_directory(format!("{}/", name), options(None))
                .map_err(|e| zip_error("Failed to add directory", e))?;
        } else {
            add_file(runtime, zip, &payload.join(&entry.relative), &name)?;
        }
    }
    Ok(())
}

fn add_file<R: Runtime>(runtime: &R, zip: &mut Zip, path: &Path, name: &str) -> Result<()> {
    let content = runtime
        .read(path)
        .or_io(|| format!("Failed to read {:?}", path))?;
    let mode = runtime
        .permissions(path)
        .or_io(|| format!("Failed to read permissions of {:?}", path))?;

    debug!("Adding {:?} as {}", path, name);
    zip.start_file(name, options(mode))
        .map_err(|e| zip_error("Failed to add file", e))?;
    zip.write_all(&content)
        .map_err(|e| Error::io(format!("Failed to write {} into bundle", name), e))?;
    Ok(())
}
