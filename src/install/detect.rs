//! Module auto-detection: build an [`Item`] from markers inside the module file.
//!
//! Script modules declare themselves in header comments:
//!
//! ```text
//! #!/bin/sh
//! #@Name: hello
//! #@Version: 1.0
//! #@Health: stable
//! #@Author: Jane Doe
//! #@About: Prints a greeting
//! ```
//!
//! Native modules carry the same `Key: value` lines in a dedicated section
//! (see [`crate::module::inspect`]).

use log::debug;
use std::path::Path;

use crate::error::{Error, IoResultExt, Result};
use crate::item::{Health, Item, Kind, Version};
use crate::module::inspect::{self, Flavor};
use crate::runtime::Runtime;

const SCRIPT_MARKER: &str = "#@";

#[derive(Debug, Default)]
struct Markers {
    name: Option<String>,
    version: Option<String>,
    health: Option<String>,
    author: Option<String>,
    about: Option<String>,
}

impl Markers {
    fn set(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match key.trim().to_ascii_lowercase().as_str() {
            "name" => &mut self.name,
            "version" => &mut self.version,
            "health" => &mut self.health,
            "author" => &mut self.author,
            "about" => &mut self.about,
            _ => return,
        };
        // First declaration wins
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    fn into_item(self, path: &Path) -> Result<Item> {
        let name = self
            .name
            .ok_or_else(|| Error::Parse(format!("{:?} does not declare a Name", path)))?;
        let health = self
            .health
            .ok_or_else(|| Error::Parse(format!("{:?} does not declare a Health", path)))?;
        let health: Health = health
            .parse()
            .map_err(|e| Error::Parse(format!("{:?}: {}", path, e)))?;

        let mut item = Item::new(Kind::Module, name, health);
        if let Some(version) = self.version {
            let version: Version = version
                .parse()
                .map_err(|e| Error::Parse(format!("{:?}: {}", path, e)))?;
            item = item.with_version(version);
        }
        item.author = self.author;
        item.about = self.about;
        item.validate()
            .map_err(|e| Error::Parse(format!("{:?}: {}", path, e)))?;
        Ok(item)
    }
}

fn script_markers(text: &str) -> Markers {
    let mut markers = Markers::default();
    for line in text.lines() {
        if let Some((key, value)) = line
            .trim_start()
            .strip_prefix(SCRIPT_MARKER)
            .and_then(|rest| rest.split_once(':'))
        {
            markers.set(key, value);
        }
    }
    markers
}

fn section_markers(text: &str) -> Markers {
    let mut markers = Markers::default();
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            markers.set(key, value);
        }
    }
    markers
}

/// Synthesize a module item from the file at `path`.
#[tracing::instrument(skip(runtime))]
pub fn detect_module<R: Runtime>(runtime: &R, path: &Path) -> Result<Item> {
    let bytes = runtime
        .read(path)
        .or_io(|| format!("Failed to read module {:?}", path))?;

    let markers = match inspect::classify_bytes(&bytes) {
        Some(Flavor::Script) => script_markers(&String::from_utf8_lossy(&bytes)),
        Some(Flavor::Source) => {
            let section = inspect::metadata_section(&bytes).ok_or_else(|| {
                Error::Parse(format!("{:?} has no embedded module metadata", path))
            })?;
            section_markers(&section)
        }
        None => {
            return Err(Error::Parse(format!(
                "{:?} is neither a script nor a native module",
                path
            )));
        }
    };

    let item = markers.into_item(path)?;
    debug!("Detected module '{}' in {:?}", item.name, path);
    Ok(item)
}
