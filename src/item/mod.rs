//! Item model
//!
//! An item is the unit the registry tracks: a binary, library, module or
//! package, keyed by `(kind, name)`.

mod version;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub use version::{Version, format_version};

/// The category of an item. Determines payload shape and install location.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Binary,
    Library,
    Module,
    Package,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Binary, Kind::Library, Kind::Module, Kind::Package];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Binary => "binary",
            Kind::Library => "library",
            Kind::Module => "module",
            Kind::Package => "package",
        }
    }

    /// Directory name used both under the data root and inside bundles.
    pub fn plural(&self) -> &'static str {
        match self {
            Kind::Binary => "binaries",
            Kind::Library => "libraries",
            Kind::Module => "modules",
            Kind::Package => "packages",
        }
    }

    /// Libraries and packages are directory trees; binaries and modules are single files.
    pub fn is_directory(&self) -> bool {
        matches!(self, Kind::Library | Kind::Package)
    }

    pub fn from_plural(s: &str) -> Option<Kind> {
        Kind::ALL.into_iter().find(|k| k.plural() == s)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidArgument(format!("Unknown item type '{}'", s)))
    }
}

/// Stability marker attached to every item.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Stable,
    Working,
    Beta,
    Broken,
    Deprecated,
}

impl Health {
    pub const ALL: [Health; 5] = [
        Health::Stable,
        Health::Working,
        Health::Beta,
        Health::Broken,
        Health::Deprecated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Stable => "stable",
            Health::Working => "working",
            Health::Beta => "beta",
            Health::Broken => "broken",
            Health::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Health {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Health::ALL
            .into_iter()
            .find(|h| h.as_str() == wanted)
            .ok_or_else(|| Error::InvalidArgument(format!("Invalid health value '{}'", s)))
    }
}

/// A registry record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub kind: Kind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    pub health: Health,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
}

impl Item {
    pub fn new(kind: Kind, name: impl Into<String>, health: Health) -> Self {
        Self {
            kind,
            name: name.into(),
            version: None,
            health,
            author: None,
            about: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Reject names that cannot safely become a file name under the data root.
    pub fn validate(&self) -> Result<(), Error> {
        validate_name(&self.name)
    }
}

pub fn validate_name(name: &str) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument("Item name must not be empty".into()));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') || name.contains('\0')
    {
        return Err(Error::InvalidArgument(format!(
            "Item name '{}' is not a valid file name",
            name
        )));
    }
    Ok(())
}
