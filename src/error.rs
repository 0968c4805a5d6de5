//! Error taxonomy shared by the registry, installer, bundle and launch layers.
//!
//! Every variant maps to a distinct exit code so a failed operation can never
//! be mistaken for a module's own successful return.

use std::path::PathBuf;

use thiserror::Error;

use crate::item::Kind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while building or reading bundle archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Output file {0:?} already exists")]
    OutputExists(PathBuf),

    #[error("Nothing to export: the registry is empty")]
    NothingToExport,

    #[error("Malformed bundle: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} '{name}' is already installed")]
    AlreadyExists { kind: Kind, name: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unable to resolve module: {0}")]
    Resolution(String),

    #[error("Failed to load module {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Entry point '{symbol}' not found in {path:?}")]
    EntryPointMissing { symbol: String, path: PathBuf },

    #[error("Unable to instantiate module '{0}'")]
    Instantiation(String),

    #[error("Unable to execute {path:?}. Are the permission flags correct?")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl Error {
    pub fn not_found(kind: Kind, name: &str) -> Self {
        Error::NotFound(format!("{} '{}'", kind, name))
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Error::Archive(ArchiveError::Malformed(message.into()))
    }

    /// Exit status reported to the caller when this error ends an invocation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => -2,
            Error::AlreadyExists { .. } => -3,
            Error::NotFound(_) => -4,
            Error::Io { .. } => -5,
            Error::Parse(_) => -6,
            Error::Resolution(_) => -7,
            Error::Load { .. } => -8,
            Error::EntryPointMissing { .. } => -9,
            Error::Instantiation(_) => -10,
            Error::Spawn { .. } => -11,
            Error::Archive(ArchiveError::OutputExists(_)) => -12,
            Error::Archive(ArchiveError::NothingToExport) => -13,
            Error::Archive(ArchiveError::Malformed(_)) => -14,
        }
    }
}

/// Lifts the `anyhow` results returned by [`crate::runtime::Runtime`] into [`Error::Io`].
pub trait IoResultExt<T> {
    fn or_io<F: FnOnce() -> String>(self, context: F) -> Result<T>;
}

impl<T> IoResultExt<T> for anyhow::Result<T> {
    fn or_io<F: FnOnce() -> String>(self, context: F) -> Result<T> {
        self.map_err(|e| Error::Io {
            context: format!("{}: {:#}", context(), e),
            source: e.into(),
        })
    }
}
