//! Bundles: portable ZIP archives holding a manifest plus item payloads.
//!
//! ```text
//! manifest.xml
//! binaries/<name>
//! libraries/<name>/...
//! modules/<name>
//! packages/<name>/...
//! ```

mod export;
mod import;
pub mod manifest;

pub use export::export_bundle;
pub use import::import_bundle;
pub use manifest::{ManifestEntry, archive_root};

/// Reserved archive entry holding the manifest.
pub const MANIFEST_NAME: &str = "manifest.xml";
