use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::item::Item;

const SCHEMA_VERSION: u32 = 1;

/// On-disk shape of `registry.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(super) struct RegistryDocument {
    pub schema: u32,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl RegistryDocument {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            schema: SCHEMA_VERSION,
            items,
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let document: RegistryDocument = serde_json::from_str(content)
            .map_err(|e| Error::Parse(format!("Corrupt registry store: {}", e)))?;
        if document.schema != SCHEMA_VERSION {
            return Err(Error::InvalidArgument(format!(
                "Unsupported registry schema {} (expected {})",
                document.schema, SCHEMA_VERSION
            )));
        }
        Ok(document)
    }

    pub fn render(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Parse(format!("Unable to serialize registry: {}", e)))
    }
}
