//! The XML manifest describing every item in a bundle.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <Items>
//!     <Item type="module" name="hello" majorVersion="1" minorVersion="0"
//!           health="stable" author="Jane" localName="modules/hello" about="Greets"/>
//! </Items>
//! ```

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::item::{Health, Item, Kind, Version};

const ROOT_TAG: &str = "Items";
const ITEM_TAG: &str = "Item";

/// One manifest element: the item and where its payload sits in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub item: Item,
    pub local_name: String,
}

impl ManifestEntry {
    pub fn new(item: Item) -> Self {
        let local_name = archive_root(item.kind, &item.name);
        Self { item, local_name }
    }
}

/// Archive-relative payload root of `(kind, name)`, e.g. `modules/foo`.
pub fn archive_root(kind: Kind, name: &str) -> String {
    format!("{}/{}", kind.plural(), name)
}

pub fn render_manifest(entries: &[ManifestEntry]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str(&format!("<{}>\n", ROOT_TAG));
    for entry in entries {
        let item = &entry.item;
        let mut attrs = vec![
            ("type", item.kind.as_str().to_string()),
            ("name", item.name.clone()),
        ];
        if let Some(version) = item.version {
            attrs.push(("majorVersion", version.major.to_string()));
            attrs.push(("minorVersion", version.minor.to_string()));
        }
        attrs.push(("health", item.health.as_str().to_string()));
        if let Some(author) = &item.author {
            attrs.push(("author", author.clone()));
        }
        attrs.push(("localName", entry.local_name.clone()));
        if item.kind == Kind::Module
            && let Some(about) = &item.about
        {
            attrs.push(("about", about.clone()));
        }

        xml.push_str("    <");
        xml.push_str(ITEM_TAG);
        for (key, value) in attrs {
            let _ = write!(xml, " {}=\"{}\"", key, escape_attr(&value));
        }
        xml.push_str("/>\n");
    }
    xml.push_str(&format!("</{}>\n", ROOT_TAG));
    xml
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn parse_manifest(xml: &str) -> Result<Vec<ManifestEntry>> {
    let document =
        roxmltree::Document::parse(xml).map_err(|e| Error::malformed(format!("manifest: {}", e)))?;
    let root = document.root_element();
    if root.tag_name().name() != ROOT_TAG {
        return Err(Error::malformed(format!(
            "manifest root is <{}>, expected <{}>",
            root.tag_name().name(),
            ROOT_TAG
        )));
    }

    let mut entries = Vec::new();
    for node in root.children().filter(|n| n.is_element()) {
        if node.tag_name().name() != ITEM_TAG {
            return Err(Error::malformed(format!(
                "unexpected element <{}>",
                node.tag_name().name()
            )));
        }
        entries.push(parse_item(&node)?);
    }
    Ok(entries)
}

fn parse_item(node: &roxmltree::Node) -> Result<ManifestEntry> {
    let required = |attr: &str| {
        node.attribute(attr)
            .ok_or_else(|| Error::malformed(format!("<{}> is missing '{}'", ITEM_TAG, attr)))
    };

    let kind: Kind = required("type")?
        .parse()
        .map_err(|e: Error| Error::malformed(e.to_string()))?;
    let name = required("name")?;
    let health: Health = required("health")?
        .parse()
        .map_err(|e: Error| Error::malformed(e.to_string()))?;
    let version = Version::from_parts(node.attribute("majorVersion"), node.attribute("minorVersion"))
        .map_err(|e| Error::malformed(format!("'{}': {}", name, e)))?;

    let mut item = Item::new(kind, name, health);
    item.version = version;
    item.author = node.attribute("author").map(str::to_string);
    if kind == Kind::Module {
        item.about = node.attribute("about").map(str::to_string);
    }
    item.validate()
        .map_err(|e| Error::malformed(e.to_string()))?;

    let local_name = node
        .attribute("localName")
        .map(str::to_string)
        .unwrap_or_else(|| archive_root(kind, name));
    Ok(ManifestEntry { item, local_name })
}
