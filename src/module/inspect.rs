//! Module file inspection: flavor classification and embedded metadata.

use goblin::Object;
use std::path::Path;

use crate::error::{Error, IoResultExt, Result};
use crate::runtime::Runtime;

/// ELF section holding `Key: value` metadata lines of a native module.
pub const ELF_META_SECTION: &str = ".plugkit_meta";
/// Mach-O section (any segment) holding the same metadata.
pub const MACH_META_SECTION: &str = "__plugkit_meta";

/// How a module file is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Run as a child process through its interpreter directive.
    Script,
    /// Loaded in-process as a native shared object.
    Source,
}

/// Classify raw file contents. `None` means neither flavor was recognized.
pub fn classify_bytes(bytes: &[u8]) -> Option<Flavor> {
    if bytes.starts_with(b"#!") {
        return Some(Flavor::Script);
    }
    if is_shared_object(bytes) {
        return Some(Flavor::Source);
    }
    None
}

#[tracing::instrument(skip(runtime))]
pub fn classify<R: Runtime>(runtime: &R, path: &Path) -> Result<Flavor> {
    let bytes = runtime
        .read(path)
        .or_io(|| format!("Failed to read module {:?}", path))?;
    classify_bytes(&bytes).ok_or_else(|| {
        Error::Resolution(format!(
            "{:?} is neither a script nor a native module",
            path
        ))
    })
}

/// True for loadable shared objects. PIE executables are excluded.
pub fn is_shared_object(bytes: &[u8]) -> bool {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => {
            if elf.header.e_type != goblin::elf::header::ET_DYN {
                return false;
            }
            let pie = elf
                .dynamic
                .as_ref()
                .is_some_and(|d| d.info.flags_1 & goblin::elf::dynamic::DF_1_PIE != 0);
            // Some libraries (glibc) carry an interpreter too, but also a soname
            !pie && (elf.interpreter.is_none() || elf.soname.is_some())
        }
        Ok(Object::Mach(goblin::mach::Mach::Binary(macho))) => matches!(
            macho.header.filetype,
            goblin::mach::header::MH_DYLIB | goblin::mach::header::MH_BUNDLE
        ),
        Ok(Object::PE(pe)) => pe.is_lib,
        _ => false,
    }
}

/// Shared libraries a native module names as direct dependencies.
pub fn needed_libraries(bytes: &[u8]) -> Vec<String> {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => elf.libraries.iter().map(|s| s.to_string()).collect(),
        Ok(Object::Mach(goblin::mach::Mach::Binary(macho))) => macho
            .libs
            .iter()
            .filter(|lib| **lib != "self")
            .map(|s| s.to_string())
            .collect(),
        Ok(Object::PE(pe)) => pe.libraries.iter().map(|s| s.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// True when the object itself defines and exports `symbol`.
///
/// Symbols the object only imports from its dependencies do not count.
pub fn exports_symbol(bytes: &[u8], symbol: &str) -> bool {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => elf.dynsyms.iter().any(|sym| {
            sym.st_shndx != goblin::elf::section_header::SHN_UNDEF as usize
                && elf.dynstrtab.get_at(sym.st_name) == Some(symbol)
        }),
        Ok(Object::Mach(goblin::mach::Mach::Binary(macho))) => {
            let mangled = format!("_{}", symbol);
            macho
                .exports()
                .map(|exports| exports.iter().any(|e| e.name == mangled || e.name == symbol))
                .unwrap_or(false)
        }
        Ok(Object::PE(pe)) => pe.exports.iter().any(|e| e.name == Some(symbol)),
        _ => false,
    }
}

/// Text of the embedded metadata section, if the module carries one.
pub fn metadata_section(bytes: &[u8]) -> Option<String> {
    let raw: &[u8] = match Object::parse(bytes).ok()? {
        Object::Elf(elf) => elf.section_headers.iter().find_map(|sh| {
            if elf.shdr_strtab.get_at(sh.sh_name) != Some(ELF_META_SECTION) {
                return None;
            }
            bytes.get(sh.file_range()?)
        })?,
        Object::Mach(goblin::mach::Mach::Binary(macho)) => {
            macho.segments.iter().find_map(|segment| {
                segment.sections().ok()?.into_iter().find_map(|(section, data)| {
                    (section.name().ok()? == MACH_META_SECTION).then_some(data)
                })
            })?
        }
        _ => return None,
    };

    let text = String::from_utf8_lossy(raw);
    Some(text.trim_matches(char::from(0)).to_string())
}
