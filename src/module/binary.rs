use log::debug;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::item::{Kind, validate_name};
use crate::layout::DataLayout;
use crate::runtime::Runtime;

use super::script::exit_code;

/// Collected result of running an installed binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub status: i32,
}

/// Run the installed binary `name` with `args` and collect its output.
///
/// With a `launcher` (an interpreter or wrapper such as `java -jar` split into
/// program and leading arguments) the binary path is passed to it as the first
/// argument after the launcher's own.
#[tracing::instrument(skip(runtime, layout))]
pub fn launch_binary<R: Runtime>(
    runtime: &R,
    layout: &DataLayout,
    name: &str,
    args: &[String],
    launcher: Option<&[String]>,
) -> Result<BinaryOutput> {
    validate_name(name)?;
    let path = layout.install_path(Kind::Binary, name);
    if !runtime.is_file(&path) {
        return Err(Error::not_found(Kind::Binary, name));
    }

    let mut command = match launcher {
        Some([program, leading @ ..]) => {
            let mut command = Command::new(program);
            command.args(leading).arg(&path);
            command
        }
        Some([]) => {
            return Err(Error::InvalidArgument("launcher must name a program".into()));
        }
        None => Command::new(&path),
    };
    command.args(args).stdin(Stdio::null());

    let spawned = launcher
        .and_then(|l| l.first())
        .map(Path::new)
        .unwrap_or(&path)
        .to_path_buf();
    let output = command.output().map_err(|source| Error::Spawn {
        path: spawned,
        source,
    })?;

    let status = exit_code(output.status);
    debug!("Binary '{}' exited with {}", name, status);
    Ok(BinaryOutput {
        stdout: lines(&output.stdout),
        stderr: lines(&output.stderr),
        status,
    })
}

fn lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::to_string)
        .collect()
}
