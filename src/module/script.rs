use log::{debug, warn};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use crate::error::{Error, Result};

use super::LaunchContext;

/// Run a script-flavored module as a child process.
///
/// The child inherits the parent environment plus the context's overlay and
/// starts in the project root when one is known. Standard output is copied to
/// `out` one line at a time as it is produced.
#[tracing::instrument(skip(ctx, out))]
pub fn run_script(
    path: &Path,
    args: &[String],
    ctx: &LaunchContext,
    out: &mut dyn Write,
) -> Result<i32> {
    let mut command = Command::new(path);
    command
        .args(args)
        .envs(ctx.script_environment())
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    if let Some(root) = ctx.project_root() {
        command.current_dir(root);
    }

    let mut child = command.spawn().map_err(|source| Error::Spawn {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(stdout) = child.stdout.take()
        && let Err(e) = forward_lines(stdout, out)
    {
        if let Err(kill) = child.kill() {
            warn!("Failed to stop {:?}: {}", path, kill);
        }
        let _ = child.wait();
        return Err(e);
    }

    let status = child
        .wait()
        .map_err(|e| Error::io(format!("Failed to wait for {:?}", path), e))?;
    debug!("{:?} exited with {}", path, status);
    Ok(exit_code(status))
}

/// Copy `source` to `out` line by line, flushing after each line.
fn forward_lines(source: impl Read, out: &mut dyn Write) -> Result<()> {
    let mut reader = BufReader::new(source);
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|e| Error::io("Failed to read module output", e))?;
        if read == 0 {
            return Ok(());
        }
        out.write_all(&line)
            .and_then(|_| out.flush())
            .map_err(|e| Error::io("Failed to forward module output", e))?;
    }
}

#[cfg(unix)]
pub(super) fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
pub(super) fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
