//! The built-in `pm` (package manager) command.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;

use crate::bundle::{export_bundle, import_bundle};
use crate::error::Error;
use crate::install::{InstallRequest, Installer};
use crate::item::{Health, Item, Kind, Version, format_version};
use crate::module::{CommandHandler, LaunchContext};
use crate::runtime::Runtime;

use super::exit_code;

/// plugkit package manager
#[derive(Parser, Debug)]
#[command(name = "pm", disable_version_flag = true)]
pub(crate) struct PmCli {
    #[command(subcommand)]
    command: PmCommands,
}

#[derive(Subcommand, Debug)]
enum PmCommands {
    /// Install a bundle or a single item
    Install(InstallArgs),

    /// Delete an item from disk and the registry
    Delete(DeleteArgs),

    /// Export every installed item to a bundle
    Export(ExportArgs),

    /// List installed items
    List(ListArgs),

    /// Remove all installed items and reset the registry
    Purge(PurgeArgs),
}

#[derive(Args, Debug)]
struct InstallArgs {
    /// Install every item of a bundle
    #[arg(long, value_name = "FILE", conflicts_with = "single")]
    zip: Option<PathBuf>,

    /// Install a single item of this type
    #[arg(long, value_name = "TYPE", required_unless_present = "zip")]
    single: Option<Kind>,

    /// Item name
    #[arg(long, value_name = "NAME")]
    name: Option<String>,

    /// Path of the item to install (defaults to the name)
    #[arg(long = "local-name", alias = "local_name", value_name = "PATH")]
    local_name: Option<PathBuf>,

    /// Item version, in #.# format
    #[arg(long, value_name = "VERSION")]
    version: Option<Version>,

    /// Item author
    #[arg(long, num_args = 1.., value_name = "TEXT")]
    author: Vec<String>,

    /// Description of a module
    #[arg(long, num_args = 1.., value_name = "TEXT")]
    about: Vec<String>,

    /// Item health
    #[arg(long, value_name = "HEALTH")]
    health: Option<Health>,

    /// Read module metadata from the module file itself
    #[arg(long)]
    auto: bool,

    /// Replace items that are already installed
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    /// Type of the item
    #[arg(long = "type", value_name = "TYPE")]
    kind: Kind,

    /// Name of the item
    #[arg(long, value_name = "NAME")]
    name: String,

    /// Do not ask for confirmation
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Bundle to create
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Show author, about and health
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Only list one of: binaries, libraries, modules, packages
    #[arg(value_name = "FILTER")]
    filter: Option<String>,
}

#[derive(Args, Debug)]
struct PurgeArgs {
    /// Do not ask for confirmation
    #[arg(long, short = 'y')]
    yes: bool,
}

/// Handler behind `plugkit pm ...`.
pub struct PmCommand<R: Runtime> {
    runtime: R,
}

impl<R: Runtime> PmCommand<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    fn run(&self, ctx: &LaunchContext, args: &[String], out: &mut dyn Write) -> Result<i32> {
        let cli = match PmCli::try_parse_from(std::iter::once("pm".to_string()).chain(args.iter().cloned())) {
            Ok(cli) => cli,
            Err(e) if !e.use_stderr() => {
                write!(out, "{}", e.render()).context("Failed to write usage")?;
                return Ok(0);
            }
            Err(e) => return Err(Error::InvalidArgument(e.render().to_string()).into()),
        };

        let mut installer = Installer::new(&self.runtime, ctx.data.clone())?;
        installer
            .ensure_layout()
            .context("Unable to set up the data directories")?;

        match cli.command {
            PmCommands::Install(args) => install(&mut installer, args, out),
            PmCommands::Delete(args) => delete(&self.runtime, &mut installer, args, out),
            PmCommands::Export(args) => {
                let count = export_bundle(
                    &self.runtime,
                    installer.layout(),
                    installer.registry(),
                    &args.output,
                )?;
                writeln!(out, "Exported {} item(s) to {}", count, args.output.display())?;
                Ok(0)
            }
            PmCommands::List(args) => list(&installer, args, out),
            PmCommands::Purge(args) => purge(&self.runtime, &mut installer, args, out),
        }
    }
}

impl<R: Runtime> CommandHandler for PmCommand<R> {
    fn execute(
        &mut self,
        ctx: &LaunchContext,
        args: &[String],
        out: &mut dyn Write,
    ) -> crate::Result<i32> {
        match self.run(ctx, args, out) {
            Ok(status) => Ok(status),
            Err(e) => {
                error!("{:#}", e);
                Ok(exit_code(&e))
            }
        }
    }
}

fn install<R: Runtime>(
    installer: &mut Installer<'_, R>,
    args: InstallArgs,
    out: &mut dyn Write,
) -> Result<i32> {
    if let Some(bundle) = args.zip {
        let items = import_bundle(installer, &bundle, args.force)
            .with_context(|| format!("Failed to install bundle {}", bundle.display()))?;
        for item in &items {
            writeln!(out, "Installed {} {} ({})", item.kind, item.name, format_version(item.version))?;
        }
        return Ok(0);
    }

    let Some(kind) = args.single else {
        bail!(Error::InvalidArgument(
            "either --zip or --single is required".into()
        ));
    };

    let item = if args.auto {
        if kind != Kind::Module {
            bail!(Error::InvalidArgument(
                "--auto is only available for modules".into()
            ));
        }
        let local_name = local_name(&args.local_name, &args.name)?;
        info!("Attempting to auto parse {}", local_name.display());
        installer.install_module_auto(&local_name, args.force)?
    } else {
        let name = args
            .name
            .clone()
            .ok_or_else(|| Error::InvalidArgument("--name is required for single items".into()))?;
        let health = args
            .health
            .ok_or_else(|| Error::InvalidArgument("--health is required for single items".into()))?;
        let mut item = Item::new(kind, name, health);
        item.version = args.version;
        item.author = joined(&args.author);
        item.about = joined(&args.about);

        let local_name = local_name(&args.local_name, &args.name)?;
        installer.install(InstallRequest::new(item.clone(), local_name), args.force)?;
        item
    };

    writeln!(out, "Installed {} {} ({})", item.kind, item.name, format_version(item.version))?;
    Ok(0)
}

fn local_name(local_name: &Option<PathBuf>, name: &Option<String>) -> Result<PathBuf> {
    match (local_name, name) {
        (Some(path), _) => Ok(path.clone()),
        (None, Some(name)) => Ok(PathBuf::from(name)),
        (None, None) => bail!(Error::InvalidArgument(
            "--local-name or --name is required".into()
        )),
    }
}

fn joined(words: &[String]) -> Option<String> {
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn delete<R: Runtime>(
    runtime: &R,
    installer: &mut Installer<'_, R>,
    args: DeleteArgs,
    out: &mut dyn Write,
) -> Result<i32> {
    // Fail before prompting when there is nothing to delete
    installer.registry().get(args.kind, &args.name)?;

    if !args.force
        && !runtime.confirm(&format!("Delete {} '{}'?", args.kind, args.name))?
    {
        writeln!(out, "Aborted.")?;
        return Ok(0);
    }

    installer.delete(args.kind, &args.name, args.force)?;
    writeln!(out, "Deleted {} {}", args.kind, args.name)?;
    Ok(0)
}

fn list<R: Runtime>(
    installer: &Installer<'_, R>,
    args: ListArgs,
    out: &mut dyn Write,
) -> Result<i32> {
    let kinds = match &args.filter {
        Some(filter) => vec![Kind::from_plural(filter).ok_or_else(|| {
            Error::InvalidArgument(format!("Unknown filter specified: {}", filter))
        })?],
        None => Kind::ALL.to_vec(),
    };

    for kind in kinds {
        writeln!(out, "Installed {}", title(kind))?;
        for item in installer.registry().list(kind) {
            writeln!(out, "\t{} ({})", item.name, format_version(item.version))?;
            if args.verbose {
                writeln!(out, "\t   About: {}", item.about.as_deref().unwrap_or("None"))?;
                writeln!(out, "\t   Author: {}", item.author.as_deref().unwrap_or("None"))?;
                writeln!(out, "\t   Health: {}", item.health)?;
            }
        }
        writeln!(out)?;
    }
    Ok(0)
}

fn title(kind: Kind) -> String {
    let plural = kind.plural();
    let mut chars = plural.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn purge<R: Runtime>(
    runtime: &R,
    installer: &mut Installer<'_, R>,
    args: PurgeArgs,
    out: &mut dyn Write,
) -> Result<i32> {
    if !args.yes {
        writeln!(out, "!!!! WARNING !!!!")?;
        writeln!(out)?;
        writeln!(out, "This will delete all content, and reset the registry!!")?;
        out.flush()?;
        if !runtime.confirm("Are you sure you want to do this?")? {
            return Ok(0);
        }
    }
    installer.purge()?;
    writeln!(out, "Purged all installed content")?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DataLayout;
    use crate::runtime::RealRuntime;
    use std::path::Path;
    use tempfile::tempdir;

    fn run_pm(root: &Path, args: &[&str]) -> (String, i32) {
        let ctx = LaunchContext::new(DataLayout::new(root), None);
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let mut out = Vec::new();
        let status = PmCommand::new(RealRuntime)
            .execute(&ctx, &args, &mut out)
            .unwrap();
        (String::from_utf8(out).unwrap(), status)
    }

    #[test]
    fn test_install_single_and_list() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        let local = dir.path().join("adb");
        std::fs::write(&local, "bin").unwrap();

        let (_, status) = run_pm(
            &root,
            &[
                "install",
                "--single",
                "binary",
                "--name",
                "adb",
                "--local-name",
                local.to_str().unwrap(),
                "--version",
                "1.4",
                "--health",
                "stable",
                "--author",
                "Android",
                "Team",
            ],
        );
        assert_eq!(status, 0);

        let (text, status) = run_pm(&root, &["list", "-v", "binaries"]);
        assert_eq!(status, 0);
        assert_eq!(
            text,
            "Installed Binaries\n\tadb (v1.4)\n\t   About: None\n\t   Author: Android Team\n\t   Health: stable\n\n"
        );
    }

    #[test]
    fn test_list_everything_on_empty_registry() {
        let dir = tempdir().unwrap();
        let (text, status) = run_pm(dir.path(), &["list"]);

        assert_eq!(status, 0);
        assert_eq!(
            text,
            "Installed Binaries\n\nInstalled Libraries\n\nInstalled Modules\n\nInstalled Packages\n\n"
        );
    }

    #[test]
    fn test_errors_become_exit_codes() {
        let dir = tempdir().unwrap();

        let (_, status) = run_pm(dir.path(), &["list", "gadgets"]);
        assert_eq!(status, Error::InvalidArgument(String::new()).exit_code());

        let (_, status) = run_pm(dir.path(), &["install", "--single", "module", "--name", "x"]);
        assert_eq!(status, Error::InvalidArgument(String::new()).exit_code());

        let (_, status) = run_pm(
            dir.path(),
            &["install", "--single", "module", "--version", "5", "--name", "x"],
        );
        assert_eq!(status, Error::InvalidArgument(String::new()).exit_code());

        let (_, status) = run_pm(dir.path(), &["delete", "--type", "module", "--name", "x"]);
        assert_eq!(status, Error::NotFound(String::new()).exit_code());

        let (_, status) = run_pm(dir.path(), &["export", dir.path().join("o.zip").to_str().unwrap()]);
        assert_eq!(
            status,
            Error::Archive(crate::error::ArchiveError::NothingToExport).exit_code()
        );
    }

    #[test]
    fn test_auto_is_only_for_modules() {
        let dir = tempdir().unwrap();
        let (_, status) = run_pm(
            dir.path(),
            &["install", "--single", "binary", "--auto", "--name", "x"],
        );
        assert_eq!(status, Error::InvalidArgument(String::new()).exit_code());
    }

    #[test]
    fn test_help_is_written_to_sink() {
        let dir = tempdir().unwrap();
        let (text, status) = run_pm(dir.path(), &["--help"]);

        assert_eq!(status, 0);
        assert!(text.contains("install"));
        assert!(text.contains("purge"));
    }

    #[test]
    fn test_forced_delete_and_purge() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("data");
        let local = dir.path().join("tool.sh");
        std::fs::write(&local, "#!/bin/sh\n#@Name: tool\n#@Health: beta\n").unwrap();

        let (text, status) = run_pm(
            &root,
            &["install", "--single", "module", "--auto", "--local-name", local.to_str().unwrap()],
        );
        assert_eq!(status, 0);
        assert_eq!(text, "Installed module tool (No Version)\n");

        let (_, status) = run_pm(&root, &["delete", "--type", "module", "--name", "tool", "--force"]);
        assert_eq!(status, 0);
        assert!(!root.join("modules/tool").exists());

        let (_, status) = run_pm(&root, &["purge", "--yes"]);
        assert_eq!(status, 0);
        assert!(root.join("registry.json").is_file());
    }
}
