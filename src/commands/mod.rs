use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use std::io::Write;

use crate::{
    error::Error,
    module::{CommandHandler, HandlerRegistry, LaunchContext, Launcher, ModuleResolver, NativeModuleLoader},
    registry::ItemRegistry,
    runtime::Runtime,
};

pub mod config;
mod pm;

pub use pm::PmCommand;

use config::Config;

/// Name of the built-in package manager command.
pub const PM_COMMAND: &str = "pm";

#[derive(Serialize, Debug, PartialEq)]
struct CapturedRun {
    status: i32,
    output: String,
}

/// Handlers compiled into the binary.
pub fn builtin_handlers<R: Runtime + Clone + 'static>(runtime: &R) -> HandlerRegistry {
    let mut builtins = HandlerRegistry::new();
    let runtime = runtime.clone();
    builtins.register(PM_COMMAND, move || {
        Ok(Box::new(PmCommand::new(runtime.clone())) as Box<dyn CommandHandler>)
    });
    builtins
}

/// Resolve `module` and run it with `args`.
///
/// Output is streamed to stdout, or with `capture` collected and printed once
/// as a JSON object holding the status and the output.
#[tracing::instrument(skip(config, args))]
pub fn launch<R: Runtime + Clone + 'static>(
    config: Config<R>,
    module: &str,
    args: &[String],
    capture: bool,
) -> Result<i32> {
    let registry = ItemRegistry::open(&config.runtime, &config.layout.registry_path())
        .context("Failed to open the item registry")?;
    let context = LaunchContext::new(config.layout.clone(), config.project.clone())
        .with_library_paths(&registry);
    debug!("Library search paths: {:?}", context.library_paths);

    let builtins = builtin_handlers(&config.runtime);
    let resolver = ModuleResolver::new(&config.runtime, &config.layout, &registry, &builtins)
        .with_project_root(context.project_root());
    let loader = NativeModuleLoader::new(config.runtime.clone());
    let launcher = Launcher::new(resolver, &builtins, &loader, &context);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if capture {
        let (output, status) = launcher.launch_captured(module, args)?;
        let json = serde_json::to_string_pretty(&CapturedRun { status, output })?;
        writeln!(out, "{}", json)?;
        Ok(status)
    } else {
        let status = launcher.launch(module, args, &mut out)?;
        out.flush()?;
        Ok(status)
    }
}

/// Exit status for a failed invocation: the typed error's code, or -1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>().map(Error::exit_code).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;
    use crate::layout::DataLayout;
    use crate::runtime::RealRuntime;
    use tempfile::tempdir;

    #[test]
    fn test_exit_code_downcasts_through_context() {
        let err = anyhow::Error::from(Error::Resolution("x".into())).context("while launching");
        assert_eq!(exit_code(&err), -7);

        let err = anyhow::Error::from(Error::from(ArchiveError::NothingToExport));
        assert_eq!(exit_code(&err), -13);

        assert_eq!(exit_code(&anyhow::anyhow!("untyped")), -1);
    }

    #[test]
    fn test_builtins_contain_pm() {
        let builtins = builtin_handlers(&RealRuntime);
        assert!(builtins.contains(PM_COMMAND));
        assert_eq!(builtins.names().collect::<Vec<_>>(), vec![PM_COMMAND]);
    }

    #[test]
    fn test_pm_runs_as_builtin() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("data"));
        let context = LaunchContext::new(layout.clone(), None);
        let builtins = builtin_handlers(&RealRuntime);

        let mut handler = builtins.instantiate(PM_COMMAND).unwrap();
        let mut out = Vec::new();
        let status = handler
            .execute(&context, &["list".to_string(), "modules".to_string()], &mut out)
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "Installed Modules\n\n");
        assert!(layout.registry_path().is_file());
    }

    #[test]
    fn test_captured_run_json_shape() {
        let json = serde_json::to_value(CapturedRun {
            status: 3,
            output: "a\nb\n".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"status": 3, "output": "a\nb\n"}));
    }
}
