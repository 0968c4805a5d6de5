use log::{debug, info};
use std::io::Write;

use crate::error::Result;
use crate::runtime::Runtime;

use super::resolver::{ModuleResolver, ModuleTarget, ResolvedModule};
use super::script::run_script;
use super::{HandlerRegistry, LaunchContext, ModuleLoader};

/// Resolves a module by name and runs it against an explicit context.
pub struct Launcher<'a, R: Runtime> {
    resolver: ModuleResolver<'a, R>,
    builtins: &'a HandlerRegistry,
    loader: &'a dyn ModuleLoader,
    context: &'a LaunchContext,
}

impl<'a, R: Runtime> Launcher<'a, R> {
    pub fn new(
        resolver: ModuleResolver<'a, R>,
        builtins: &'a HandlerRegistry,
        loader: &'a dyn ModuleLoader,
        context: &'a LaunchContext,
    ) -> Self {
        Self {
            resolver,
            builtins,
            loader,
            context,
        }
    }

    /// Run `module` with `args`, streaming its output to `out`.
    #[tracing::instrument(skip(self, out))]
    pub fn launch(&self, module: &str, args: &[String], out: &mut dyn Write) -> Result<i32> {
        let resolved = self.resolver.resolve(module)?;
        info!("Launching {} module '{}'", resolved.tier, resolved.name);
        self.run(&resolved, args, out)
    }

    /// Run `module` with its output collected in memory instead of streamed.
    pub fn launch_captured(&self, module: &str, args: &[String]) -> Result<(String, i32)> {
        let mut buffer = Vec::new();
        let status = self.launch(module, args, &mut buffer)?;
        Ok((String::from_utf8_lossy(&buffer).into_owned(), status))
    }

    pub fn run(
        &self,
        resolved: &ResolvedModule,
        args: &[String],
        out: &mut dyn Write,
    ) -> Result<i32> {
        let status = match &resolved.target {
            ModuleTarget::Builtin => {
                let mut handler = self.builtins.instantiate(&resolved.name)?;
                handler.execute(self.context, args, out)?
            }
            ModuleTarget::Script(path) => run_script(path, args, self.context, out)?,
            ModuleTarget::Source(path) => {
                let mut handler =
                    self.loader
                        .load(path, &resolved.name, &self.context.library_paths)?;
                handler.execute(self.context, args, out)?
            }
        };
        debug!("Module '{}' returned {}", resolved.name, status);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::item::{Health, Item, Kind};
    use crate::layout::DataLayout;
    use crate::module::context::LOG_HELPER_ENV;
    use crate::module::loader::{MockModuleLoader, NativeModuleLoader};
    use crate::module::resolver::LOCAL_MODULES_DIR;
    use crate::module::CommandHandler;
    use crate::project::ProjectProperties;
    use crate::registry::ItemRegistry;
    use crate::runtime::RealRuntime;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    const THREE_LINES: &str = "#!/bin/sh\necho first\necho second\necho third\nexit 2\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: DataLayout,
        project: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path().join("data"));
        let project = dir.path().join("project");
        std::fs::create_dir_all(project.join(LOCAL_MODULES_DIR)).unwrap();
        Fixture {
            _dir: dir,
            layout,
            project,
        }
    }

    fn builtins() -> HandlerRegistry {
        let mut builtins = HandlerRegistry::new();
        builtins.register("greet", || {
            Ok(Box::new(
                |ctx: &LaunchContext, args: &[String], out: &mut dyn Write| -> Result<i32> {
                    writeln!(out, "hello {} from {:?}", args.join(","), ctx.device_id())
                        .map_err(|e| Error::io("write", e))?;
                    Ok(0)
                },
            ) as Box<dyn CommandHandler>)
        });
        builtins
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_does_not_disturb_streaming() {
        let f = fixture();
        crate::test_utils::write_script(&f.project.join(LOCAL_MODULES_DIR), "three", THREE_LINES);
        let registry = ItemRegistry::open(&RealRuntime, &f.layout.registry_path()).unwrap();
        let builtins = builtins();
        let context = LaunchContext::new(
            f.layout.clone(),
            Some(ProjectProperties::new(&f.project, None)),
        );
        let resolver = ModuleResolver::new(&RealRuntime, &f.layout, &registry, &builtins)
            .with_project_root(context.project_root());
        let loader = NativeModuleLoader::new(RealRuntime);
        let launcher = Launcher::new(resolver, &builtins, &loader, &context);

        let mut streamed = Vec::new();
        assert_eq!(launcher.launch("three", &[], &mut streamed).unwrap(), 2);
        assert_eq!(streamed, b"first\nsecond\nthird\n");

        let (text, status) = launcher.launch_captured("three", &[]).unwrap();
        assert_eq!(status, 2);
        assert_eq!(text, "first\nsecond\nthird\n");

        let mut again = Vec::new();
        assert_eq!(launcher.launch("three", &[], &mut again).unwrap(), 2);
        assert_eq!(again, b"first\nsecond\nthird\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_overlay_stays_in_child() {
        let f = fixture();
        crate::test_utils::write_script(
            &f.project.join(LOCAL_MODULES_DIR),
            "env",
            "#!/bin/sh\necho \"$PLUGKIT_LOG\"\n",
        );
        let registry = ItemRegistry::open(&RealRuntime, &f.layout.registry_path()).unwrap();
        let builtins = builtins();
        let context = LaunchContext::new(
            f.layout.clone(),
            Some(ProjectProperties::new(&f.project, None)),
        );
        let resolver = ModuleResolver::new(&RealRuntime, &f.layout, &registry, &builtins)
            .with_project_root(context.project_root());
        let loader = NativeModuleLoader::new(RealRuntime);
        let launcher = Launcher::new(resolver, &builtins, &loader, &context);

        let before = std::env::var_os(LOG_HELPER_ENV);
        let (text, _) = launcher.launch_captured("env", &[]).unwrap();

        assert_eq!(Path::new(text.trim()), f.layout.log_helper());
        assert_eq!(std::env::var_os(LOG_HELPER_ENV), before);
    }

    #[test]
    fn test_builtin_receives_context() {
        let f = fixture();
        let registry = ItemRegistry::open(&RealRuntime, &f.layout.registry_path()).unwrap();
        let builtins = builtins();
        let context = LaunchContext::new(
            f.layout.clone(),
            Some(ProjectProperties::new(&f.project, Some("dev-1".into()))),
        );
        let resolver = ModuleResolver::new(&RealRuntime, &f.layout, &registry, &builtins);
        let loader = NativeModuleLoader::new(RealRuntime);
        let launcher = Launcher::new(resolver, &builtins, &loader, &context);

        let (text, status) = launcher
            .launch_captured("greet", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(text, "hello a,b from Some(\"dev-1\")\n");
    }

    #[test]
    fn test_source_module_goes_through_loader_with_library_paths() {
        let f = fixture();
        let mut registry = ItemRegistry::open(&RealRuntime, &f.layout.registry_path()).unwrap();
        registry
            .create(Item::new(Kind::Library, "support", Health::Stable), false)
            .unwrap();
        let builtins = builtins();
        let context = LaunchContext::new(f.layout.clone(), None).with_library_paths(&registry);
        let expected_paths = vec![f.layout.install_path(Kind::Library, "support")];

        let mut loader = MockModuleLoader::new();
        loader
            .expect_load()
            .withf(move |path, name, search| {
                path == Path::new("/modules/native.so")
                    && name == "native"
                    && search == expected_paths.as_slice()
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(Box::new(
                    |_: &LaunchContext, _: &[String], out: &mut dyn Write| -> Result<i32> {
                        out.write_all(b"native output\n")
                            .map_err(|e| Error::io("write", e))?;
                        Ok(7)
                    },
                ) as Box<dyn CommandHandler>)
            });

        let resolver = ModuleResolver::new(&RealRuntime, &f.layout, &registry, &builtins);
        let launcher = Launcher::new(resolver, &builtins, &loader, &context);
        let resolved = ResolvedModule {
            name: "native".to_string(),
            tier: crate::module::Tier::Global,
            target: ModuleTarget::Source(PathBuf::from("/modules/native.so")),
        };

        let mut out = Vec::new();
        assert_eq!(launcher.run(&resolved, &[], &mut out).unwrap(), 7);
        assert_eq!(out, b"native output\n");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_source_module_without_entry_point() {
        let Some(libm) = crate::test_utils::system_library("libm.so.6") else {
            return;
        };
        let f = fixture();
        let target = f.project.join(LOCAL_MODULES_DIR).join("mathless");
        std::fs::copy(&libm, &target).unwrap();

        let registry = ItemRegistry::open(&RealRuntime, &f.layout.registry_path()).unwrap();
        let builtins = builtins();
        let context = LaunchContext::new(
            f.layout.clone(),
            Some(ProjectProperties::new(&f.project, None)),
        );
        let resolver = ModuleResolver::new(&RealRuntime, &f.layout, &registry, &builtins)
            .with_project_root(context.project_root());
        let loader = NativeModuleLoader::new(RealRuntime);
        let launcher = Launcher::new(resolver, &builtins, &loader, &context);

        let err = launcher.launch("mathless", &[], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::EntryPointMissing { .. }));
    }

    #[test]
    fn test_unknown_module() {
        let f = fixture();
        let registry = ItemRegistry::open(&RealRuntime, &f.layout.registry_path()).unwrap();
        let builtins = builtins();
        let context = LaunchContext::new(f.layout.clone(), None);
        let resolver = ModuleResolver::new(&RealRuntime, &f.layout, &registry, &builtins);
        let loader = NativeModuleLoader::new(RealRuntime);
        let launcher = Launcher::new(resolver, &builtins, &loader, &context);

        let err = launcher.launch_captured("nothing", &[]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
