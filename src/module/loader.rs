//! In-process loading of source-flavored (native) modules.
//!
//! A native module is a shared object exporting a C-ABI constructor named
//! exactly like the command:
//!
//! ```c
//! typedef int (*plugkit_write_fn)(void *sink, const uint8_t *data, size_t len);
//!
//! typedef struct {
//!     void *instance;
//!     int (*run)(void *instance, size_t argc, const char *const *argv,
//!                void *sink, plugkit_write_fn write);
//!     void (*drop)(void *instance);
//! } plugkit_module;
//!
//! plugkit_module hello(void);
//! ```

use libloading::Library;
use log::{debug, warn};
use std::ffi::{CString, c_char, c_int, c_void};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::runtime::Runtime;

use super::inspect;
use super::{CommandHandler, LaunchContext};

/// Callback a native module uses to write standard output.
pub type SinkWriteFn = unsafe extern "C" fn(sink: *mut c_void, data: *const u8, len: usize) -> c_int;

pub type ModuleRunFn = unsafe extern "C" fn(
    instance: *mut c_void,
    argc: usize,
    argv: *const *const c_char,
    sink: *mut c_void,
    write: SinkWriteFn,
) -> c_int;

pub type ModuleDropFn = unsafe extern "C" fn(instance: *mut c_void);

/// Value returned by a module's constructor symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawModule {
    pub instance: *mut c_void,
    pub run: Option<ModuleRunFn>,
    pub drop: Option<ModuleDropFn>,
}

pub type ModuleConstructor = unsafe extern "C" fn() -> RawModule;

/// Turns a source-flavored module file into a runnable handler.
#[cfg_attr(test, mockall::automock)]
pub trait ModuleLoader {
    /// Load `path` and construct the module exported as `name`.
    ///
    /// `search_paths` are directories holding shared libraries the module may
    /// depend on.
    fn load(
        &self,
        path: &Path,
        name: &str,
        search_paths: &[PathBuf],
    ) -> Result<Box<dyn CommandHandler>>;
}

/// Loads native modules with the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader<R: Runtime> {
    runtime: R,
}

impl<R: Runtime> NativeModuleLoader<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }
}

impl<R: Runtime> ModuleLoader for NativeModuleLoader<R> {
    #[tracing::instrument(skip(self))]
    fn load(
        &self,
        path: &Path,
        name: &str,
        search_paths: &[PathBuf],
    ) -> Result<Box<dyn CommandHandler>> {
        let bytes = self.runtime.read(path).map_err(|e| Error::Load {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;
        let dependencies = self.preload_dependencies(&bytes, search_paths);

        // SAFETY: loading a shared object runs its initializers. Modules are
        // installed by the operator and trusted the same way as scripts.
        let library = unsafe { open_library(path) }.map_err(|e| Error::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // Symbol lookup on the handle also searches the module's dependencies
        if !inspect::exports_symbol(&bytes, name) {
            return Err(Error::EntryPointMissing {
                symbol: name.to_string(),
                path: path.to_path_buf(),
            });
        }

        // SAFETY: the exported symbol must follow the `ModuleConstructor` ABI
        // documented at the top of this module.
        let raw = unsafe {
            let constructor = library
                .get::<ModuleConstructor>(name.as_bytes())
                .map_err(|_| Error::EntryPointMissing {
                    symbol: name.to_string(),
                    path: path.to_path_buf(),
                })?;
            constructor()
        };

        if raw.instance.is_null() || raw.run.is_none() {
            if let (Some(drop), false) = (raw.drop, raw.instance.is_null()) {
                // SAFETY: the instance came from this module's constructor.
                unsafe { drop(raw.instance) };
            }
            return Err(Error::Instantiation(format!(
                "{}: constructor in {:?} returned no instance",
                name, path
            )));
        }

        debug!("Loaded native module '{}' from {:?}", name, path);
        Ok(Box::new(NativeModule {
            raw,
            name: name.to_string(),
            _library: library,
            _dependencies: dependencies,
        }))
    }
}

impl<R: Runtime> NativeModuleLoader<R> {
    /// Load every direct dependency of the module found in `search_paths`, so
    /// the dynamic loader can satisfy it without `LD_LIBRARY_PATH`.
    fn preload_dependencies(&self, bytes: &[u8], search_paths: &[PathBuf]) -> Vec<Library> {
        if search_paths.is_empty() {
            return Vec::new();
        }

        let mut loaded = Vec::new();
        for needed in inspect::needed_libraries(bytes) {
            let Some(candidate) = search_paths
                .iter()
                .map(|dir| dir.join(&needed))
                .find(|p| self.runtime.is_file(p))
            else {
                continue;
            };
            // SAFETY: see `NativeModuleLoader::load`.
            match unsafe { open_library(&candidate) } {
                Ok(lib) => {
                    debug!("Preloaded {:?}", candidate);
                    loaded.push(lib);
                }
                Err(e) => warn!("Failed to preload {:?}: {}", candidate, e),
            }
        }
        loaded
    }
}

/// A constructed native module. Keeps its library (and preloaded
/// dependencies) mapped until the instance has been dropped.
struct NativeModule {
    raw: RawModule,
    name: String,
    _library: Library,
    _dependencies: Vec<Library>,
}

impl CommandHandler for NativeModule {
    fn execute(
        &mut self,
        _ctx: &LaunchContext,
        args: &[String],
        out: &mut dyn Write,
    ) -> Result<i32> {
        let Some(run) = self.raw.run else {
            return Err(Error::Instantiation(self.name.clone()));
        };

        let c_args = args
            .iter()
            .map(|a| CString::new(a.as_bytes()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| {
                Error::InvalidArgument("module arguments must not contain NUL bytes".into())
            })?;
        let argv: Vec<*const c_char> = c_args.iter().map(|a| a.as_ptr()).collect();

        let mut sink: &mut dyn Write = out;
        let sink_ptr = &mut sink as *mut &mut dyn Write as *mut c_void;

        // SAFETY: `argv` and `sink` outlive the call; the module only uses them
        // for its duration.
        let status = unsafe {
            run(
                self.raw.instance,
                argv.len(),
                argv.as_ptr(),
                sink_ptr,
                write_to_sink,
            )
        };

        sink.flush()
            .map_err(|e| Error::io("Failed to flush module output", e))?;
        Ok(status)
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        if let Some(drop) = self.raw.drop {
            // SAFETY: the instance is dropped exactly once, while its library
            // is still loaded.
            unsafe { drop(self.raw.instance) };
        }
    }
}

/// Write callback handed to native modules. Returns 0 on success, -1 on failure.
///
/// # Safety
///
/// `sink` must point to a live `&mut dyn Write` and `data` to `len` readable bytes.
pub unsafe extern "C" fn write_to_sink(sink: *mut c_void, data: *const u8, len: usize) -> c_int {
    if sink.is_null() || (data.is_null() && len > 0) {
        return -1;
    }
    // SAFETY: guaranteed by the caller contract above.
    let out = unsafe { &mut *(sink as *mut &mut dyn Write) };
    let bytes = if len == 0 {
        &[][..]
    } else {
        // SAFETY: guaranteed by the caller contract above.
        unsafe { std::slice::from_raw_parts(data, len) }
    };
    match out.write_all(bytes) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[cfg(unix)]
unsafe fn open_library(path: &Path) -> std::result::Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};
    // Global so preloaded dependencies satisfy the module's undefined symbols
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(not(unix))]
unsafe fn open_library(path: &Path) -> std::result::Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}
