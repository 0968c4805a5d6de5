//! Module resolution and launch runtime.
//!
//! A module name is resolved to a built-in handler, a script, or a native
//! shared object, and then executed against an explicit [`LaunchContext`]
//! with its output written to a caller-supplied sink.

pub mod binary;
pub mod context;
pub mod handler;
pub mod inspect;
pub mod launch;
pub mod loader;
pub mod resolver;
pub mod script;

pub use binary::{BinaryOutput, launch_binary};
pub use context::LaunchContext;
pub use handler::{CommandHandler, HandlerFactory, HandlerRegistry};
pub use inspect::Flavor;
pub use launch::Launcher;
pub use loader::{ModuleLoader, NativeModuleLoader};
pub use resolver::{LOCAL_MODULES_DIR, ModuleResolver, ModuleTarget, ResolvedModule, Tier};
