use std::collections::BTreeMap;
use std::io::Write;

use crate::error::{Error, Result};

use super::LaunchContext;

/// A runnable command. The launch runtime only ever sees this capability.
pub trait CommandHandler {
    /// Run with `args`, writing standard output to `out`. Returns the exit status.
    fn execute(&mut self, ctx: &LaunchContext, args: &[String], out: &mut dyn Write)
    -> Result<i32>;
}

impl<F> CommandHandler for F
where
    F: FnMut(&LaunchContext, &[String], &mut dyn Write) -> Result<i32>,
{
    fn execute(
        &mut self,
        ctx: &LaunchContext,
        args: &[String],
        out: &mut dyn Write,
    ) -> Result<i32> {
        self(ctx, args, out)
    }
}

pub type HandlerFactory = Box<dyn Fn() -> Result<Box<dyn CommandHandler>>>;

/// Named factories for handlers compiled into the binary.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn CommandHandler>> + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct a fresh handler instance.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn CommandHandler>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("built-in command '{}'", name)))?;
        factory().map_err(|e| match e {
            Error::Instantiation(_) => e,
            other => Error::Instantiation(format!("{}: {}", name, other)),
        })
    }
}
