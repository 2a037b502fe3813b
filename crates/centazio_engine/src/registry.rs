//! Explicit function registration.
//!
//! Hosts register a factory per function name once at startup and build
//! the set they want to run.

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::function::Function;
use std::sync::Arc;

/// Builds a function from the engine context.
pub type FunctionFactory = Box<dyn Fn(&EngineContext) -> EngineResult<Function> + Send + Sync>;

/// Name to factory table, kept in registration order.
#[derive(Default)]
pub struct FunctionRegistry {
    factories: Vec<(String, FunctionFactory)>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> EngineResult<()>
    where
        F: Fn(&EngineContext) -> EngineResult<Function> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(EngineError::DuplicateFunction(name));
        }
        self.factories.push((name, Box::new(factory)));
        Ok(())
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Builds one function.
    pub fn build(&self, name: &str, ctx: &EngineContext) -> EngineResult<Arc<Function>> {
        let (_, factory) = self
            .factories
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))?;
        Ok(Arc::new(factory(ctx)?))
    }

    /// Builds every registered function.
    pub fn build_all(&self, ctx: &EngineContext) -> EngineResult<Vec<Arc<Function>>> {
        self.factories
            .iter()
            .map(|(_, factory)| factory(ctx).map(Arc::new))
            .collect()
    }
}
