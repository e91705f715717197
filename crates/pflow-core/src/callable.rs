//! The callable seam: what the engine knows about a node's implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;

use pflow_types::{ParamSpec, Value};

/// A node implementation.
///
/// The engine consumes only the parameter metadata and the call itself: a
/// missing parameter means "use your default", an explicit null overrides
/// any default. Callables must not mutate their inputs.
pub trait Callable: Send + Sync {
    /// Ordered parameter metadata.
    fn signature(&self) -> &[ParamSpec];

    /// Execute with the given parameter map.
    fn call(&self, params: BTreeMap<String, Value>) -> Result<Value>;
}

/// A callable built from a closure, for tests and built-in tools.
pub struct FnCallable {
    signature: Vec<ParamSpec>,
    func: Box<dyn Fn(BTreeMap<String, Value>) -> Result<Value> + Send + Sync>,
}

impl FnCallable {
    pub fn new<F>(signature: Vec<ParamSpec>, func: F) -> Self
    where
        F: Fn(BTreeMap<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self { signature, func: Box::new(func) }
    }
}

impl Callable for FnCallable {
    fn signature(&self) -> &[ParamSpec] {
        &self.signature
    }

    fn call(&self, params: BTreeMap<String, Value>) -> Result<Value> {
        (self.func)(params)
    }
}

/// Tool name to callable lookup, shared across lines of a batch.
#[derive(Default, Clone)]
pub struct CallableRegistry {
    tools: BTreeMap<String, Arc<dyn Callable>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, callable: Arc<dyn Callable>) {
        self.tools.insert(name.into(), callable);
    }

    /// Register a closure-backed callable.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, signature: Vec<ParamSpec>, func: F)
    where
        F: Fn(BTreeMap<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnCallable::new(signature, func)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Callable>> {
        self.tools.get(name).cloned()
    }
}
