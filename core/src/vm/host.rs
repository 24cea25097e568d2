//! Host capability table.
//!
//! Opcode handlers reach the embedding environment only through named capabilities. Hosts can
//! wrap every capability call with [`Interceptor`]s, e.g. to log or rewrite arguments.

use std::{fmt, sync::Arc};

use anyhow::{Result, anyhow};

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Val;

pub type HostFn = Arc<dyn Fn(&[Val]) -> Result<Val> + Send + Sync>;

/// Middleware around capability calls. Call `next` to continue the chain.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, name: &str, args: &[Val], next: &dyn Fn(&[Val]) -> Result<Val>) -> Result<Val>;
}

impl<F> Interceptor for F
where
    F: Fn(&str, &[Val], &dyn Fn(&[Val]) -> Result<Val>) -> Result<Val> + Send + Sync,
{
    fn intercept(&self, name: &str, args: &[Val], next: &dyn Fn(&[Val]) -> Result<Val>) -> Result<Val> {
        self(name, args, next)
    }
}

#[derive(Clone, Default)]
pub struct HostCapabilities {
    functions: FastHashMap<String, HostFn>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("functions", &self.names())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl HostCapabilities {
    pub fn new() -> Self {
        Self {
            functions: fast_hash_map_new(),
            interceptors: Vec::new(),
        }
    }

    /// Registers `func` under `name`, replacing any previous capability of that name.
    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> Option<HostFn>
    where
        F: Fn(&[Val]) -> Result<Val> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(func))
    }

    pub fn add_interceptor(&mut self, interceptor: impl Interceptor + 'static) {
        self.interceptors.push(Arc::new(interceptor));
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invokes a capability through the interceptor chain, first registered outermost.
    pub fn call(&self, name: &str, args: &[Val]) -> Result<Val> {
        let func = self
            .functions
            .get(name)
            .ok_or_else(|| anyhow!("Unknown host capability: {}", name))?;
        self.call_chain(0, name, func, args)
    }

    fn call_chain(&self, depth: usize, name: &str, func: &HostFn, args: &[Val]) -> Result<Val> {
        match self.interceptors.get(depth) {
            Some(interceptor) => {
                interceptor.intercept(name, args, &|args| self.call_chain(depth + 1, name, func, args))
            }
            None => func(args),
        }
    }
}
