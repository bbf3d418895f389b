//! Operator dispatch registry.
//!
//! Maps operator classes to ranked lists of [`Strategy`]s. Resolution walks
//! the node's class and then its declared ancestors, trying each class's
//! strategies in order until one produces a [`Callable`].
//!
//! # Example
//!
//! ```ignore
//! let registry = default_registry();
//! let callable = registry.resolve(&node, &DispatchContext::new())?;
//! let value = callable(&[Value::Scalar(2.0), Value::Scalar(3.0)])?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tessera_ir::{Apply, FunctionGraph, OpClass};
use tracing::{debug, trace};

use crate::config::DispatchContext;
use crate::error::*;
use crate::program::Program;
use crate::provider::{ProviderSlot, SpecialFunctionProvider};
use crate::value::Callable;

/// Builds a callable from the backend's own primitives, or `None` to fall through.
pub type NativeBuilder =
    Arc<dyn Fn(&Apply, &DispatchRegistry, &DispatchContext) -> Result<Option<Callable>> + Send + Sync>;

/// Builds a callable from a loaded special-function provider, or `None` to fall through.
pub type ProviderBuilder =
    Arc<dyn Fn(&Apply, Arc<dyn SpecialFunctionProvider>) -> Result<Option<Callable>> + Send + Sync>;

/// One way of implementing an operator class.
#[derive(Clone)]
pub enum Strategy {
    Native { name: &'static str, build: NativeBuilder },
    /// Only usable when the registry's provider loads.
    Provider { name: &'static str, build: ProviderBuilder },
}

impl Strategy {
    pub fn native(
        name: &'static str,
        build: impl Fn(&Apply, &DispatchRegistry, &DispatchContext) -> Result<Option<Callable>> + Send + Sync + 'static,
    ) -> Self {
        Self::Native { name, build: Arc::new(build) }
    }

    pub fn provider(
        name: &'static str,
        build: impl Fn(&Apply, Arc<dyn SpecialFunctionProvider>) -> Result<Option<Callable>> + Send + Sync + 'static,
    ) -> Self {
        Self::Provider { name, build: Arc::new(build) }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Native { name, .. } | Self::Provider { name, .. } => name,
        }
    }

    pub fn needs_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.needs_provider() { "Provider" } else { "Native" };
        write!(f, "{kind}({})", self.name())
    }
}

/// Registry of backend implementations keyed by operator class.
///
/// Read-only after construction; share it behind an `Arc`.
pub struct DispatchRegistry {
    backend: String,
    strategies: HashMap<OpClass, Vec<Strategy>>,
    provider: ProviderSlot,
}

impl DispatchRegistry {
    /// Empty registry.
    pub fn new(backend: impl Into<String>, provider: ProviderSlot) -> Self {
        Self { backend: backend.into(), strategies: HashMap::new(), provider }
    }

    /// Registry with every array backend strategy and the default provider loader.
    pub fn array_backend() -> Self {
        Self::array_backend_with(ProviderSlot::with_default_loader())
    }

    /// Array backend registry with a custom provider slot.
    pub fn array_backend_with(provider: ProviderSlot) -> Self {
        let mut registry = Self::new("array", provider);
        crate::array::register(&mut registry);
        registry
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn provider(&self) -> &ProviderSlot {
        &self.provider
    }

    /// Append `strategy` to the strategies of `class`, ranked after those
    /// already registered.
    pub fn register(&mut self, class: OpClass, strategy: Strategy) {
        self.strategies.entry(class).or_default().push(strategy);
    }

    pub fn strategies(&self, class: OpClass) -> &[Strategy] {
        self.strategies.get(&class).map(Vec::as_slice).unwrap_or_default()
    }

    /// Classes consulted for `class`: the class itself, then its ancestors nearest first.
    pub fn resolution_order(&self, class: OpClass) -> Vec<OpClass> {
        class.resolution_order().collect()
    }

    /// Backend callable for `node`.
    ///
    /// Provider strategies whose provider fails to load are skipped; if
    /// nothing else resolves the node, the error says the provider would.
    pub fn resolve(&self, node: &Apply, ctx: &DispatchContext) -> Result<Callable> {
        let class = node.op().class();
        let mut provider_missing = false;

        for candidate in class.resolution_order() {
            for strategy in self.strategies(candidate) {
                trace!(op = %node.op(), class = %candidate, strategy = strategy.name(), "trying strategy");
                let built = match strategy {
                    Strategy::Native { build, .. } => build(node, self, ctx)?,
                    Strategy::Provider { build, .. } => match self.provider.get() {
                        Ok(provider) => build(node, provider)?,
                        Err(error) => {
                            debug!(
                                op = %node.op(),
                                strategy = strategy.name(),
                                %error,
                                "provider strategy unavailable"
                            );
                            provider_missing = true;
                            None
                        }
                    },
                };
                if let Some(callable) = built {
                    debug!(op = %node.op(), class = %candidate, strategy = strategy.name(), "resolved");
                    return Ok(callable);
                }
            }
        }

        UnimplementedSnafu {
            op: node.op().name().into_owned(),
            provider_hint: provider_missing.then(|| provider_hint(self.provider.name())),
        }
        .fail()
    }

    /// Resolve every node of `fgraph` into a runnable [`Program`].
    ///
    /// Fails on the first node that cannot be resolved.
    #[tracing::instrument(skip_all, fields(backend = %self.backend, depth = ctx.depth, nodes = fgraph.num_nodes()))]
    pub fn lower_graph(&self, fgraph: &FunctionGraph, ctx: &DispatchContext) -> Result<Program> {
        Program::lower(self, fgraph, &ctx.bounded_by(fgraph))
    }
}

impl fmt::Debug for DispatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchRegistry")
            .field("backend", &self.backend)
            .field("classes", &self.strategies.len())
            .field("provider", &self.provider)
            .finish()
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<DispatchRegistry>> = Lazy::new(|| Arc::new(DispatchRegistry::array_backend()));

/// Process-wide array backend registry.
pub fn default_registry() -> Arc<DispatchRegistry> {
    Arc::clone(&DEFAULT_REGISTRY)
}
