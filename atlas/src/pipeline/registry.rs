//! Pipeline definitions and the global handler registry.
//!
//! Handlers are stored type-erased so that one registry can hold pipelines
//! with different payload types. Each entry remembers the payload
//! [`TypeId`] it was registered for; dispatch downcasts back to
//! [`SharedHandler<T>`] and skips entries registered for another type.

use std::any::{Any, TypeId};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::handler::{PipelineHandler, SharedHandler};

/// Metadata describing a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name, e.g. `agent.before_execute`.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Inactive pipelines never invoke their handlers.
    #[serde(default = "default_active")]
    pub active: bool,
}

const fn default_active() -> bool {
    true
}

impl PipelineDefinition {
    /// Create an active definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            active: true,
        }
    }
}

/// Where a handler entry came from. Global entries sort before runtime
/// entries of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Origin {
    Global,
    Runtime,
}

/// A type-erased handler plus its ordering keys.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    handler: Arc<dyn Any + Send + Sync>,
    payload: TypeId,
    payload_name: &'static str,
    pub(crate) priority: i32,
    pub(crate) origin: Origin,
    pub(crate) sequence: u64,
}

impl HandlerEntry {
    fn new<T: Send + 'static>(
        handler: SharedHandler<T>,
        priority: i32,
        origin: Origin,
        sequence: u64,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            payload: TypeId::of::<T>(),
            payload_name: std::any::type_name::<T>(),
            priority,
            origin,
            sequence,
        }
    }

    pub(crate) fn sort_key(&self) -> (Reverse<i32>, Origin, u64) {
        (Reverse(self.priority), self.origin, self.sequence)
    }

    /// Recover the typed handler, or `None` if registered for another payload.
    pub(crate) fn downcast<T: Send + 'static>(&self, pipeline: &str) -> Option<SharedHandler<T>> {
        if self.payload != TypeId::of::<T>() {
            warn!(
                pipeline,
                registered = self.payload_name,
                dispatched = std::any::type_name::<T>(),
                "skipping pipeline handler registered for a different payload type"
            );
            return None;
        }
        self.handler.downcast_ref::<SharedHandler<T>>().cloned()
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("payload", &self.payload_name)
            .field("priority", &self.priority)
            .field("origin", &self.origin)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[derive(Debug)]
struct Pipeline {
    definition: PipelineDefinition,
    handlers: Vec<HandlerEntry>,
}

impl Pipeline {
    fn implicit(name: &str) -> Self {
        Self {
            definition: PipelineDefinition::new(name, ""),
            handlers: Vec::new(),
        }
    }
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Registry of pipelines and their globally registered handlers.
///
/// # Example
///
/// ```rust,ignore
/// let registry = PipelineRegistry::new();
/// registry.define("agent.before_execute", "Runs before an agent executes");
/// registry.register("agent.before_execute", AuditHandler, 10);
/// registry.set_active("agent.before_execute", false);
/// ```
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl PipelineRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a pipeline. Redefining keeps existing handlers and the active
    /// flag, updating only the description.
    pub fn define(&self, name: impl Into<String>, description: impl Into<String>) {
        let name = name.into();
        let description = description.into();
        let mut pipelines = self.write();
        match pipelines.get_mut(&name) {
            Some(pipeline) => pipeline.definition.description = description,
            None => {
                debug!(pipeline = %name, "defining pipeline");
                let definition = PipelineDefinition::new(name.clone(), description);
                pipelines.insert(
                    name,
                    Pipeline {
                        definition,
                        handlers: Vec::new(),
                    },
                );
            }
        }
    }

    /// Declare a pipeline that starts inactive.
    pub fn define_inactive(&self, name: impl Into<String>, description: impl Into<String>) {
        let name = name.into();
        self.define(name.clone(), description);
        self.set_active(&name, false);
    }

    /// Register a handler. Higher priorities run first.
    pub fn register<T, H>(&self, name: impl Into<String>, handler: H, priority: i32)
    where
        T: Send + 'static,
        H: PipelineHandler<T> + 'static,
    {
        self.register_shared(name, Arc::new(handler), priority);
    }

    /// Register an already shared handler.
    pub fn register_shared<T: Send + 'static>(
        &self,
        name: impl Into<String>,
        handler: SharedHandler<T>,
        priority: i32,
    ) {
        let name = name.into();
        debug!(
            pipeline = %name,
            handler = handler.label(),
            priority,
            "registering pipeline handler"
        );
        let entry = HandlerEntry::new(handler, priority, Origin::Global, next_sequence());
        self.write()
            .entry(name)
            .or_insert_with_key(|name| Pipeline::implicit(name))
            .handlers
            .push(entry);
    }

    /// Handlers registered on `name` for payload type `T`, in run order.
    #[must_use]
    pub fn handlers<T: Send + 'static>(&self, name: &str) -> Vec<SharedHandler<T>> {
        let mut entries = self.entries(name);
        entries.sort_by_key(HandlerEntry::sort_key);
        entries.iter().filter_map(|e| e.downcast::<T>(name)).collect()
    }

    pub(crate) fn entries(&self, name: &str) -> Vec<HandlerEntry> {
        self.read()
            .get(name)
            .map(|p| p.handlers.clone())
            .unwrap_or_default()
    }

    /// Whether a pipeline with this name is defined.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Number of handlers registered on `name`, across payload types.
    #[must_use]
    pub fn handler_count(&self, name: &str) -> usize {
        self.read().get(name).map_or(0, |p| p.handlers.len())
    }

    /// All definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<PipelineDefinition> {
        let mut defs: Vec<_> = self
            .read()
            .values()
            .map(|p| p.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Definition for `name`, if defined.
    #[must_use]
    pub fn definition(&self, name: &str) -> Option<PipelineDefinition> {
        self.read().get(name).map(|p| p.definition.clone())
    }

    /// Whether `name` is active. Undefined pipelines count as active.
    #[must_use]
    pub fn is_active(&self, name: &str) -> bool {
        self.read().get(name).is_none_or(|p| p.definition.active)
    }

    /// Activate or deactivate a pipeline, defining it if needed.
    pub fn set_active(&self, name: &str, active: bool) {
        debug!(pipeline = name, active, "setting pipeline state");
        self.write()
            .entry(name.to_owned())
            .or_insert_with(|| Pipeline::implicit(name))
            .definition
            .active = active;
    }

    /// Remove every handler from `name`, keeping its definition.
    pub fn clear(&self, name: &str) {
        if let Some(pipeline) = self.write().get_mut(name) {
            pipeline.handlers.clear();
        }
    }

    /// Remove every pipeline and handler.
    pub fn reset(&self) {
        self.write().clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Pipeline>> {
        self.pipelines.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Pipeline>> {
        self.pipelines.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.read().len())
            .finish_non_exhaustive()
    }
}

/// Handlers attached to a single call, merged with the global ones when the
/// call runs its pipelines.
#[derive(Debug, Clone, Default)]
pub struct RuntimeHandlers {
    entries: HashMap<String, Vec<HandlerEntry>>,
}

impl RuntimeHandlers {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a handler to `name` for this call only.
    pub fn register<T, H>(&mut self, name: impl Into<String>, handler: H, priority: i32)
    where
        T: Send + 'static,
        H: PipelineHandler<T> + 'static,
    {
        self.register_shared(name, Arc::new(handler) as SharedHandler<T>, priority);
    }

    /// Attach an already shared handler.
    pub fn register_shared<T: Send + 'static>(
        &mut self,
        name: impl Into<String>,
        handler: SharedHandler<T>,
        priority: i32,
    ) {
        let entry = HandlerEntry::new(handler, priority, Origin::Runtime, next_sequence());
        self.entries.entry(name.into()).or_default().push(entry);
    }

    /// Whether no runtime handlers are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Total number of attached handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub(crate) fn entries(&self, name: &str) -> &[HandlerEntry] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline::handler::{Next, handler_fn};

    fn push(tag: &'static str) -> impl PipelineHandler<Vec<&'static str>> {
        handler_fn(move |mut d: Vec<&'static str>| {
            d.push(tag);
            Ok(d)
        })
    }

    mod definitions {
        use super::*;

        #[test]
        fn define_and_lookup() {
            let registry = PipelineRegistry::new();
            registry.define("agent.before_execute", "before");

            assert!(registry.has("agent.before_execute"));
            let def = registry.definition("agent.before_execute").unwrap();
            assert_eq!(def.description, "before");
            assert!(def.active);
        }

        #[test]
        fn redefine_keeps_handlers_and_state() {
            let registry = PipelineRegistry::new();
            registry.define("p", "first");
            registry.register("p", push("a"), 0);
            registry.set_active("p", false);
            registry.define("p", "second");

            let def = registry.definition("p").unwrap();
            assert_eq!(def.description, "second");
            assert!(!def.active);
            assert_eq!(registry.handler_count("p"), 1);
        }

        #[test]
        fn undefined_pipelines_are_active() {
            let registry = PipelineRegistry::new();
            assert!(registry.is_active("never.defined"));
        }

        #[test]
        fn define_inactive_starts_off() {
            let registry = PipelineRegistry::new();
            registry.define_inactive("p", "");
            assert!(!registry.is_active("p"));
            registry.set_active("p", true);
            assert!(registry.is_active("p"));
        }

        #[test]
        fn definitions_are_sorted() {
            let registry = PipelineRegistry::new();
            registry.define("b", "");
            registry.define("a", "");
            let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
            assert_eq!(names, vec!["a", "b"]);
        }
    }

    mod handlers {
        use super::*;

        #[test]
        fn register_implicitly_defines() {
            let registry = PipelineRegistry::new();
            registry.register("implicit", push("a"), 0);
            assert!(registry.has("implicit"));
            assert!(registry.is_active("implicit"));
        }

        #[tokio::test]
        async fn priority_then_registration_order() {
            let registry = PipelineRegistry::new();
            registry.register("p", push("low"), 1);
            registry.register("p", push("high"), 10);
            registry.register("p", push("low-2"), 1);

            let handlers = registry.handlers::<Vec<&'static str>>("p");
            let order = Next::new(&handlers).run(Vec::new()).await.unwrap();
            assert_eq!(order, ["high", "low", "low-2"]);
        }

        #[test]
        fn mismatched_payload_is_skipped() {
            let registry = PipelineRegistry::new();
            registry.register("p", push("a"), 0);
            registry.register("p", handler_fn(|n: u32| Ok(n + 1)), 0);

            assert_eq!(registry.handler_count("p"), 2);
            assert_eq!(registry.handlers::<u32>("p").len(), 1);
            assert_eq!(registry.handlers::<Vec<&'static str>>("p").len(), 1);
            assert!(registry.handlers::<String>("p").is_empty());
        }

        #[test]
        fn clear_and_reset() {
            let registry = PipelineRegistry::new();
            registry.register("p", push("a"), 0);
            registry.clear("p");
            assert!(registry.has("p"));
            assert_eq!(registry.handler_count("p"), 0);

            registry.reset();
            assert!(!registry.has("p"));
        }
    }

    mod runtime {
        use super::*;

        #[test]
        fn runtime_handlers_collect_entries() {
            let mut runtime = RuntimeHandlers::new();
            assert!(runtime.is_empty());
            runtime.register("p", push("a"), 0);
            runtime.register("q", push("b"), 5);
            assert_eq!(runtime.len(), 2);
            assert_eq!(runtime.entries("p").len(), 1);
            assert!(runtime.entries("missing").is_empty());
        }
    }
}
