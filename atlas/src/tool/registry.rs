//! Named tool registry shared across agents.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::ToolError;

use super::ToolDefinition;
use super::traits::{DynTool, SharedTool, Tool};

/// Registry of tools keyed by name.
///
/// Agents list tool names; the executor resolves them here at call time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, SharedTool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Duplicate`] if the name is taken.
    pub fn register<T: Tool + 'static>(&self, tool: T) -> Result<(), ToolError>
    where
        T::Output: 'static,
    {
        self.register_shared(Arc::new(tool))
    }

    /// Register an already shared tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Duplicate`] if the name is taken.
    pub fn register_shared(&self, tool: SharedTool) -> Result<(), ToolError> {
        let name = tool.name().to_owned();
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        debug!(tool = %name, "registering tool");
        tools.insert(name, tool);
        Ok(())
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register_or_replace(&self, tool: SharedTool) {
        let name = tool.name().to_owned();
        debug!(tool = %name, "registering tool (replace)");
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, tool);
    }

    /// Get a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] if no tool has that name.
    pub fn get(&self, name: &str) -> Result<SharedTool, ToolError> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::not_found(name))
    }

    /// Check if a tool with the given name is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// All tools, sorted by name.
    #[must_use]
    pub fn all(&self) -> Vec<SharedTool> {
        let mut tools: Vec<SharedTool> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// The named tools, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotFound`] for the first unknown name.
    pub fn only<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<SharedTool>, ToolError> {
        names.iter().map(|name| self.get(name.as_ref())).collect()
    }

    /// Names of all tools, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Definitions of all tools, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.all().iter().map(|t| t.definition()).collect()
    }

    /// Remove a tool. Returns whether it was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Get the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
