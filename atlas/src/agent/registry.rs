//! Agents keyed by their registry key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Error, Result};

use super::definition::{AgentDefinition, SharedAgent};

/// Registry of agent definitions.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, SharedAgent>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAgent`] if the key is taken.
    pub fn register<A: AgentDefinition + 'static>(&self, agent: A) -> Result<()> {
        self.register_shared(Arc::new(agent))
    }

    /// Register an already shared agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAgent`] if the key is taken.
    pub fn register_shared(&self, agent: SharedAgent) -> Result<()> {
        let key = agent.key();
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.contains_key(&key) {
            return Err(Error::DuplicateAgent(key));
        }
        debug!(agent = %key, "registering agent");
        agents.insert(key, agent);
        Ok(())
    }

    /// Register an agent, replacing any agent with the same key.
    pub fn register_or_replace(&self, agent: SharedAgent) {
        let key = agent.key();
        debug!(agent = %key, "registering agent (replace)");
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, agent);
    }

    /// Look up an agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AgentNotFound`] for unknown keys.
    pub fn get(&self, key: &str) -> Result<SharedAgent> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::AgentNotFound(key.to_owned()))
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Registered keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// All agents, sorted by key.
    #[must_use]
    pub fn all(&self) -> Vec<SharedAgent> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<(&String, &SharedAgent)> = agents.iter().collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all.into_iter().map(|(_, agent)| Arc::clone(agent)).collect()
    }

    /// Remove an agent. Returns whether it was present.
    pub fn unregister(&self, key: &str) -> bool {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.keys())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::Agent;

    struct ResearchAgent;
    impl AgentDefinition for ResearchAgent {}

    #[test]
    fn registers_by_derived_key() {
        let registry = AgentRegistry::new();
        registry.register(ResearchAgent).unwrap();
        assert!(registry.has("research"));
        assert_eq!(registry.get("research").unwrap().name(), "Research");
    }

    #[test]
    fn duplicate_key_is_an_error() {
        let registry = AgentRegistry::new();
        registry.register(Agent::new("a")).unwrap();
        let err = registry.register(Agent::new("a")).unwrap_err();
        assert!(matches!(err, Error::DuplicateAgent(ref k) if k == "a"));
    }

    #[test]
    fn replace_and_unregister() {
        let registry = AgentRegistry::new();
        registry.register(Agent::new("a").model("one")).unwrap();
        registry.register_or_replace(Arc::new(Agent::new("a").model("two")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().model(), Some("two"));

        assert!(registry.unregister("a"));
        assert!(registry.is_empty());
        assert!(matches!(registry.get("a"), Err(Error::AgentNotFound(_))));
    }

    #[test]
    fn listing_is_sorted() {
        let registry = AgentRegistry::new();
        registry.register(Agent::new("zeta")).unwrap();
        registry.register(Agent::new("alpha")).unwrap();
        assert_eq!(registry.keys(), vec!["alpha", "zeta"]);
        let all: Vec<String> = registry.all().iter().map(|a| a.key()).collect();
        assert_eq!(all, vec!["alpha", "zeta"]);
    }
}
