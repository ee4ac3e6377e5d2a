use std::sync::Arc;

use serde::Serialize;

use super::{AgentHandle, AgentId, AgentRole};

#[derive(Debug, Clone, Serialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub name: String,
    pub role: AgentRole,
    pub available: bool,
}

/// Agent handles in registration order.
///
/// Order matters: fallback walks agents in the order they were registered.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn AgentHandle>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Re-registering an id replaces the handle in place.
    pub fn register(&mut self, agent: Arc<dyn AgentHandle>) {
        match self.agents.iter().position(|a| a.id() == agent.id()) {
            Some(idx) => self.agents[idx] = agent,
            None => self.agents.push(agent),
        }
    }

    pub fn get(&self, id: &AgentId) -> Option<Arc<dyn AgentHandle>> {
        self.agents.iter().find(|a| a.id() == id).cloned()
    }

    /// First registered agent with `role`.
    pub fn first_with_role(&self, role: AgentRole) -> Option<Arc<dyn AgentHandle>> {
        self.agents.iter().find(|a| a.role() == role).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AgentHandle>> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Probe every agent, in registration order.
    pub async fn list(&self) -> Vec<AgentInfo> {
        let mut list = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            list.push(AgentInfo {
                id: agent.id().clone(),
                name: agent.name().to_string(),
                role: agent.role(),
                available: agent.available().await,
            });
        }
        list
    }
}
