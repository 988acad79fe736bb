//! In-memory policy store

use parking_lot::RwLock;
use pluvia_core::{Error, Policy, PolicyDraft, PolicyId, Result};
use std::collections::BTreeMap;

use crate::traits::{next_policy_id, PolicyStore, TriggerCommit};

/// Policy store held entirely in memory.
///
/// Same semantics as the file-backed store; every mutation runs under one
/// write lock.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    live: BTreeMap<PolicyId, Policy>,
    archived: BTreeMap<PolicyId, Policy>,
    monitored: Vec<PolicyId>,
}

impl MemoryPolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a live record as-is, bypassing registration
    pub fn insert(&self, policy: Policy, monitored: bool) {
        let mut state = self.state.write();
        let id = policy.id;
        state.live.insert(id, policy);
        if monitored && !state.monitored.contains(&id) {
            state.monitored.push(id);
        }
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn list_monitored(&self) -> Result<Vec<Policy>> {
        let state = self.state.read();
        Ok(state
            .monitored
            .iter()
            .filter_map(|id| state.live.get(id).cloned())
            .collect())
    }

    fn list_live(&self) -> Result<Vec<Policy>> {
        Ok(self.state.read().live.values().cloned().collect())
    }

    fn list_archived(&self) -> Result<Vec<Policy>> {
        Ok(self.state.read().archived.values().cloned().collect())
    }

    fn load(&self, id: PolicyId) -> Result<Policy> {
        let state = self.state.read();
        state
            .live
            .get(&id)
            .or_else(|| state.archived.get(&id))
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    fn commit_trigger(&self, commit: &TriggerCommit) -> Result<Policy> {
        let mut state = self.state.write();
        if !state.live.contains_key(&commit.policy_id)
            && state.archived.contains_key(&commit.policy_id)
        {
            return Err(Error::conflict(commit.policy_id, "policy was archived"));
        }
        let policy = state
            .live
            .get_mut(&commit.policy_id)
            .ok_or(Error::NotFound(commit.policy_id))?;

        commit.validate(policy)?;
        commit.apply(policy);
        Ok(policy.clone())
    }

    fn register(&self, draft: PolicyDraft) -> Result<PolicyId> {
        draft.validate()?;

        let mut state = self.state.write();
        let id = next_policy_id(state.live.keys().chain(state.archived.keys()).copied());
        state.live.insert(id, Policy::from_draft(id, draft));
        state.monitored.push(id);
        Ok(id)
    }

    fn deactivate(&self, id: PolicyId) -> Result<Policy> {
        let mut state = self.state.write();
        let mut policy = state.live.remove(&id).ok_or(Error::NotFound(id))?;

        policy.active = false;
        state.monitored.retain(|m| *m != id);
        state.archived.insert(id, policy.clone());
        Ok(policy)
    }

    fn restore(&self, id: PolicyId) -> Result<Policy> {
        let mut state = self.state.write();
        if state.live.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }
        let mut policy = state.archived.remove(&id).ok_or(Error::NotFound(id))?;

        policy.active = true;
        state.live.insert(id, policy.clone());
        if !state.monitored.contains(&id) {
            state.monitored.push(id);
        }
        Ok(policy)
    }

    fn set_monitored(&self, id: PolicyId, monitored: bool) -> Result<()> {
        let mut state = self.state.write();
        if !state.live.contains_key(&id) {
            return Err(Error::NotFound(id));
        }
        if monitored {
            if !state.monitored.contains(&id) {
                state.monitored.push(id);
            }
        } else {
            state.monitored.retain(|m| *m != id);
        }
        Ok(())
    }
}
