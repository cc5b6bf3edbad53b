//! Per-identity allow/block rules
//!
//! Default allow: only explicitly blocked identities are stored.

use parking_lot::RwLock;
use std::collections::HashMap;

/// Caller-owned rule store consulted for the block decision
pub trait RuleStore: Send + Sync {
    /// Is traffic for `identity` allowed? Unknown and empty identities are.
    fn is_allowed(&self, identity: &str) -> bool;
}

/// In-memory rule store
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, bool>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow removes any rule, block stores one. Empty identities are ignored.
    pub fn set_rule(&self, identity: &str, allow: bool) {
        if identity.is_empty() {
            return;
        }

        let mut rules = self.rules.write();
        if allow {
            rules.remove(identity);
        } else {
            rules.insert(identity.to_string(), false);
        }
    }

    pub fn clear_all(&self) {
        self.rules.write().clear();
    }

    /// Number of stored rules
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

impl RuleStore for InMemoryRuleStore {
    fn is_allowed(&self, identity: &str) -> bool {
        if identity.is_empty() {
            return true;
        }
        self.rules.read().get(identity).copied().unwrap_or(true)
    }
}
