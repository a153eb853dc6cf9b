//! Kill attribution - who most recently hit whom

use std::collections::HashMap;

use super::ConnId;

/// Victim to last attacker. Last hit wins; there is no time window.
#[derive(Debug, Default)]
pub struct AttributionTable {
    last_hit: HashMap<ConnId, ConnId>,
}

impl AttributionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a landed hit, returning the attacker it displaced
    pub fn record_hit(&mut self, victim: ConnId, attacker: ConnId) -> Option<ConnId> {
        self.last_hit.insert(victim, attacker)
    }

    #[cfg(test)]
    pub fn attacker_of(&self, victim: &ConnId) -> Option<ConnId> {
        self.last_hit.get(victim).copied()
    }

    /// Consume the attribution for a death
    pub fn take(&mut self, victim: &ConnId) -> Option<ConnId> {
        self.last_hit.remove(victim)
    }

    /// Drop every entry naming `id` as victim or attacker. Returns how many
    /// entries were removed.
    pub fn forget(&mut self, id: &ConnId) -> usize {
        let before = self.last_hit.len();
        self.last_hit
            .retain(|victim, attacker| victim != id && attacker != id);
        before - self.last_hit.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.last_hit.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.last_hit.is_empty()
    }
}
