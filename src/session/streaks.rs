//! Streak ledger - kills since last death or connect

use std::collections::HashMap;

use super::ConnId;

/// Per-connection kill streaks. A connection has an entry exactly while it is
/// joined.
#[derive(Debug, Default)]
pub struct StreakLedger {
    streaks: HashMap<ConnId, u32>,
}

impl StreakLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a connection at zero
    pub fn open(&mut self, id: ConnId) {
        self.streaks.entry(id).or_insert(0);
    }

    /// Add a kill, returning the new streak. `None` if `id` is not tracked.
    pub fn credit_kill(&mut self, id: &ConnId) -> Option<u32> {
        self.streaks.get_mut(id).map(|streak| {
            *streak = streak.saturating_add(1);
            *streak
        })
    }

    /// Zero a streak; false if `id` is not tracked
    pub fn reset(&mut self, id: &ConnId) -> bool {
        match self.streaks.get_mut(id) {
            Some(streak) => {
                *streak = 0;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &ConnId) -> Option<u32> {
        self.streaks.remove(id)
    }

    #[cfg(test)]
    pub fn get(&self, id: &ConnId) -> Option<u32> {
        self.streaks.get(id).copied()
    }

    #[cfg(test)]
    pub fn contains(&self, id: &ConnId) -> bool {
        self.streaks.contains_key(id)
    }
}
