//! Connection registry - live connection id to player record

use std::collections::HashMap;

use rand::Rng;

use crate::ws::protocol::{Color, PlayerView};

use super::{ConnId, Vec3, SPAWN_POSITION};

/// One joined connection.
///
/// The kill streak is not stored here; it lives in the
/// [`StreakLedger`](super::streaks::StreakLedger) so that crediting can tell a
/// departed attacker apart from one sitting at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: ConnId,
    pub position: Vec3,
    pub color: Color,
}

impl Player {
    pub fn new(id: ConnId, color: Color) -> Self {
        Self {
            id,
            position: SPAWN_POSITION,
            color,
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            x: self.position.x,
            y: self.position.y,
            z: self.position.z,
            color: self.color,
        }
    }
}

/// Pick a color uniformly from the 24-bit RGB space
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Color {
    Color::from_rgb(rng.gen_range(0..=Color::MAX))
}

/// Registry of joined players
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<ConnId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh player. Returns `None` and leaves the existing record
    /// untouched if `id` already joined.
    pub fn join(&mut self, id: ConnId, color: Color) -> Option<&Player> {
        if self.players.contains_key(&id) {
            return None;
        }
        Some(self.players.entry(id).or_insert_with(|| Player::new(id, color)))
    }

    pub fn leave(&mut self, id: &ConnId) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &ConnId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &ConnId) -> bool {
        self.players.contains_key(id)
    }

    /// Overwrite a player's position; false if `id` is not registered
    pub fn set_position(&mut self, id: &ConnId, position: Vec3) -> bool {
        match self.players.get_mut(id) {
            Some(player) => {
                player.position = position;
                true
            }
            None => false,
        }
    }

    /// Wire snapshot of every registered player
    pub fn snapshot(&self) -> HashMap<ConnId, PlayerView> {
        self.players
            .iter()
            .map(|(id, player)| (*id, player.view()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
