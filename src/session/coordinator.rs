//! Session coordinator - owns all session state and applies inbound events
//!
//! Every handler is synchronous and runs to completion, returning the
//! messages it produced. The caller delivers them afterwards, so no handler
//! ever observes a half-applied event.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::attribution::AttributionTable;
use super::envelope::Envelope;
use super::registry::{random_color, Player, PlayerRegistry};
use super::streaks::StreakLedger;
use super::{ConnId, Vec3};

pub struct SessionCoordinator {
    registry: PlayerRegistry,
    attribution: AttributionTable,
    streaks: StreakLedger,
    rng: ChaCha8Rng,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Coordinator with deterministic player colors
    #[cfg(test)]
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            attribution: AttributionTable::new(),
            streaks: StreakLedger::new(),
            rng,
        }
    }

    pub fn player(&self, id: &ConnId) -> Option<&Player> {
        self.registry.get(id)
    }

    pub fn player_count(&self) -> usize {
        self.registry.len()
    }

    #[cfg(test)]
    pub fn streak(&self, id: &ConnId) -> Option<u32> {
        self.streaks.get(id)
    }

    #[cfg(test)]
    pub fn attacker_of(&self, victim: &ConnId) -> Option<ConnId> {
        self.attribution.attacker_of(victim)
    }

    /// Register a new connection. The joiner gets the full roster (itself
    /// included), everyone else a `newPlayer`.
    pub fn join(&mut self, id: ConnId) -> Vec<Envelope> {
        let color = random_color(&mut self.rng);
        let Some(player) = self.registry.join(id, color) else {
            warn!(conn_id = %id, "Duplicate join ignored");
            return Vec::new();
        };

        let new_player = ServerMsg::NewPlayer {
            id,
            x: player.position.x,
            y: player.position.y,
            z: player.position.z,
            color: player.color,
        };
        self.streaks.open(id);

        info!(
            conn_id = %id,
            color = %color,
            player_count = self.registry.len(),
            "Player joined"
        );

        vec![
            Envelope::only(id, ServerMsg::CurrentPlayers { players: self.registry.snapshot() }),
            Envelope::all_except(id, new_player),
        ]
    }

    /// Route one inbound client event
    pub fn handle(&mut self, sender: ConnId, msg: ClientMsg) -> Vec<Envelope> {
        match msg {
            ClientMsg::Move { x, y, z } => self.move_player(sender, Vec3::new(x, y, z)),
            ClientMsg::CollisionImpulse { target_id, nx, nz, speed } => {
                self.relay_impulse(sender, target_id, nx, nz, speed)
            }
            ClientMsg::PlayerDied { x, y, z } => self.player_died(sender, Vec3::new(x, y, z)),
            ClientMsg::PlayerRespawned { x, y, z } => {
                self.player_respawned(sender, Vec3::new(x, y, z))
            }
        }
    }

    pub fn move_player(&mut self, id: ConnId, position: Vec3) -> Vec<Envelope> {
        if !self.registry.set_position(&id, position) {
            debug!(conn_id = %id, "Move from unregistered connection discarded");
            return Vec::new();
        }

        vec![Envelope::all_except(
            id,
            ServerMsg::PlayerMoved { id, x: position.x, y: position.y, z: position.z },
        )]
    }

    /// Forward a collision to its target with the contact normal flipped, and
    /// remember the attacker if the target is still around.
    pub fn relay_impulse(
        &mut self,
        attacker: ConnId,
        target: ConnId,
        nx: f64,
        nz: f64,
        speed: f64,
    ) -> Vec<Envelope> {
        if !self.registry.contains(&attacker) {
            debug!(conn_id = %attacker, "Impulse from unregistered connection discarded");
            return Vec::new();
        }

        if self.registry.contains(&target) {
            if let Some(previous) = self.attribution.record_hit(target, attacker) {
                debug!(victim = %target, attacker = %attacker, previous = %previous, "Attribution replaced");
            }
        }

        vec![Envelope::only(
            target,
            ServerMsg::ApplyImpulse { nx: -nx, nz: -nz, speed },
        )]
    }

    /// Announce a death and credit whoever landed the last hit
    pub fn player_died(&mut self, victim: ConnId, position: Vec3) -> Vec<Envelope> {
        if !self.registry.contains(&victim) {
            debug!(conn_id = %victim, "Death from unregistered connection discarded");
            return Vec::new();
        }

        let mut out = vec![Envelope::all(ServerMsg::PlayerDied {
            id: victim,
            x: position.x,
            y: position.y,
            z: position.z,
        })];

        match self.attribution.take(&victim) {
            Some(attacker) => match self.streaks.credit_kill(&attacker) {
                Some(streak) => {
                    info!(victim = %victim, attacker = %attacker, streak, "Kill credited");
                    out.push(Envelope::only(attacker, ServerMsg::KillCredit { streak }));
                    out.push(Envelope::all(ServerMsg::StreakUpdate { id: attacker, streak }));
                }
                None => {
                    debug!(victim = %victim, attacker = %attacker, "Attacker gone, no credit");
                }
            },
            None => debug!(victim = %victim, "Death without attribution"),
        }

        out
    }

    pub fn player_respawned(&mut self, id: ConnId, position: Vec3) -> Vec<Envelope> {
        if !self.registry.set_position(&id, position) {
            debug!(conn_id = %id, "Respawn from unregistered connection discarded");
            return Vec::new();
        }
        self.streaks.reset(&id);

        vec![
            Envelope::all(ServerMsg::PlayerRespawned {
                id,
                x: position.x,
                y: position.y,
                z: position.z,
            }),
            Envelope::all(ServerMsg::StreakUpdate { id, streak: 0 }),
        ]
    }

    /// Tear down everything a connection owns. Pending hits it landed are
    /// forfeited along with hits landed on it.
    pub fn disconnect(&mut self, id: ConnId) -> Vec<Envelope> {
        if self.registry.leave(&id).is_none() {
            debug!(conn_id = %id, "Disconnect for unregistered connection ignored");
            return Vec::new();
        }
        self.streaks.remove(&id);
        let forgotten = self.attribution.forget(&id);

        info!(
            conn_id = %id,
            attributions_cleared = forgotten,
            player_count = self.registry.len(),
            "Player disconnected"
        );

        vec![Envelope::all_except(id, ServerMsg::PlayerDisconnected { id })]
    }
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
