//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashMap;
use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// 24-bit RGB color, encoded on the wire as `#rrggbb`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(u32);

impl Color {
    pub const MAX: u32 = 0xFF_FFFF;

    /// Build a color from a packed RGB value, ignoring anything above 24 bits
    pub fn from_rgb(rgb: u32) -> Self {
        Self(rgb & Self::MAX)
    }

    #[cfg(test)]
    pub fn rgb(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let hex = raw
            .strip_prefix('#')
            .filter(|h| h.len() == 6 && h.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| de::Error::custom(format!("expected #rrggbb, got {raw:?}")))?;
        u32::from_str_radix(hex, 16)
            .map(Self)
            .map_err(de::Error::custom)
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Client-reported position of the sender
    Move { x: f64, y: f64, z: f64 },

    /// The sender's body collided with `target_id`
    CollisionImpulse {
        #[serde(rename = "targetId")]
        target_id: Uuid,
        /// Contact normal X, in the sender's frame
        nx: f64,
        /// Contact normal Z, in the sender's frame
        nz: f64,
        speed: f64,
    },

    /// The sender died at the given position
    PlayerDied { x: f64, y: f64, z: f64 },

    /// The sender respawned at the given position
    PlayerRespawned { x: f64, y: f64, z: f64 },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Everyone in the session at join time, the joiner included
    CurrentPlayers {
        players: HashMap<Uuid, PlayerView>,
    },

    /// Another connection joined
    NewPlayer {
        id: Uuid,
        x: f64,
        y: f64,
        z: f64,
        color: Color,
    },

    PlayerMoved {
        id: Uuid,
        x: f64,
        y: f64,
        z: f64,
    },

    /// Force to apply locally, normal already pointing away from the collider
    ApplyImpulse { nx: f64, nz: f64, speed: f64 },

    PlayerDied {
        id: Uuid,
        x: f64,
        y: f64,
        z: f64,
    },

    /// Private: the recipient was credited with a kill
    KillCredit { streak: u32 },

    StreakUpdate { id: Uuid, streak: u32 },

    PlayerRespawned {
        id: Uuid,
        x: f64,
        y: f64,
        z: f64,
    },

    PlayerDisconnected { id: Uuid },
}

/// Per-player entry of the `currentPlayers` snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Color,
}
