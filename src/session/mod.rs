//! Arena session state: player registry, relays and kill attribution

pub mod attribution;
pub mod coordinator;
pub mod envelope;
pub mod registry;
pub mod streaks;
pub mod task;

pub use coordinator::SessionCoordinator;
pub use task::{SessionHandle, SessionTask};

use uuid::Uuid;

/// Transport-assigned identifier of one live connection
pub type ConnId = Uuid;

/// Client-reported world position
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Where every player starts after joining
pub const SPAWN_POSITION: Vec3 = Vec3::new(0.0, 0.5, 0.0);
