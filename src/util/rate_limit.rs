//! Rate limiting for inbound WebSocket events
//!
//! Only `move` is throttled. Positions supersede each other, so a dropped one
//! is corrected by the next; every other event changes session state and is
//! always admitted.

use std::num::NonZeroU32;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};

use crate::ws::protocol::ClientMsg;

/// Sustained `move` events per second per connection. Movement is sent
/// every rendered frame, so this sits above common refresh rates.
pub const INBOUND_EVENTS_PER_SECOND: u32 = 120;

/// Short bursts allowed on top of the sustained rate
pub const INBOUND_BURST: u32 = 240;

/// Per-connection inbound limiter
pub struct InboundRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl InboundRateLimiter {
    pub fn new(per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }

    /// True if `msg` should reach the session
    pub fn admit(&self, msg: &ClientMsg) -> bool {
        match msg {
            ClientMsg::Move { .. } => self.limiter.check().is_ok(),
            ClientMsg::CollisionImpulse { .. }
            | ClientMsg::PlayerDied { .. }
            | ClientMsg::PlayerRespawned { .. } => true,
        }
    }
}

impl Default for InboundRateLimiter {
    fn default() -> Self {
        Self::new(INBOUND_EVENTS_PER_SECOND, INBOUND_BURST)
    }
}
