//! Outbound addressing

use crate::ws::protocol::ServerMsg;

use super::ConnId;

/// Who an outbound message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Every open connection
    All,
    /// Every open connection but one, usually the sender
    AllExcept(ConnId),
    /// A single connection; dropped if it is gone
    Only(ConnId),
}

impl Recipients {
    pub fn includes(&self, id: &ConnId) -> bool {
        match self {
            Recipients::All => true,
            Recipients::AllExcept(excluded) => excluded != id,
            Recipients::Only(target) => target == id,
        }
    }
}

/// A server message with its addressing
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipients,
    pub msg: ServerMsg,
}

impl Envelope {
    pub fn all(msg: ServerMsg) -> Self {
        Self { to: Recipients::All, msg }
    }

    pub fn all_except(id: ConnId, msg: ServerMsg) -> Self {
        Self { to: Recipients::AllExcept(id), msg }
    }

    pub fn only(id: ConnId, msg: ServerMsg) -> Self {
        Self { to: Recipients::Only(id), msg }
    }
}
