//! Session task - serializes every connection's events through one owner

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::coordinator::SessionCoordinator;
use super::envelope::Envelope;
use super::ConnId;

/// Queued commands from all connections
pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;
/// Per-connection outbound queue; overflow is dropped
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle of one connection as seen by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Joined,
    Disconnected,
}

impl ConnectionPhase {
    /// `Connecting -> Joined`; false from any other phase
    pub fn join(&mut self) -> bool {
        if *self == ConnectionPhase::Connecting {
            *self = ConnectionPhase::Joined;
            true
        } else {
            false
        }
    }

    /// Move to the terminal phase. Returns true only when leaving `Joined`,
    /// i.e. when there is session state to tear down.
    pub fn disconnect(&mut self) -> bool {
        let was_joined = *self == ConnectionPhase::Joined;
        *self = ConnectionPhase::Disconnected;
        was_joined
    }
}

/// Work for the session task
#[derive(Debug)]
pub enum SessionCommand {
    Connect {
        conn_id: ConnId,
        outbound: mpsc::Sender<ServerMsg>,
    },
    Inbound {
        conn_id: ConnId,
        msg: ClientMsg,
    },
    Disconnect {
        conn_id: ConnId,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session task is no longer running")]
    Closed,
}

/// Cloneable handle to the running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    player_count: Arc<AtomicUsize>,
}

impl SessionHandle {
    /// Open a connection. The returned receiver yields everything addressed
    /// to it, starting with `currentPlayers`.
    pub async fn connect(&self, conn_id: ConnId) -> Result<mpsc::Receiver<ServerMsg>, SessionError> {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        self.send(SessionCommand::Connect { conn_id, outbound }).await?;
        Ok(outbound_rx)
    }

    pub async fn inbound(&self, conn_id: ConnId, msg: ClientMsg) -> Result<(), SessionError> {
        self.send(SessionCommand::Inbound { conn_id, msg }).await
    }

    pub async fn disconnect(&self, conn_id: ConnId) -> Result<(), SessionError> {
        self.send(SessionCommand::Disconnect { conn_id }).await
    }

    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

struct Connection {
    outbound: mpsc::Sender<ServerMsg>,
    phase: ConnectionPhase,
}

/// Owns the coordinator and every connection's outbound queue
pub struct SessionTask {
    coordinator: SessionCoordinator,
    connections: HashMap<ConnId, Connection>,
    command_rx: mpsc::Receiver<SessionCommand>,
    player_count: Arc<AtomicUsize>,
}

impl SessionTask {
    pub fn new(coordinator: SessionCoordinator) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let player_count = Arc::new(AtomicUsize::new(coordinator.player_count()));

        let handle = SessionHandle {
            command_tx,
            player_count: player_count.clone(),
        };

        let task = Self {
            coordinator,
            connections: HashMap::new(),
            command_rx,
            player_count,
        };

        (task, handle)
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!("Session started");

        while let Some(command) = self.command_rx.recv().await {
            self.apply(command);
        }

        info!(
            player_count = self.coordinator.player_count(),
            "Session closed"
        );
    }

    /// Apply one command to completion, including delivery
    fn apply(&mut self, command: SessionCommand) {
        let out = match command {
            SessionCommand::Connect { conn_id, outbound } => self.handle_connect(conn_id, outbound),
            SessionCommand::Inbound { conn_id, msg } => self.handle_inbound(conn_id, msg),
            SessionCommand::Disconnect { conn_id } => self.handle_disconnect(conn_id),
        };

        self.player_count
            .store(self.coordinator.player_count(), Ordering::Relaxed);
        self.deliver(out);
    }

    fn handle_connect(&mut self, conn_id: ConnId, outbound: mpsc::Sender<ServerMsg>) -> Vec<Envelope> {
        if self.connections.contains_key(&conn_id) {
            warn!(conn_id = %conn_id, "Connection id already open, ignoring");
            return Vec::new();
        }

        let mut connection = Connection {
            outbound,
            phase: ConnectionPhase::Connecting,
        };

        let out = self.coordinator.join(conn_id);
        if self.coordinator.player(&conn_id).is_some() {
            connection.phase.join();
        }

        self.connections.insert(conn_id, connection);
        out
    }

    fn handle_inbound(&mut self, conn_id: ConnId, msg: ClientMsg) -> Vec<Envelope> {
        match self.connections.get(&conn_id) {
            Some(connection) if connection.phase == ConnectionPhase::Joined => {
                self.coordinator.handle(conn_id, msg)
            }
            _ => {
                debug!(conn_id = %conn_id, "Inbound event from connection not joined, discarded");
                Vec::new()
            }
        }
    }

    fn handle_disconnect(&mut self, conn_id: ConnId) -> Vec<Envelope> {
        let Some(mut connection) = self.connections.remove(&conn_id) else {
            return Vec::new();
        };

        if connection.phase.disconnect() {
            self.coordinator.disconnect(conn_id)
        } else {
            Vec::new()
        }
    }

    /// Fire-and-forget delivery. Closed or saturated queues lose the message.
    fn deliver(&self, out: Vec<Envelope>) {
        for envelope in out {
            for (conn_id, connection) in &self.connections {
                if !envelope.to.includes(conn_id) {
                    continue;
                }

                match connection.outbound.try_send(envelope.msg.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(conn_id = %conn_id, "Outbound queue full, dropping message");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(conn_id = %conn_id, "Outbound queue closed, dropping message");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::envelope::Recipients;
    use tokio_test::assert_ok;
    use uuid::Uuid;

    fn spawn_session() -> SessionHandle {
        let (task, handle) = SessionTask::new(SessionCoordinator::with_seed(3));
        tokio::spawn(task.run());
        handle
    }

    /// Round-trip a throwaway connection so every earlier command is known to
    /// be applied. Returns what `observer` received meanwhile, minus the
    /// marker's own join and leave.
    async fn settle(session: &SessionHandle, observer: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let marker = Uuid::new_v4();
        let mut marker_rx = assert_ok!(session.connect(marker).await);
        let _ = marker_rx.recv().await;
        assert_ok!(session.disconnect(marker).await);

        let mut seen = Vec::new();
        loop {
            match observer.recv().await {
                Some(ServerMsg::PlayerDisconnected { id }) if id == marker => return seen,
                Some(ServerMsg::NewPlayer { id, .. }) if id == marker => {}
                Some(msg) => seen.push(msg),
                None => panic!("observer closed"),
            }
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn phases_only_tear_down_joined_connections() {
        let mut phase = ConnectionPhase::Connecting;
        assert!(phase.join());
        assert!(!phase.join());
        assert!(phase.disconnect());
        assert_eq!(phase, ConnectionPhase::Disconnected);
        assert!(!phase.disconnect());
        assert!(!phase.join());

        let mut never_joined = ConnectionPhase::Connecting;
        assert!(!never_joined.disconnect());
    }

    #[test]
    fn recipients_filter() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(Recipients::All.includes(&a));
        assert!(!Recipients::AllExcept(a).includes(&a));
        assert!(Recipients::AllExcept(a).includes(&b));
        assert!(Recipients::Only(b).includes(&b));
        assert!(!Recipients::Only(b).includes(&a));
    }

    #[tokio::test]
    async fn arena_scenario_end_to_end() {
        let session = spawn_session();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let mut a_rx = assert_ok!(session.connect(a).await);
        let mut b_rx = assert_ok!(session.connect(b).await);
        let mut c_rx = assert_ok!(session.connect(c).await);

        match c_rx.recv().await {
            Some(ServerMsg::CurrentPlayers { players }) => {
                assert_eq!(players.len(), 3);
                assert!(players.contains_key(&a) && players.contains_key(&b) && players.contains_key(&c));
            }
            other => panic!("expected currentPlayers, got {other:?}"),
        }

        assert_ok!(
            session
                .inbound(b, ClientMsg::CollisionImpulse { target_id: c, nx: 1.0, nz: 0.0, speed: 5.0 })
                .await
        );
        assert_ok!(session.inbound(c, ClientMsg::PlayerDied { x: 1.0, y: 2.0, z: 3.0 }).await);
        assert_ok!(session.inbound(c, ClientMsg::PlayerRespawned { x: 0.0, y: 0.5, z: 0.0 }).await);

        let a_msgs = settle(&session, &mut a_rx).await;
        assert!(a_msgs.contains(&ServerMsg::PlayerDied { id: c, x: 1.0, y: 2.0, z: 3.0 }));
        assert!(a_msgs.contains(&ServerMsg::StreakUpdate { id: b, streak: 1 }));
        assert!(!a_msgs.contains(&ServerMsg::KillCredit { streak: 1 }));

        let c_msgs = drain(&mut c_rx);
        assert_eq!(
            c_msgs[..5],
            [
                ServerMsg::ApplyImpulse { nx: -1.0, nz: 0.0, speed: 5.0 },
                ServerMsg::PlayerDied { id: c, x: 1.0, y: 2.0, z: 3.0 },
                ServerMsg::StreakUpdate { id: b, streak: 1 },
                ServerMsg::PlayerRespawned { id: c, x: 0.0, y: 0.5, z: 0.0 },
                ServerMsg::StreakUpdate { id: c, streak: 0 },
            ]
        );

        let b_msgs = drain(&mut b_rx);
        assert!(b_msgs.contains(&ServerMsg::KillCredit { streak: 1 }));
        assert!(!b_msgs.iter().any(|m| matches!(m, ServerMsg::ApplyImpulse { .. })));

        assert_eq!(session.player_count(), 3);
    }

    #[tokio::test]
    async fn move_is_not_echoed_to_sender() {
        let session = spawn_session();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut a_rx = assert_ok!(session.connect(a).await);
        let mut b_rx = assert_ok!(session.connect(b).await);

        assert_ok!(session.inbound(a, ClientMsg::Move { x: 3.0, y: 0.5, z: 1.0 }).await);
        let b_msgs = settle(&session, &mut b_rx).await;

        assert!(b_msgs.contains(&ServerMsg::PlayerMoved { id: a, x: 3.0, y: 0.5, z: 1.0 }));
        assert!(!drain(&mut a_rx)
            .iter()
            .any(|m| matches!(m, ServerMsg::PlayerMoved { .. })));
    }

    #[tokio::test]
    async fn disconnect_broadcasts_exactly_once() {
        let session = spawn_session();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut a_rx = assert_ok!(session.connect(a).await);
        let _b_rx = assert_ok!(session.connect(b).await);

        assert_ok!(session.disconnect(b).await);
        assert_ok!(session.disconnect(b).await);
        let a_msgs = settle(&session, &mut a_rx).await;

        let notices = a_msgs
            .iter()
            .filter(|m| **m == ServerMsg::PlayerDisconnected { id: b })
            .count();
        assert_eq!(notices, 1);
        assert_eq!(session.player_count(), 1);
    }

    #[tokio::test]
    async fn events_after_disconnect_are_discarded() {
        let session = spawn_session();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut a_rx = assert_ok!(session.connect(a).await);
        let _b_rx = assert_ok!(session.connect(b).await);

        assert_ok!(session.disconnect(b).await);
        assert_ok!(session.inbound(b, ClientMsg::Move { x: 1.0, y: 1.0, z: 1.0 }).await);
        let a_msgs = settle(&session, &mut a_rx).await;

        assert!(!a_msgs.iter().any(|m| matches!(m, ServerMsg::PlayerMoved { .. })));
        assert_eq!(session.player_count(), 1);
    }

    #[tokio::test]
    async fn closed_receiver_does_not_block_others() {
        let session = spawn_session();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut a_rx = assert_ok!(session.connect(a).await);
        let b_rx = assert_ok!(session.connect(b).await);
        drop(b_rx);

        assert_ok!(session.inbound(b, ClientMsg::Move { x: 2.0, y: 0.5, z: 2.0 }).await);
        assert_ok!(session.inbound(a, ClientMsg::Move { x: 4.0, y: 0.5, z: 4.0 }).await);
        let a_msgs = settle(&session, &mut a_rx).await;

        assert!(a_msgs.contains(&ServerMsg::PlayerMoved { id: b, x: 2.0, y: 0.5, z: 2.0 }));
    }
}
