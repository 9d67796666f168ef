//! Live collaboration
//!
//! A [`Synchronizer`] performs the login handshake on a [`Connection`] and is
//! then turned into a background task. The editing session talks to that
//! task through a [`SyncHandle`]: local deltas and id/invite requests go in,
//! remote deltas and transport failures come out as [`SyncNotice`]s.
//!
//! ```text
//!  CaseSession ──Command──▶ sync task ──packets──▶ server
//!              ◀─SyncNotice─          ◀──────────
//! ```

pub mod authority;
mod delta;
pub mod protocol;
pub mod transport;

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::error::TransportError;
use crate::event::Delta;

pub use authority::{connect_local, serve_connection, CollabHub, HubStats};
pub use protocol::{ClientPacket, ServerPacket};
pub use transport::{bridge, connect, Connection};

/// Something the session must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// Change made by another collaborator
    Remote(Delta),
    /// Non-fatal error reported by the server
    Error(String),
    ConnectionLost,
}

enum Command {
    Push(Delta),
    NewId(oneshot::Sender<Result<u64, TransportError>>),
    Invite(String, oneshot::Sender<Result<String, TransportError>>),
}

/// Request awaiting its reply, answered in FIFO order.
enum Pending {
    Id(oneshot::Sender<Result<u64, TransportError>>),
    Invite(oneshot::Sender<Result<String, TransportError>>),
}

impl Pending {
    fn fail(self, err: TransportError) {
        match self {
            Pending::Id(reply) => {
                let _ = reply.send(Err(err));
            }
            Pending::Invite(reply) => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Client side of the collaboration handshake.
pub struct Synchronizer {
    conn: Connection,
    timeout: Duration,
}

impl Synchronizer {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            timeout: Duration::from_secs(30),
        }
    }

    /// Time to wait for each handshake reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn request(&mut self, packet: ClientPacket) -> Result<ServerPacket, TransportError> {
        self.conn.send(packet.encode())?;
        let data = tokio::time::timeout(self.timeout, self.conn.recv())
            .await
            .map_err(|_| TransportError::Protocol("timed out waiting for server".to_string()))?
            .ok_or(TransportError::ConnectionLost)?;
        match ServerPacket::decode(&data)? {
            ServerPacket::Error(message) => Err(TransportError::Remote(message)),
            packet => Ok(packet),
        }
    }

    /// Hand a case snapshot over to the server. Returns the author's
    /// credentials.
    pub async fn create(&mut self, snapshot: Vec<u8>, userid: &str) -> Result<String, TransportError> {
        let packet = ClientPacket::Create {
            snapshot,
            userid: userid.to_string(),
        };
        match self.request(packet).await? {
            ServerPacket::Created { credentials } => Ok(credentials),
            other => Err(unexpected(&other)),
        }
    }

    /// Log in to a shared case. Returns the full case snapshot.
    pub async fn login(
        &mut self,
        caseid: u64,
        userid: &str,
        credentials: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let packet = ClientPacket::Login {
            caseid,
            userid: userid.to_string(),
            credentials: credentials.to_string(),
        };
        match self.request(packet).await? {
            ServerPacket::Snapshot(snapshot) => {
                tracing::info!(caseid, userid, "Logged in to collaboration");
                Ok(snapshot)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Redeem an invitation. Returns the participant's credentials.
    pub async fn join(
        &mut self,
        caseid: u64,
        participant: &str,
        key: &str,
    ) -> Result<String, TransportError> {
        let packet = ClientPacket::Join {
            caseid,
            participant: participant.to_string(),
            key: key.to_string(),
        };
        match self.request(packet).await? {
            ServerPacket::Joined { credentials } => Ok(credentials),
            other => Err(unexpected(&other)),
        }
    }

    /// Start the background task. Must be called after a successful login.
    pub fn spawn(self) -> SyncHandle {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (notice_tx, notices) = mpsc::unbounded_channel();
        tokio::spawn(run(self.conn, command_rx, notice_tx));
        SyncHandle { commands, notices }
    }
}

fn unexpected(packet: &ServerPacket) -> TransportError {
    TransportError::Protocol(format!("unexpected reply {:?}", packet))
}

async fn run(
    mut conn: Connection,
    mut commands: mpsc::UnboundedReceiver<Command>,
    notices: mpsc::UnboundedSender<SyncNotice>,
) {
    let mut pending: VecDeque<Pending> = VecDeque::new();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!("Collaboration session closed");
                    break;
                };
                let (packet, waiting) = match command {
                    Command::Push(delta) => (ClientPacket::Update(delta), None),
                    Command::NewId(reply) => (ClientPacket::NewId, Some(Pending::Id(reply))),
                    Command::Invite(participant, reply) => {
                        (ClientPacket::Invite { participant }, Some(Pending::Invite(reply)))
                    }
                };
                if let Err(e) = conn.send(packet.encode()) {
                    if let Some(waiting) = waiting {
                        waiting.fail(e);
                    }
                    let _ = notices.send(SyncNotice::ConnectionLost);
                    break;
                }
                pending.extend(waiting);
            }
            data = conn.recv() => {
                let Some(data) = data else {
                    tracing::warn!("Lost connection to collaboration server");
                    let _ = notices.send(SyncNotice::ConnectionLost);
                    break;
                };
                match ServerPacket::decode(&data) {
                    Ok(ServerPacket::Update(delta)) => {
                        let _ = notices.send(SyncNotice::Remote(delta));
                    }
                    Ok(ServerPacket::NewId(id)) => match pending.pop_front() {
                        Some(Pending::Id(reply)) => {
                            let _ = reply.send(Ok(id));
                        }
                        Some(other) => other.fail(TransportError::Protocol("id reply out of order".to_string())),
                        None => tracing::warn!("Unsolicited id {}", id),
                    },
                    Ok(ServerPacket::Invited { key }) => match pending.pop_front() {
                        Some(Pending::Invite(reply)) => {
                            let _ = reply.send(Ok(key));
                        }
                        Some(other) => other.fail(TransportError::Protocol("invite reply out of order".to_string())),
                        None => tracing::warn!("Unsolicited invite key"),
                    },
                    Ok(ServerPacket::Error(message)) => match pending.pop_front() {
                        Some(waiting) => waiting.fail(TransportError::Remote(message)),
                        None => {
                            tracing::warn!("Collaboration server error: {}", message);
                            let _ = notices.send(SyncNotice::Error(message));
                        }
                    },
                    Ok(other) => tracing::warn!("Unexpected packet {:?}", other),
                    Err(e) => {
                        tracing::warn!("Invalid packet from server: {}", e);
                        let _ = notices.send(SyncNotice::Error(e.to_string()));
                    }
                }
            }
        }
    }

    for waiting in pending {
        waiting.fail(TransportError::ConnectionLost);
    }
}

/// Session-side handle to a running synchronizer.
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    notices: mpsc::UnboundedReceiver<SyncNotice>,
}

impl SyncHandle {
    /// Forward a local change.
    pub fn push(&self, delta: Delta) -> Result<(), TransportError> {
        self.commands
            .send(Command::Push(delta))
            .map_err(|_| TransportError::ConnectionLost)
    }

    /// Ask the server for the next topic id.
    pub async fn next_id(&self) -> Result<u64, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::NewId(tx))
            .map_err(|_| TransportError::ConnectionLost)?;
        rx.await.map_err(|_| TransportError::ConnectionLost)?
    }

    /// Create an invitation key for `participant`.
    pub async fn invite(&self, participant: &str) -> Result<String, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Invite(participant.to_string(), tx))
            .map_err(|_| TransportError::ConnectionLost)?;
        rx.await.map_err(|_| TransportError::ConnectionLost)?
    }

    /// Next notice if one is ready.
    pub fn try_notice(&mut self) -> Option<SyncNotice> {
        self.notices.try_recv().ok()
    }

    /// Wait for the next notice. `None` once the task has stopped.
    pub async fn notice(&mut self) -> Option<SyncNotice> {
        self.notices.recv().await
    }
}
