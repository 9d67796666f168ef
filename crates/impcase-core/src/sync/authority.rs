//! Collaboration authority
//!
//! The hub owns the server-side copy of every shared case. It is the single
//! issuing authority for topic ids of those cases, checks participant
//! credentials on login, and rebroadcasts each client's updates to the other
//! clients logged into the same case.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::document::{CaseDocument, IdSource};
use crate::event::Delta;
use crate::sync::protocol::{ClientPacket, ServerPacket};
use crate::sync::transport::Connection;

pub type ClientId = u64;

/// 128-bit random key, hex encoded.
fn random_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug)]
struct Invite {
    participant: String,
    key: String,
    created_at: DateTime<Utc>,
}

struct SharedCase {
    doc: CaseDocument,
    /// userid -> credentials
    participants: HashMap<String, String>,
    invites: Vec<Invite>,
}

struct Client {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    /// Case and user the client is logged in as
    login: Option<(u64, String)>,
}

/// Counters reported by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub cases: usize,
    pub clients: usize,
    pub logged_in: usize,
    pub participants: usize,
}

#[derive(Default)]
pub struct CollabHub {
    cases: HashMap<u64, SharedCase>,
    clients: HashMap<ClientId, Client>,
    next_client: ClientId,
}

impl CollabHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tx: mpsc::UnboundedSender<Vec<u8>>) -> ClientId {
        let id = self.next_client;
        self.next_client += 1;
        self.clients.insert(id, Client { tx, login: None });
        tracing::debug!(client = id, "Client connected");
        id
    }

    pub fn disconnect(&mut self, client: ClientId) {
        if let Some(Client {
            login: Some((caseid, userid)),
            ..
        }) = self.clients.remove(&client)
        {
            tracing::info!(caseid, userid = %userid, "Client left collaboration");
        }
    }

    /// Server-side copy of a shared case.
    pub fn case(&self, caseid: u64) -> Option<&CaseDocument> {
        self.cases.get(&caseid).map(|c| &c.doc)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            cases: self.cases.len(),
            clients: self.clients.len(),
            logged_in: self.clients.values().filter(|c| c.login.is_some()).count(),
            participants: self.cases.values().map(|c| c.participants.len()).sum(),
        }
    }

    /// Process one packet from `client`, replying through its channel.
    pub fn handle(&mut self, client: ClientId, packet: ClientPacket) {
        let reply = match packet {
            ClientPacket::Create { snapshot, userid } => {
                self.create(client, &snapshot, userid).map(Some)
            }
            ClientPacket::Login {
                caseid,
                userid,
                credentials,
            } => self.login(client, caseid, userid, &credentials).map(Some),
            ClientPacket::NewId => self.new_id(client).map(Some),
            ClientPacket::Invite { participant } => self.invite(client, participant).map(Some),
            ClientPacket::Join {
                caseid,
                participant,
                key,
            } => self.join(caseid, participant, &key).map(Some),
            // Updates are not acknowledged.
            ClientPacket::Update(delta) => self.update(client, delta).map(|()| None),
        };

        match reply {
            Ok(Some(packet)) => self.send(client, &packet),
            Ok(None) => {}
            Err(message) => {
                tracing::warn!(client, "Collaboration request failed: {}", message);
                self.send(client, &ServerPacket::Error(message.to_string()));
            }
        }
    }

    /// Reply to a packet that could not be decoded.
    pub fn reject(&mut self, client: ClientId, message: &str) {
        self.send(client, &ServerPacket::Error(message.to_string()));
    }

    fn send(&self, client: ClientId, packet: &ServerPacket) {
        if let Some(c) = self.clients.get(&client) {
            // A closed channel means the client is going away.
            let _ = c.tx.send(packet.encode());
        }
    }

    fn logged_in(&self, client: ClientId) -> Result<(u64, String), &'static str> {
        self.clients
            .get(&client)
            .and_then(|c| c.login.clone())
            .ok_or("not logged in to a collaboration")
    }

    fn create(
        &mut self,
        client: ClientId,
        snapshot: &[u8],
        userid: String,
    ) -> Result<ServerPacket, &'static str> {
        if self.logged_in(client).is_ok() {
            return Err("already connected to a collaboration");
        }
        let mut doc = CaseDocument::decode(snapshot).map_err(|_| "invalid case format")?;
        if self.cases.contains_key(&doc.caseid()) {
            return Err("case is already registered as a collaboration");
        }
        if userid.is_empty() || userid.contains(' ') {
            return Err("invalid user id");
        }

        doc.set_id_source(IdSource::Local);
        doc.set_collab(None);
        doc.mark_clean();
        let caseid = doc.caseid();
        let credentials = random_key();
        let participants = HashMap::from([(userid.clone(), credentials.clone())]);
        self.cases.insert(
            caseid,
            SharedCase {
                doc,
                participants,
                invites: Vec::new(),
            },
        );

        tracing::info!(caseid, author = %userid, "Created new collaboration");
        Ok(ServerPacket::Created { credentials })
    }

    fn login(
        &mut self,
        client: ClientId,
        caseid: u64,
        userid: String,
        credentials: &str,
    ) -> Result<ServerPacket, &'static str> {
        if self.logged_in(client).is_ok() {
            return Err("already connected to a collaboration");
        }
        let case = self.cases.get(&caseid).ok_or("unknown collaboration")?;
        if case.participants.get(&userid).map(String::as_str) != Some(credentials) {
            tracing::warn!(caseid, userid = %userid, "Access denied");
            return Err("access denied");
        }

        let snapshot = case.doc.encode(crate::ClipFormat::Binary);
        tracing::info!(caseid, userid = %userid, "Login");
        if let Some(c) = self.clients.get_mut(&client) {
            c.login = Some((caseid, userid));
        }
        Ok(ServerPacket::Snapshot(snapshot))
    }

    fn new_id(&mut self, client: ClientId) -> Result<ServerPacket, &'static str> {
        let (caseid, _) = self.logged_in(client)?;
        let case = self.cases.get_mut(&caseid).ok_or("unknown collaboration")?;
        let id = case
            .doc
            .next_local_id()
            .map_err(|_| "case does not issue ids")?;
        Ok(ServerPacket::NewId(id))
    }

    fn invite(&mut self, client: ClientId, participant: String) -> Result<ServerPacket, &'static str> {
        let (caseid, userid) = self.logged_in(client)?;
        if participant.is_empty() || participant.contains(' ') {
            return Err("invalid user id");
        }
        let case = self.cases.get_mut(&caseid).ok_or("unknown collaboration")?;
        let key = random_key();
        case.invites.push(Invite {
            participant: participant.clone(),
            key: key.clone(),
            created_at: Utc::now(),
        });
        tracing::info!(caseid, inviter = %userid, participant = %participant, "Invited participant");
        Ok(ServerPacket::Invited { key })
    }

    fn join(&mut self, caseid: u64, participant: String, key: &str) -> Result<ServerPacket, &'static str> {
        let case = self.cases.get_mut(&caseid).ok_or("unknown collaboration")?;
        let pos = case
            .invites
            .iter()
            .position(|i| i.participant == participant && i.key == key)
            .ok_or("invalid invitation")?;
        let invite = case.invites.remove(pos);

        let credentials = random_key();
        case.participants.insert(participant.clone(), credentials.clone());
        tracing::info!(
            caseid,
            participant = %participant,
            invited_at = %invite.created_at,
            "Participant joined"
        );
        Ok(ServerPacket::Joined { credentials })
    }

    fn update(&mut self, client: ClientId, delta: Delta) -> Result<(), &'static str> {
        let (caseid, _) = self.logged_in(client)?;
        let case = self.cases.get_mut(&caseid).ok_or("unknown collaboration")?;
        case.doc.apply_delta(&delta).map_err(|e| {
            tracing::warn!(caseid, "Rejected update: {}", e);
            "invalid update"
        })?;

        let data = ServerPacket::Update(delta).encode();
        for (&id, other) in &self.clients {
            if id != client && matches!(&other.login, Some((c, _)) if *c == caseid) {
                let _ = other.tx.send(data.clone());
            }
        }
        Ok(())
    }
}

/// Serve one client connection until it closes.
pub async fn serve_connection(hub: Arc<Mutex<CollabHub>>, mut conn: Connection) {
    let client = hub.lock().await.register(conn.sender());
    while let Some(data) = conn.recv().await {
        match ClientPacket::decode(&data) {
            Ok(packet) => hub.lock().await.handle(client, packet),
            Err(e) => {
                tracing::warn!(client, "Invalid collaboration packet: {}", e);
                hub.lock().await.reject(client, "invalid packet");
            }
        }
    }
    hub.lock().await.disconnect(client);
}

/// Open an in-process connection to `hub`.
pub fn connect_local(hub: &Arc<Mutex<CollabHub>>) -> Connection {
    let (client, server) = Connection::pair();
    tokio::spawn(serve_connection(Arc::clone(hub), server));
    client
}
