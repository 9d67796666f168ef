//! Collaboration wire protocol
//!
//! Every packet starts with a varint opcode. Replies from the server reuse
//! the opcode of the request they answer; failures are reported with
//! [`COLLAB_ERROR`] followed by a message.
//!
//! ```text
//! CREATE  client: snapshot userid          server: credentials
//! LOGIN   client: caseid userid credentials server: snapshot
//! NEWID   client: -                        server: id
//! INVITE  client: participant              server: key
//! JOIN    client: caseid participant key   server: credentials
//! UPDATE  both:   kind delta
//! ERROR   server: message
//! ```
//!
//! Integers are LEB128 varints, strings and byte strings are length-prefixed.

use impress_frames::binary::{read_bytes, read_str, read_varint, write_bytes, write_str, write_varint};

use crate::error::TransportError;
use crate::event::Delta;

pub const COLLAB_CREATE: u64 = 1;
/// Reserved; not served
pub const COLLAB_DELETE: u64 = 2;
pub const COLLAB_INVITE: u64 = 3;
pub const COLLAB_JOIN: u64 = 4;
pub const COLLAB_LOGIN: u64 = 5;
pub const COLLAB_NEWID: u64 = 6;
pub const COLLAB_UPDATE: u64 = 7;
pub const COLLAB_ERROR: u64 = 127;

const UPDATE_TOPIC: u64 = 1;
const UPDATE_FOLDER: u64 = 2;
const UPDATE_FOLDERS: u64 = 3;
const UPDATE_DELETE: u64 = 4;
const UPDATE_RENAME: u64 = 5;

/// Packets sent by clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    /// Hand a case over to the server
    Create { snapshot: Vec<u8>, userid: String },
    Login {
        caseid: u64,
        userid: String,
        credentials: String,
    },
    NewId,
    Invite { participant: String },
    Join {
        caseid: u64,
        participant: String,
        key: String,
    },
    Update(Delta),
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    Created { credentials: String },
    /// Full case, in reply to a login
    Snapshot(Vec<u8>),
    NewId(u64),
    Invited { key: String },
    Joined { credentials: String },
    Update(Delta),
    Error(String),
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn int(&mut self) -> Result<u64, TransportError> {
        Ok(read_varint(self.data, &mut self.pos)?)
    }

    fn string(&mut self) -> Result<String, TransportError> {
        Ok(read_str(self.data, &mut self.pos)?)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(read_bytes(self.data, &mut self.pos)?.to_vec())
    }

    fn strings(&mut self) -> Result<Vec<String>, TransportError> {
        let count = self.int()?;
        (0..count).map(|_| self.string()).collect()
    }

    fn finish<T>(self, value: T) -> Result<T, TransportError> {
        if self.pos != self.data.len() {
            return Err(TransportError::Protocol(format!(
                "{} trailing bytes",
                self.data.len() - self.pos
            )));
        }
        Ok(value)
    }

    fn delta(&mut self) -> Result<Delta, TransportError> {
        Ok(match self.int()? {
            UPDATE_TOPIC => Delta::Topic(self.bytes()?),
            UPDATE_FOLDER => Delta::Folder {
                name: self.string()?,
                topics: self.strings()?,
            },
            UPDATE_FOLDERS => Delta::Folders(self.strings()?),
            UPDATE_DELETE => Delta::TopicDeleted(self.string()?),
            UPDATE_RENAME => Delta::FolderRenamed {
                old: self.string()?,
                new: self.string()?,
            },
            kind => {
                return Err(TransportError::Protocol(format!(
                    "unknown update kind {}",
                    kind
                )))
            }
        })
    }
}

fn write_strings(buf: &mut Vec<u8>, items: &[String]) {
    write_varint(buf, items.len() as u64);
    for item in items {
        write_str(buf, item);
    }
}

fn write_delta(buf: &mut Vec<u8>, delta: &Delta) {
    match delta {
        Delta::Topic(record) => {
            write_varint(buf, UPDATE_TOPIC);
            write_bytes(buf, record);
        }
        Delta::Folder { name, topics } => {
            write_varint(buf, UPDATE_FOLDER);
            write_str(buf, name);
            write_strings(buf, topics);
        }
        Delta::Folders(names) => {
            write_varint(buf, UPDATE_FOLDERS);
            write_strings(buf, names);
        }
        Delta::TopicDeleted(id) => {
            write_varint(buf, UPDATE_DELETE);
            write_str(buf, id);
        }
        Delta::FolderRenamed { old, new } => {
            write_varint(buf, UPDATE_RENAME);
            write_str(buf, old);
            write_str(buf, new);
        }
    }
}

impl ClientPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ClientPacket::Create { snapshot, userid } => {
                write_varint(&mut buf, COLLAB_CREATE);
                write_bytes(&mut buf, snapshot);
                write_str(&mut buf, userid);
            }
            ClientPacket::Login {
                caseid,
                userid,
                credentials,
            } => {
                write_varint(&mut buf, COLLAB_LOGIN);
                write_varint(&mut buf, *caseid);
                write_str(&mut buf, userid);
                write_str(&mut buf, credentials);
            }
            ClientPacket::NewId => write_varint(&mut buf, COLLAB_NEWID),
            ClientPacket::Invite { participant } => {
                write_varint(&mut buf, COLLAB_INVITE);
                write_str(&mut buf, participant);
            }
            ClientPacket::Join {
                caseid,
                participant,
                key,
            } => {
                write_varint(&mut buf, COLLAB_JOIN);
                write_varint(&mut buf, *caseid);
                write_str(&mut buf, participant);
                write_str(&mut buf, key);
            }
            ClientPacket::Update(delta) => {
                write_varint(&mut buf, COLLAB_UPDATE);
                write_delta(&mut buf, delta);
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new(data);
        let packet = match r.int()? {
            COLLAB_CREATE => ClientPacket::Create {
                snapshot: r.bytes()?,
                userid: r.string()?,
            },
            COLLAB_LOGIN => ClientPacket::Login {
                caseid: r.int()?,
                userid: r.string()?,
                credentials: r.string()?,
            },
            COLLAB_NEWID => ClientPacket::NewId,
            COLLAB_INVITE => ClientPacket::Invite {
                participant: r.string()?,
            },
            COLLAB_JOIN => ClientPacket::Join {
                caseid: r.int()?,
                participant: r.string()?,
                key: r.string()?,
            },
            COLLAB_UPDATE => ClientPacket::Update(r.delta()?),
            op => return Err(TransportError::Protocol(format!("invalid collab op {}", op))),
        };
        r.finish(packet)
    }
}

impl ServerPacket {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ServerPacket::Created { credentials } => {
                write_varint(&mut buf, COLLAB_CREATE);
                write_str(&mut buf, credentials);
            }
            ServerPacket::Snapshot(snapshot) => {
                write_varint(&mut buf, COLLAB_LOGIN);
                write_bytes(&mut buf, snapshot);
            }
            ServerPacket::NewId(id) => {
                write_varint(&mut buf, COLLAB_NEWID);
                write_varint(&mut buf, *id);
            }
            ServerPacket::Invited { key } => {
                write_varint(&mut buf, COLLAB_INVITE);
                write_str(&mut buf, key);
            }
            ServerPacket::Joined { credentials } => {
                write_varint(&mut buf, COLLAB_JOIN);
                write_str(&mut buf, credentials);
            }
            ServerPacket::Update(delta) => {
                write_varint(&mut buf, COLLAB_UPDATE);
                write_delta(&mut buf, delta);
            }
            ServerPacket::Error(message) => {
                write_varint(&mut buf, COLLAB_ERROR);
                write_str(&mut buf, message);
            }
        }
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new(data);
        let packet = match r.int()? {
            COLLAB_CREATE => ServerPacket::Created {
                credentials: r.string()?,
            },
            COLLAB_LOGIN => ServerPacket::Snapshot(r.bytes()?),
            COLLAB_NEWID => ServerPacket::NewId(r.int()?),
            COLLAB_INVITE => ServerPacket::Invited { key: r.string()? },
            COLLAB_JOIN => ServerPacket::Joined {
                credentials: r.string()?,
            },
            COLLAB_UPDATE => ServerPacket::Update(r.delta()?),
            COLLAB_ERROR => ServerPacket::Error(r.string()?),
            op => return Err(TransportError::Protocol(format!("invalid collab op {}", op))),
        };
        r.finish(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClientPacket::Login { caseid: 300, userid: "ada".into(), credentials: "k".into() })]
    #[case(ClientPacket::NewId)]
    #[case(ClientPacket::Update(Delta::Folder { name: "General".into(), topics: vec!["c/1".into(), "t/1/2".into()] }))]
    #[case(ClientPacket::Update(Delta::FolderRenamed { old: "a".into(), new: "b".into() }))]
    fn test_client_packets(#[case] packet: ClientPacket) {
        assert_eq!(ClientPacket::decode(&packet.encode()).unwrap(), packet);
    }

    #[test]
    fn test_opcodes_on_wire() {
        assert_eq!(ClientPacket::NewId.encode(), vec![6]);
        assert_eq!(ServerPacket::NewId(5).encode(), vec![6, 5]);
        let error = ServerPacket::Error("access denied".into()).encode();
        assert_eq!(&error[..2], &[0x7F, 13]);
        let login = ServerPacket::Snapshot(vec![0, 1]).encode();
        assert_eq!(login, vec![5, 2, 0, 1]);
    }

    #[test]
    fn test_invalid_packets() {
        assert!(matches!(
            ClientPacket::decode(&[COLLAB_DELETE as u8]),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            ServerPacket::decode(&[7, 9]),
            Err(TransportError::Protocol(_))
        ));
        assert!(ServerPacket::decode(&[6, 5, 0]).is_err());
        assert!(ServerPacket::decode(&[]).is_err());
    }
}
