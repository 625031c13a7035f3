use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::protocol::{Outbound, ServerMessage};

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// Opaque per-transport identifier, stable for the connection's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    /// Co-presenter; elevated but never the room's authority
    Teacher,
    Participant,
}

impl Role {
    /// Role a joiner gets in a room that already has a host.
    ///
    /// Claiming `host` cannot displace the creator, so it degrades to `Teacher`.
    pub fn from_claim(claim: Option<&str>) -> Self {
        match claim.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("host") | Some("teacher") | Some("co-presenter") => Role::Teacher,
            _ => Role::Participant,
        }
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Host | Role::Teacher)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Host => "host",
            Role::Teacher => "teacher",
            Role::Participant => "participant",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub room_id: Option<String>,
    pub role: Role,
    pub joined_at: Option<DateTime<Utc>>,
    sender: OutboundSender,
}

impl Connection {
    pub fn new(id: ConnectionId, sender: OutboundSender) -> Self {
        Self {
            id,
            display_name: None,
            email: None,
            room_id: None,
            role: Role::Participant,
            joined_at: None,
            sender,
        }
    }

    /// Queues a frame for the writer task. Never blocks.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.sender.send(Outbound::Event(message)).is_ok()
    }

    /// Asks the writer task to close the socket
    pub fn close(&self) {
        let _ = self.sender.send(Outbound::Close);
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Anonymous")
    }

    fn clear_membership(&mut self) {
        self.room_id = None;
        self.role = Role::Participant;
    }
}

/// Live transport sessions keyed by connection id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ConnectionId, sender: OutboundSender) {
        self.connections.insert(id.clone(), Connection::new(id, sender));
    }

    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Sends to one connection; false when it no longer exists or its writer is gone
    pub fn send_to(&self, id: &ConnectionId, message: ServerMessage) -> bool {
        match self.connections.get(id) {
            Some(connection) => connection.send(message),
            None => false,
        }
    }

    /// Detaches a connection from its room. Returns the room id it was in.
    pub fn detach(&mut self, id: &ConnectionId) -> Option<String> {
        let connection = self.connections.get_mut(id)?;
        let room_id = connection.room_id.take();
        connection.clear_membership();
        room_id
    }
}
