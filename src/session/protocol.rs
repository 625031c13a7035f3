use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::{ConnectionId, Role};

/// Frames sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        user_name: Option<String>,
        name: Option<String>,
        role: Option<String>,
        email: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SendingSignal {
        user_to_signal: ConnectionId,
        signal: Value,
        caller_id: Option<ConnectionId>,
        user_name: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    ReturningSignal {
        caller_id: ConnectionId,
        signal: Value,
    },

    ChatMessage {
        message: Value,
    },

    #[serde(rename_all = "camelCase")]
    SendMessage {
        room_id: String,
        user_name: String,
        message: String,
        time: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    AttentionUpdate {
        user_name: Option<String>,
        score: f64,
    },

    KickUser {
        user: String,
    },

    #[serde(rename_all = "camelCase")]
    LeaveRoom {
        room_id: String,
    },
}

impl ClientMessage {
    /// Display name asserted by a join frame
    pub fn resolve_name(user_name: Option<String>, name: Option<String>) -> String {
        user_name
            .filter(|n| !n.is_empty())
            .or_else(|| name.filter(|n| !n.is_empty()))
            .unwrap_or_else(|| "Anonymous".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub socket_id: ConnectionId,
    pub user_name: String,
}

/// Frames sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    RoleAssigned {
        role: Role,
    },

    AllUsers {
        users: Vec<PeerSummary>,
    },

    /// Arrival notice (`signal` is null) or a relayed offer
    #[serde(rename_all = "camelCase")]
    UserJoined {
        caller_id: ConnectionId,
        user_name: String,
        signal: Option<Value>,
    },

    ReceivingReturnedSignal {
        signal: Value,
        id: ConnectionId,
    },

    AttendanceUpdate {
        attendees: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    UserDisconnected {
        id: ConnectionId,
        user_name: String,
    },

    /// Follows `user-disconnected` when the member's transport closed
    UserLeft {
        id: ConnectionId,
    },

    DuplicateConnection {
        reason: String,
    },

    HostLeft {
        message: String,
    },

    Kicked {
        reason: String,
    },

    ChatMessage {
        message: Value,
    },

    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        user_name: String,
        message: String,
        time: Option<String>,
    },
}

/// What a connection's writer task is asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(ServerMessage),
    Close,
}
