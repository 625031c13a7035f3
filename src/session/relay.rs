use serde_json::Value;

use super::connection::{ConnectionId, ConnectionRegistry};
use super::protocol::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Routed to the peer the caller wants to reach
    Offer,
    /// Routed back to the original caller
    Answer,
}

/// A negotiation message in flight. Exists for one relay call only.
#[derive(Debug, Clone)]
pub struct SignalEnvelope {
    pub kind: SignalKind,
    pub sender: ConnectionId,
    pub sender_name: String,
    pub target: ConnectionId,
    pub payload: Value,
}

/// Forwards envelopes between connections without looking inside the payload.
pub struct SignalRelay;

impl SignalRelay {
    /// Returns whether the envelope was queued. An unknown target is dropped silently.
    pub fn relay(connections: &ConnectionRegistry, envelope: SignalEnvelope) -> bool {
        let SignalEnvelope { kind, sender, sender_name, target, payload } = envelope;

        let message = match kind {
            SignalKind::Offer => ServerMessage::UserJoined {
                caller_id: sender.clone(),
                user_name: sender_name,
                signal: Some(payload),
            },
            SignalKind::Answer => ServerMessage::ReceivingReturnedSignal {
                signal: payload,
                id: sender.clone(),
            },
        };

        let delivered = connections.send_to(&target, message);
        if !delivered {
            tracing::debug!(
                sender = %sender,
                target = %target,
                kind = ?kind,
                "Dropping signal for unknown target"
            );
        }
        delivered
    }
}
