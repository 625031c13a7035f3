use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::connection::{ConnectionId, OutboundSender};
use super::protocol::ClientMessage;
use super::relay::SignalKind;
use super::store::{JoinRequest, RoomStore, Teardown};
use crate::config::SessionConfig;
use crate::report::ReportQueue;

/// Runs every inbound event against the shared [`RoomStore`].
///
/// Handlers hold the store lock for their whole body and never await while
/// holding it, so no two handlers interleave. Deferred teardown and report
/// delivery are the only work that runs detached, and both operate on the
/// [`Teardown`] snapshot captured when the host left.
#[derive(Clone)]
pub struct SessionCoordinator {
    store: Arc<Mutex<RoomStore>>,
    config: SessionConfig,
    reports: ReportQueue,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig, reports: ReportQueue) -> Self {
        Self {
            store: Arc::new(Mutex::new(RoomStore::new())),
            config,
            reports,
        }
    }

    /// Registers a new transport session and returns its id
    pub async fn connect(&self, sender: OutboundSender) -> ConnectionId {
        let id = ConnectionId::generate();
        self.store.lock().await.connect(id.clone(), sender);
        tracing::info!(connection_id = %id, "Connection registered");
        id
    }

    pub async fn handle_message(&self, id: &ConnectionId, message: ClientMessage) {
        let now = Utc::now();
        let teardowns = {
            let mut store = self.store.lock().await;
            match message {
                ClientMessage::JoinRoom { room_id, user_name, name, role, email } => {
                    let request = JoinRequest {
                        room_id,
                        display_name: ClientMessage::resolve_name(user_name, name),
                        claimed_role: role,
                        email: email.filter(|e| !e.trim().is_empty()),
                    };
                    store
                        .join(id, request, now)
                        .map(|outcome| outcome.teardowns)
                        .unwrap_or_default()
                }
                ClientMessage::SendingSignal { user_to_signal, signal, caller_id, user_name } => {
                    if let Some(caller_id) = caller_id.filter(|caller| caller != id) {
                        tracing::debug!(
                            connection_id = %id,
                            claimed_caller = %caller_id,
                            "Ignoring client-supplied caller id"
                        );
                    }
                    store.relay(SignalKind::Offer, id, user_to_signal, signal, user_name);
                    Vec::new()
                }
                ClientMessage::ReturningSignal { caller_id, signal } => {
                    store.relay(SignalKind::Answer, id, caller_id, signal, None);
                    Vec::new()
                }
                ClientMessage::ChatMessage { message } => {
                    store.chat(id, message);
                    Vec::new()
                }
                ClientMessage::SendMessage { room_id, user_name, message, time } => {
                    store.send_message(&room_id, user_name, message, time);
                    Vec::new()
                }
                ClientMessage::AttentionUpdate { user_name, score } => {
                    if !store.record_attention(id, user_name.as_deref(), score) {
                        tracing::debug!(connection_id = %id, "Attention sample not recorded");
                    }
                    Vec::new()
                }
                ClientMessage::KickUser { user } => {
                    store.kick(id, &user, now);
                    Vec::new()
                }
                ClientMessage::LeaveRoom { room_id } => store.leave(id, &room_id, now).into_iter().collect(),
            }
        };

        for teardown in teardowns {
            self.begin_teardown(teardown);
        }
    }

    /// Transport-level disconnect; identical to leaving, then the connection is dropped
    pub async fn disconnect(&self, id: &ConnectionId) {
        let teardown = self.store.lock().await.disconnect(id, Utc::now());
        tracing::info!(connection_id = %id, "Connection closed");
        if let Some(teardown) = teardown {
            self.begin_teardown(teardown);
        }
    }

    /// Hands the snapshot to reporting and schedules the purge of this room instance.
    fn begin_teardown(&self, teardown: Teardown) {
        let Teardown { room_id, generation, snapshot } = teardown;

        self.reports.submit(snapshot);

        let store = self.store.clone();
        let grace_period = self.config.grace_period;
        tracing::debug!(
            room_id = %room_id,
            generation = generation,
            grace_secs = grace_period.as_secs(),
            "Scheduling room teardown"
        );
        tokio::spawn(async move {
            sleep(grace_period).await;
            store.lock().await.purge(&room_id, generation);
        });
    }

    /// Read-only access to the store, for health reporting and tests
    pub async fn inspect<R>(&self, f: impl FnOnce(&RoomStore) -> R) -> R {
        let store = self.store.lock().await;
        f(&store)
    }
}
