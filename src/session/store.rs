use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::connection::{Connection, ConnectionId, ConnectionRegistry, OutboundSender, Role};
use super::ledger::{LedgerSnapshot, SessionLedger};
use super::protocol::{PeerSummary, ServerMessage};
use super::relay::{SignalEnvelope, SignalKind, SignalRelay};
use super::room::{Room, RoomRegistry, RoomState};

const HOST_LEFT_MESSAGE: &str = "The host has left. This session has ended.";
const DUPLICATE_REASON: &str = "Another connection joined this room with the same name";

/// Everything the coordinator needs to finish a room after its host left.
/// Captured at the moment of departure; the live room may be gone when it is used.
#[derive(Debug, Clone)]
pub struct Teardown {
    pub room_id: String,
    pub generation: u64,
    pub snapshot: LedgerSnapshot,
}

/// How a connection came to leave its room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    /// `leave-room`, or moving on to another room
    Left,
    /// Transport closed, including server-side closes from kick and eviction
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub room_id: String,
    pub display_name: String,
    pub claimed_role: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub role: Role,
    /// Other members at join time, in join order
    pub peers: Vec<ConnectionId>,
    /// Rooms whose host departed as a side effect of this join
    pub teardowns: Vec<Teardown>,
}

/// All room-scoped state: connections, rooms and their ledgers.
///
/// Every method runs to completion without yielding, so callers get a total
/// order over mutations by holding exclusive access for the whole call.
#[derive(Debug, Default)]
pub struct RoomStore {
    connections: ConnectionRegistry,
    rooms: RoomRegistry,
    ledgers: HashMap<String, SessionLedger>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.count()
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.count()
    }

    pub fn room_state(&self, room_id: &str) -> Option<RoomState> {
        self.rooms.get(room_id).map(|room| room.state)
    }

    pub fn ledger(&self, room_id: &str) -> Option<&SessionLedger> {
        self.ledgers.get(room_id)
    }

    /// Number of members of `room_id` currently holding `role`
    pub fn count_role(&self, room_id: &str, role: Role) -> usize {
        self.rooms
            .get(room_id)
            .map(|room| {
                room.members()
                    .iter()
                    .filter_map(|member| self.connections.get(member))
                    .filter(|connection| connection.role == role)
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn connect(&mut self, id: ConnectionId, sender: OutboundSender) {
        self.connections.register(id, sender);
    }

    pub fn join(
        &mut self,
        id: &ConnectionId,
        request: JoinRequest,
        now: DateTime<Utc>,
    ) -> Option<JoinOutcome> {
        let JoinRequest { room_id, display_name, claimed_role, email } = request;

        let current_room = match self.connections.get(id) {
            Some(connection) => connection.room_id.clone(),
            None => {
                tracing::warn!(connection_id = %id, "Join from unknown connection");
                return None;
            }
        };

        let mut teardowns = Vec::new();
        if let Some(current_room) = current_room {
            if current_room == room_id {
                tracing::debug!(connection_id = %id, room_id = %room_id, "Already in room, ignoring join");
                return None;
            }
            teardowns.extend(self.depart(id, Departure::Left, now));
        }

        let stale = self
            .rooms
            .get(&room_id)
            .filter(|room| room.is_active())
            .and_then(|room| room.find_by_name(&display_name))
            .filter(|holder| *holder != id)
            .cloned();
        if let Some(stale) = stale {
            teardowns.extend(self.evict(&stale, &room_id, now));
        }

        if self.room_state(&room_id) == Some(RoomState::Draining) {
            tracing::info!(room_id = %room_id, "Replacing drained room with a new session");
            self.purge_room(&room_id);
        }

        let role = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.add_member(id.clone(), &display_name);
                Role::from_claim(claimed_role.as_deref())
            }
            None => {
                let room = self.rooms.create(&room_id, id.clone(), now);
                room.add_member(id.clone(), &display_name);
                self.ledgers.insert(
                    room_id.clone(),
                    SessionLedger::open(&room_id, &display_name, email.clone(), now),
                );
                Role::Host
            }
        };

        if role != Role::Host {
            if let Some(ledger) = self.ledgers.get_mut(&room_id) {
                ledger.record_join(id.clone(), &display_name, email.clone(), now);
            }
        }

        if let Some(connection) = self.connections.get_mut(id) {
            connection.room_id = Some(room_id.clone());
            connection.display_name = Some(display_name.clone());
            connection.email = email;
            connection.role = role;
            connection.joined_at = Some(now);
        }

        let peers: Vec<ConnectionId> = self
            .rooms
            .get(&room_id)
            .map(|room| room.peers_of(id).cloned().collect())
            .unwrap_or_default();

        self.connections.send_to(id, ServerMessage::RoleAssigned { role });
        let users = peers
            .iter()
            .filter_map(|peer| self.connections.get(peer))
            .map(|peer| PeerSummary {
                socket_id: peer.id.clone(),
                user_name: peer.name().to_string(),
            })
            .collect();
        self.connections.send_to(id, ServerMessage::AllUsers { users });

        for peer in &peers {
            self.connections.send_to(
                peer,
                ServerMessage::UserJoined {
                    caller_id: id.clone(),
                    user_name: display_name.clone(),
                    signal: None,
                },
            );
        }
        self.broadcast_attendance(&room_id);

        tracing::info!(
            connection_id = %id,
            room_id = %room_id,
            name = %display_name,
            role = %role,
            "Connection joined room"
        );

        Some(JoinOutcome { role, peers, teardowns })
    }

    /// Supersedes a connection that holds the same display name as a new joiner
    fn evict(&mut self, stale: &ConnectionId, room_id: &str, now: DateTime<Utc>) -> Option<Teardown> {
        tracing::warn!(
            connection_id = %stale,
            room_id = %room_id,
            "Evicting connection superseded by a duplicate name"
        );
        if let Some(connection) = self.connections.get(stale) {
            connection.send(ServerMessage::DuplicateConnection {
                reason: DUPLICATE_REASON.to_string(),
            });
            connection.close();
        }
        self.depart(stale, Departure::Disconnected, now)
    }

    /// Departure bookkeeping shared by leave, disconnect, kick and eviction.
    /// Idempotent: a connection that is in no room is a no-op.
    fn depart(&mut self, id: &ConnectionId, departure: Departure, now: DateTime<Utc>) -> Option<Teardown> {
        let name = self.connections.get(id)?.name().to_string();
        let room_id = self.connections.detach(id)?;

        let room = self.rooms.get_mut(&room_id)?;
        if !room.is_active() {
            room.remove_member(id, &name);
            tracing::debug!(connection_id = %id, room_id = %room_id, "Departure from draining room");
            return None;
        }
        if room.is_host(id) {
            return self.host_departure(&room_id, id, now);
        }

        room.remove_member(id, &name);
        if let Some(ledger) = self.ledgers.get_mut(&room_id) {
            ledger.record_leave(id, now);
        }

        self.broadcast(
            &room_id,
            ServerMessage::UserDisconnected {
                id: id.clone(),
                user_name: name.clone(),
            },
        );
        if departure == Departure::Disconnected {
            self.broadcast(&room_id, ServerMessage::UserLeft { id: id.clone() });
        }
        self.broadcast_attendance(&room_id);

        tracing::info!(
            connection_id = %id,
            room_id = %room_id,
            name = %name,
            departure = ?departure,
            "Connection left room"
        );
        None
    }

    fn host_departure(&mut self, room_id: &str, host: &ConnectionId, now: DateTime<Utc>) -> Option<Teardown> {
        let room = self.rooms.get_mut(room_id)?;
        let generation = room.generation;
        let remaining: Vec<ConnectionId> = room.drain().into_iter().filter(|m| m != host).collect();

        let snapshot = match self.ledgers.get_mut(room_id) {
            Some(ledger) => {
                ledger.close_all(now);
                ledger.snapshot(now)
            }
            None => {
                tracing::error!(room_id = %room_id, "Room has no session ledger");
                return None;
            }
        };

        for member in &remaining {
            if let Some(connection) = self.connections.get(member) {
                connection.send(ServerMessage::HostLeft {
                    message: HOST_LEFT_MESSAGE.to_string(),
                });
                connection.close();
            }
            self.connections.detach(member);
        }

        tracing::info!(
            room_id = %room_id,
            generation = generation,
            disconnected = remaining.len(),
            "Host left, room draining"
        );

        Some(Teardown {
            room_id: room_id.to_string(),
            generation,
            snapshot,
        })
    }

    pub fn leave(&mut self, id: &ConnectionId, room_id: &str, now: DateTime<Utc>) -> Option<Teardown> {
        let in_room = self
            .connections
            .get(id)
            .and_then(|c| c.room_id.as_deref())
            .map_or(false, |current| current == room_id);
        if !in_room {
            tracing::debug!(connection_id = %id, room_id = %room_id, "Leave for a room the connection is not in");
            return None;
        }
        self.depart(id, Departure::Left, now)
    }

    /// Transport went away: same as leaving, then the connection is forgotten
    pub fn disconnect(&mut self, id: &ConnectionId, now: DateTime<Utc>) -> Option<Teardown> {
        let teardown = self.depart(id, Departure::Disconnected, now);
        self.connections.remove(id);
        teardown
    }

    /// Removes `target_name` from the kicker's room. Only hosts and teachers may kick,
    /// and the host cannot be kicked.
    pub fn kick(&mut self, kicker: &ConnectionId, target_name: &str, now: DateTime<Utc>) -> bool {
        let (room_id, role, kicker_name) = match self.connections.get(kicker) {
            Some(connection) => match &connection.room_id {
                Some(room_id) => (room_id.clone(), connection.role, connection.name().to_string()),
                None => return false,
            },
            None => return false,
        };
        if !role.is_elevated() {
            tracing::warn!(connection_id = %kicker, room_id = %room_id, "Kick refused: not elevated");
            return false;
        }

        let target = match self.rooms.get(&room_id) {
            Some(room) if room.is_active() => match room.find_by_name(target_name) {
                Some(target) if room.is_host(target) => {
                    tracing::warn!(room_id = %room_id, target = %target_name, "Kick refused: target is host");
                    return false;
                }
                Some(target) => target.clone(),
                None => {
                    tracing::debug!(room_id = %room_id, target = %target_name, "Kick target not in room");
                    return false;
                }
            },
            _ => return false,
        };

        if let Some(connection) = self.connections.get(&target) {
            connection.send(ServerMessage::Kicked {
                reason: format!("Removed by {}", kicker_name),
            });
            connection.close();
        }
        self.depart(&target, Departure::Disconnected, now);

        tracing::info!(room_id = %room_id, target = %target_name, "Kicked user");
        true
    }

    /// Appends an attention sample for a non-host participant. `user_name`
    /// selects a member of the sender's room; without it the sender is scored.
    pub fn record_attention(&mut self, sender: &ConnectionId, user_name: Option<&str>, score: f64) -> bool {
        if !score.is_finite() {
            return false;
        }
        let room_id = match self.connections.get(sender).and_then(|c| c.room_id.clone()) {
            Some(room_id) => room_id,
            None => return false,
        };
        let target = match user_name {
            Some(name) => match self.rooms.get(&room_id).and_then(|room| room.find_by_name(name)) {
                Some(target) => target.clone(),
                None => return false,
            },
            None => sender.clone(),
        };
        self.ledgers
            .get_mut(&room_id)
            .map_or(false, |ledger| ledger.record_attention(&target, score))
    }

    pub fn relay(
        &self,
        kind: SignalKind,
        sender: &ConnectionId,
        target: ConnectionId,
        payload: Value,
        claimed_name: Option<String>,
    ) -> bool {
        let sender_name = claimed_name
            .filter(|name| !name.is_empty())
            .or_else(|| self.connections.get(sender).map(|c| c.name().to_string()))
            .unwrap_or_else(|| "Anonymous".to_string());

        SignalRelay::relay(
            &self.connections,
            SignalEnvelope {
                kind,
                sender: sender.clone(),
                sender_name,
                target,
                payload,
            },
        )
    }

    /// Fans a chat payload out to the sender's room
    pub fn chat(&self, sender: &ConnectionId, message: Value) -> usize {
        match self.connections.get(sender).and_then(|c| c.room_id.as_deref()) {
            Some(room_id) => self.broadcast(room_id, ServerMessage::ChatMessage { message }),
            None => 0,
        }
    }

    pub fn send_message(&self, room_id: &str, user_name: String, message: String, time: Option<String>) -> usize {
        self.broadcast(room_id, ServerMessage::ReceiveMessage { user_name, message, time })
    }

    /// Deletes a drained room, but only the instance that was scheduled.
    pub fn purge(&mut self, room_id: &str, generation: u64) -> bool {
        if self.rooms.remove_generation(room_id, generation).is_some() {
            self.ledgers.remove(room_id);
            tracing::info!(room_id = %room_id, generation = generation, "Room purged");
            true
        } else {
            tracing::debug!(room_id = %room_id, generation = generation, "Stale teardown ignored");
            false
        }
    }

    fn purge_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
        self.ledgers.remove(room_id);
    }

    fn broadcast(&self, room_id: &str, message: ServerMessage) -> usize {
        let Some(room) = self.rooms.get(room_id) else {
            return 0;
        };
        room.members()
            .iter()
            .filter(|member| self.connections.send_to(member, message.clone()))
            .count()
    }

    fn broadcast_attendance(&self, room_id: &str) {
        if let Some(room) = self.rooms.get(room_id) {
            let attendees = room.attendance().to_vec();
            self.broadcast(room_id, ServerMessage::AttendanceUpdate { attendees });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::Outbound;
    use chrono::Duration;
    use serde_json::json;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    struct Harness {
        store: RoomStore,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn new() -> Self {
            Self { store: RoomStore::new(), now: Utc::now() }
        }

        fn connect(&mut self, id: &str) -> (ConnectionId, UnboundedReceiver<Outbound>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = ConnectionId::from(id);
            self.store.connect(id.clone(), tx);
            (id, rx)
        }

        fn join(&mut self, id: &ConnectionId, room: &str, name: &str, role: Option<&str>) -> JoinOutcome {
            self.join_with_email(id, room, name, role, None)
        }

        fn join_with_email(
            &mut self,
            id: &ConnectionId,
            room: &str,
            name: &str,
            role: Option<&str>,
            email: Option<&str>,
        ) -> JoinOutcome {
            self.store
                .join(
                    id,
                    JoinRequest {
                        room_id: room.into(),
                        display_name: name.into(),
                        claimed_role: role.map(str::to_string),
                        email: email.map(str::to_string),
                    },
                    self.now,
                )
                .unwrap()
        }

        fn advance(&mut self, minutes: i64) {
            self.now = self.now + Duration::minutes(minutes);
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn last_attendance(frames: &[Outbound]) -> Option<Vec<String>> {
        frames.iter().rev().find_map(|frame| match frame {
            Outbound::Event(ServerMessage::AttendanceUpdate { attendees }) => Some(attendees.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_first_joiner_becomes_host() {
        let mut h = Harness::new();
        let (a, mut rx) = h.connect("a");
        let outcome = h.join(&a, "R1", "Host", Some("participant"));

        assert_eq!(outcome.role, Role::Host);
        assert!(outcome.peers.is_empty());
        assert_eq!(h.store.room("R1").unwrap().host, a);
        assert!(h.store.ledger("R1").unwrap().participants().is_empty());

        let frames = drain(&mut rx);
        assert_eq!(frames[0], Outbound::Event(ServerMessage::RoleAssigned { role: Role::Host }));
        assert_eq!(last_attendance(&frames), Some(vec!["Host".to_string()]));
    }

    #[test]
    fn test_claiming_host_in_existing_room_yields_teacher() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (b, _rx_b) = h.connect("b");
        h.join(&a, "R1", "Host", None);
        let outcome = h.join(&b, "R1", "Bea", Some("host"));

        assert_eq!(outcome.role, Role::Teacher);
        assert_eq!(h.store.count_role("R1", Role::Host), 1);
    }

    #[test]
    fn test_join_notifies_existing_members() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, mut rx_b) = h.connect("b");
        h.join(&a, "R1", "Host", None);
        drain(&mut rx_a);

        let outcome = h.join(&b, "R1", "Bea", None);
        assert_eq!(outcome.peers, vec![a.clone()]);

        let frames_b = drain(&mut rx_b);
        assert!(frames_b.contains(&Outbound::Event(ServerMessage::AllUsers {
            users: vec![PeerSummary { socket_id: a.clone(), user_name: "Host".into() }],
        })));

        let frames_a = drain(&mut rx_a);
        assert!(frames_a.contains(&Outbound::Event(ServerMessage::UserJoined {
            caller_id: b.clone(),
            user_name: "Bea".into(),
            signal: None,
        })));
        assert_eq!(last_attendance(&frames_a), Some(vec!["Host".to_string(), "Bea".to_string()]));
    }

    #[test]
    fn test_duplicate_name_evicts_prior_connection() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (b1, mut rx_b1) = h.connect("b1");
        let (b2, _rx_b2) = h.connect("b2");
        h.join(&a, "R1", "Host", None);
        h.join(&b1, "R1", "Bea", None);
        drain(&mut rx_b1);

        h.advance(2);
        h.join(&b2, "R1", "Bea", None);

        let frames = drain(&mut rx_b1);
        assert!(matches!(
            frames.first(),
            Some(Outbound::Event(ServerMessage::DuplicateConnection { .. }))
        ));
        assert!(frames.contains(&Outbound::Close));

        let room = h.store.room("R1").unwrap();
        assert_eq!(room.members(), &[a.clone(), b2.clone()]);
        assert_eq!(room.attendance().iter().filter(|n| *n == "Bea").count(), 1);
        assert!(h.store.connection(&b1).unwrap().room_id.is_none());

        let ledger = h.store.ledger("R1").unwrap();
        assert_eq!(ledger.participants().len(), 2);
        assert!(ledger.participants()[0].leave_time.is_some());
        assert!(ledger.participants()[1].is_open());

        // The evicted socket's transport disconnect arrives later and changes nothing
        assert!(h.store.disconnect(&b1, h.now).is_none());
        assert_eq!(h.store.room("R1").unwrap().members().len(), 2);
    }

    #[test]
    fn test_participant_leave_keeps_room_active() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, _rx_b) = h.connect("b");
        h.join(&a, "R1", "Host", None);
        h.join(&b, "R1", "Bea", None);
        drain(&mut rx_a);

        assert!(h.store.leave(&b, "R1", h.now).is_none());
        assert_eq!(h.store.room_state("R1"), Some(RoomState::Active));

        let frames = drain(&mut rx_a);
        assert!(frames.contains(&Outbound::Event(ServerMessage::UserDisconnected {
            id: b.clone(),
            user_name: "Bea".into(),
        })));
        assert!(!frames.contains(&Outbound::Event(ServerMessage::UserLeft { id: b.clone() })));
        assert_eq!(last_attendance(&frames), Some(vec!["Host".to_string()]));

        // Second leave is a no-op
        assert!(h.store.leave(&b, "R1", h.now).is_none());
    }

    #[test]
    fn test_disconnect_announces_user_left() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, _rx_b) = h.connect("b");
        h.join(&a, "R1", "Host", None);
        h.join(&b, "R1", "Bea", None);
        drain(&mut rx_a);

        assert!(h.store.disconnect(&b, h.now).is_none());
        assert!(h.store.connection(&b).is_none());

        let frames = drain(&mut rx_a);
        assert_eq!(
            &frames[..2],
            &[
                Outbound::Event(ServerMessage::UserDisconnected {
                    id: b.clone(),
                    user_name: "Bea".into(),
                }),
                Outbound::Event(ServerMessage::UserLeft { id: b.clone() }),
            ]
        );
        assert_eq!(last_attendance(&frames), Some(vec!["Host".to_string()]));
    }

    #[test]
    fn test_leave_for_other_room_is_noop() {
        let mut h = Harness::new();
        let (a, _rx) = h.connect("a");
        h.join(&a, "R1", "Host", None);
        assert!(h.store.leave(&a, "R2", h.now).is_none());
        assert_eq!(h.store.room_state("R1"), Some(RoomState::Active));
    }

    #[test]
    fn test_host_departure_drains_room() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (b, mut rx_b) = h.connect("b");
        let (c, mut rx_c) = h.connect("c");
        h.join_with_email(&a, "R1", "Host", None, Some("h@x.com"));
        h.join(&b, "R1", "Bea", None);
        h.join(&c, "R1", "Cal", None);

        h.advance(10);
        h.store.leave(&b, "R1", h.now);
        drain(&mut rx_c);
        h.advance(20);
        let teardown = h.store.disconnect(&a, h.now).unwrap();

        assert_eq!(h.store.room_state("R1"), Some(RoomState::Draining));
        assert!(h.store.connection(&c).unwrap().room_id.is_none());
        let frames = drain(&mut rx_c);
        assert!(matches!(frames[0], Outbound::Event(ServerMessage::HostLeft { .. })));
        assert_eq!(frames.last(), Some(&Outbound::Close));
        assert!(!drain(&mut rx_b).contains(&Outbound::Close));

        let rows = &teardown.snapshot.participants;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].leave_time, Some(h.now - Duration::minutes(20)));
        assert_eq!(rows[1].leave_time, Some(h.now));
        assert_eq!(teardown.snapshot.host_email.as_deref(), Some("h@x.com"));

        // Late disconnect of a force-closed member resolves against retained state
        assert!(h.store.disconnect(&c, h.now).is_none());
        assert!(h.store.purge("R1", teardown.generation));
        assert!(h.store.room("R1").is_none());
        assert!(h.store.ledger("R1").is_none());
        assert!(!h.store.purge("R1", teardown.generation));
    }

    #[test]
    fn test_join_during_drain_creates_fresh_room() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (d, _rx_d) = h.connect("d");
        h.join(&a, "R1", "Host", None);
        let teardown = h.store.disconnect(&a, h.now).unwrap();

        let outcome = h.join(&d, "R1", "Dev", None);
        assert_eq!(outcome.role, Role::Host);
        let room = h.store.room("R1").unwrap();
        assert_eq!(room.state, RoomState::Active);
        assert_ne!(room.generation, teardown.generation);

        // The stale timer must not remove the new room
        assert!(!h.store.purge("R1", teardown.generation));
        assert!(h.store.room("R1").is_some());
    }

    #[test]
    fn test_kick_requires_elevated_role() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, _rx_b) = h.connect("b");
        let (c, mut rx_c) = h.connect("c");
        h.join(&a, "R1", "Host", None);
        h.join(&b, "R1", "Bea", None);
        h.join(&c, "R1", "Cal", None);

        assert!(!h.store.kick(&b, "Cal", h.now));
        assert!(h.store.room("R1").unwrap().contains(&c));

        drain(&mut rx_a);
        assert!(h.store.kick(&a, "Cal", h.now));
        assert!(!h.store.room("R1").unwrap().contains(&c));
        assert!(drain(&mut rx_c).contains(&Outbound::Close));
        assert_eq!(h.store.room("R1").unwrap().attendance(), &["Host", "Bea"]);
        assert!(drain(&mut rx_a).contains(&Outbound::Event(ServerMessage::UserLeft { id: c.clone() })));
    }

    #[test]
    fn test_kick_unknown_name_changes_nothing() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, _rx_b) = h.connect("b");
        h.join(&a, "R1", "Host", None);
        h.join(&b, "R1", "Bea", None);
        drain(&mut rx_a);

        assert!(!h.store.kick(&a, "Nobody", h.now));
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(h.store.room("R1").unwrap().attendance(), &["Host", "Bea"]);
    }

    #[test]
    fn test_host_cannot_be_kicked() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (t, _rx_t) = h.connect("t");
        h.join(&a, "R1", "Host", None);
        h.join(&t, "R1", "Tara", Some("teacher"));

        assert!(!h.store.kick(&t, "Host", h.now));
        assert_eq!(h.store.room_state("R1"), Some(RoomState::Active));
    }

    #[test]
    fn test_attention_recorded_for_participants_only() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (b, _rx_b) = h.connect("b");
        h.join(&a, "R1", "Host", None);
        h.join(&b, "R1", "Bea", None);

        assert!(h.store.record_attention(&b, None, 80.0));
        assert!(h.store.record_attention(&a, Some("Bea"), 60.0));
        assert!(!h.store.record_attention(&a, None, 90.0));
        assert!(!h.store.record_attention(&b, Some("Nobody"), 90.0));
        assert!(!h.store.record_attention(&b, None, f64::NAN));

        let samples = &h.store.ledger("R1").unwrap().participants()[0].attention_samples;
        assert_eq!(samples, &vec![80.0, 60.0]);
    }

    #[test]
    fn test_relay_to_missing_target_is_silent() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        h.join(&a, "R1", "Host", None);
        drain(&mut rx_a);

        let sent = h.store.relay(SignalKind::Offer, &a, ConnectionId::from("gone"), json!({}), None);
        assert!(!sent);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_chat_reaches_room_only() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, mut rx_b) = h.connect("b");
        let (x, mut rx_x) = h.connect("x");
        h.join(&a, "R1", "Host", None);
        h.join(&b, "R1", "Bea", None);
        h.join(&x, "R2", "Xan", None);
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_x);

        assert_eq!(h.store.chat(&b, json!({"text": "hi"})), 2);
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_x).is_empty());

        assert_eq!(h.store.send_message("R2", "Bea".into(), "hello".into(), None), 1);
        assert_eq!(h.store.send_message("nope", "Bea".into(), "hello".into(), None), 0);
    }
}
