use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::connection::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Active,
    /// Host has left; state is retained until the grace period elapses
    Draining,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    /// Distinguishes this instance from earlier rooms that used the same id
    pub generation: u64,
    pub host: ConnectionId,
    pub state: RoomState,
    pub created_at: DateTime<Utc>,
    members: Vec<ConnectionId>,
    attendance: Vec<String>,
    /// Display name -> the connection currently holding it.
    ///
    /// Names are client-asserted; this is a weak identity key, not authentication.
    names: HashMap<String, ConnectionId>,
}

impl Room {
    fn new(id: String, generation: u64, host: ConnectionId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            generation,
            host,
            state: RoomState::Active,
            created_at,
            members: Vec::new(),
            attendance: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn is_host(&self, id: &ConnectionId) -> bool {
        &self.host == id
    }

    pub fn is_active(&self) -> bool {
        self.state == RoomState::Active
    }

    /// Members in join order
    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn attendance(&self) -> &[String] {
        &self.attendance
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ConnectionId> {
        self.names.get(name)
    }

    pub fn peers_of<'a>(&'a self, id: &'a ConnectionId) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.members.iter().filter(move |member| *member != id)
    }

    pub fn add_member(&mut self, id: ConnectionId, name: &str) {
        if !self.members.contains(&id) {
            self.members.push(id.clone());
        }
        self.names.insert(name.to_string(), id);
        if !self.attendance.iter().any(|n| n == name) {
            self.attendance.push(name.to_string());
        }
    }

    /// Removes a member. The name leaves attendance only when no other
    /// member still holds it.
    pub fn remove_member(&mut self, id: &ConnectionId, name: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member != id);
        let removed = self.members.len() != before;

        let still_held = match self.names.get(name) {
            Some(holder) if holder == id => {
                self.names.remove(name);
                false
            }
            Some(holder) => self.members.contains(holder),
            None => false,
        };
        if !still_held {
            self.attendance.retain(|n| n != name);
        }
        removed
    }

    /// Empties the room on entry to Draining
    pub fn drain(&mut self) -> Vec<ConnectionId> {
        self.state = RoomState::Draining;
        self.names.clear();
        self.attendance.clear();
        std::mem::take(&mut self.members)
    }
}

/// Live rooms keyed by their externally supplied id
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    next_generation: u64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, id: &str, host: ConnectionId, now: DateTime<Utc>) -> &mut Room {
        self.next_generation += 1;
        let room = Room::new(id.to_string(), self.next_generation, host, now);
        tracing::info!(room_id = %id, generation = room.generation, "Room created");
        match self.rooms.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(room);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(room),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Room> {
        self.rooms.remove(id)
    }

    /// Removes the room only if it is still the instance identified by `generation`
    pub fn remove_generation(&mut self, id: &str, generation: u64) -> Option<Room> {
        match self.rooms.get(id) {
            Some(room) if room.generation == generation => self.rooms.remove(id),
            _ => None,
        }
    }

    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}
