use chrono::{DateTime, Utc};

use super::connection::ConnectionId;

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub email: Option<String>,
    pub join_time: DateTime<Utc>,
    pub leave_time: Option<DateTime<Utc>>,
    pub attention_samples: Vec<f64>,
}

impl ParticipantRecord {
    pub fn is_open(&self) -> bool {
        self.leave_time.is_none()
    }
}

/// Per-room attendance and attention log. The host never appears in `participants`.
#[derive(Debug, Clone)]
pub struct SessionLedger {
    pub room_id: String,
    pub host_name: String,
    pub host_email: Option<String>,
    pub start_time: DateTime<Utc>,
    participants: Vec<ParticipantRecord>,
}

/// Frozen copy of a ledger taken when the host leaves
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub room_id: String,
    pub host_name: String,
    pub host_email: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub participants: Vec<ParticipantRecord>,
}

impl SessionLedger {
    pub fn open(
        room_id: &str,
        host_name: &str,
        host_email: Option<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id: room_id.to_string(),
            host_name: host_name.to_string(),
            host_email,
            start_time,
            participants: Vec::new(),
        }
    }

    pub fn participants(&self) -> &[ParticipantRecord] {
        &self.participants
    }

    pub fn record_join(
        &mut self,
        connection_id: ConnectionId,
        display_name: &str,
        email: Option<String>,
        join_time: DateTime<Utc>,
    ) {
        self.participants.push(ParticipantRecord {
            connection_id,
            display_name: display_name.to_string(),
            email,
            join_time,
            leave_time: None,
            attention_samples: Vec::new(),
        });
    }

    fn open_record_mut(&mut self, connection_id: &ConnectionId) -> Option<&mut ParticipantRecord> {
        self.participants
            .iter_mut()
            .rev()
            .find(|record| &record.connection_id == connection_id && record.is_open())
    }

    /// Stamps the leave time on the connection's open record. Returns false if none is open.
    pub fn record_leave(&mut self, connection_id: &ConnectionId, at: DateTime<Utc>) -> bool {
        match self.open_record_mut(connection_id) {
            Some(record) => {
                record.leave_time = Some(at);
                true
            }
            None => false,
        }
    }

    pub fn record_attention(&mut self, connection_id: &ConnectionId, score: f64) -> bool {
        match self.open_record_mut(connection_id) {
            Some(record) => {
                record.attention_samples.push(score);
                true
            }
            None => false,
        }
    }

    /// Closes every record still open and returns how many were stamped
    pub fn close_all(&mut self, at: DateTime<Utc>) -> usize {
        let mut closed = 0;
        for record in self.participants.iter_mut().filter(|r| r.is_open()) {
            record.leave_time = Some(at);
            closed += 1;
        }
        closed
    }

    pub fn snapshot(&self, end_time: DateTime<Utc>) -> LedgerSnapshot {
        LedgerSnapshot {
            room_id: self.room_id.clone(),
            host_name: self.host_name.clone(),
            host_email: self.host_email.clone(),
            start_time: self.start_time,
            end_time,
            participants: self.participants.clone(),
        }
    }
}
