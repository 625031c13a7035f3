use chrono::{DateTime, FixedOffset, Utc};

use crate::session::{LedgerSnapshot, ParticipantRecord};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %I:%M:%S %p";
const CSV_HEADER: [&str; 6] = [
    "Name",
    "Email",
    "Join Time",
    "Leave Time",
    "Duration (min)",
    "Average Attention",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub name: String,
    pub email: String,
    pub join_time: String,
    pub leave_time: String,
    pub duration_minutes: i64,
    pub average_attention: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub rows: Vec<ReportRow>,
}

/// Everything the mail collaborator needs to deliver one report
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub room_id: String,
    pub host_email: String,
    pub host_name: String,
    pub subject: String,
    pub started_at: String,
    pub ended_at: String,
    pub report: SessionReport,
}

impl ReportRequest {
    /// `None` when the host never supplied an email
    pub fn from_snapshot(snapshot: &LedgerSnapshot, timezone: &FixedOffset) -> Option<Self> {
        let host_email = snapshot.host_email.clone()?;
        Some(Self {
            room_id: snapshot.room_id.clone(),
            host_email,
            host_name: snapshot.host_name.clone(),
            subject: format!("Session report for room {}", snapshot.room_id),
            started_at: render_time(snapshot.start_time, timezone),
            ended_at: render_time(snapshot.end_time, timezone),
            report: build_report(snapshot, timezone),
        })
    }

    /// Plain-text body accompanying the attachment
    pub fn summary(&self) -> String {
        format!(
            "Hello {},\n\nAttached is the attendance report for room {}.\nSession started: {}\nSession ended: {}\nParticipants: {}\n",
            self.host_name,
            self.room_id,
            self.started_at,
            self.ended_at,
            self.report.rows.len()
        )
    }
}

pub fn build_report(snapshot: &LedgerSnapshot, timezone: &FixedOffset) -> SessionReport {
    let rows = snapshot
        .participants
        .iter()
        .map(|record| build_row(record, snapshot.end_time, timezone))
        .collect();
    SessionReport { rows }
}

fn build_row(record: &ParticipantRecord, end_time: DateTime<Utc>, timezone: &FixedOffset) -> ReportRow {
    let leave_time = record.leave_time.unwrap_or(end_time);
    ReportRow {
        name: record.display_name.clone(),
        email: record.email.clone().unwrap_or_default(),
        join_time: render_time(record.join_time, timezone),
        leave_time: render_time(leave_time, timezone),
        duration_minutes: duration_minutes(record.join_time, leave_time),
        average_attention: average_attention(&record.attention_samples),
    }
}

pub fn duration_minutes(join: DateTime<Utc>, leave: DateTime<Utc>) -> i64 {
    let millis = (leave - join).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as i64
}

/// Mean of the samples, rounded; 0 when there are none
pub fn average_attention(samples: &[f64]) -> i64 {
    if samples.is_empty() {
        return 0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    mean.round() as i64
}

pub fn render_time(at: DateTime<Utc>, timezone: &FixedOffset) -> String {
    at.with_timezone(timezone).format(TIMESTAMP_FORMAT).to_string()
}

impl SessionReport {
    pub fn to_csv(&self) -> String {
        let mut out = CSV_HEADER.join(",");
        out.push('\n');
        for row in &self.rows {
            let fields = [
                escape_field(&row.name),
                escape_field(&row.email),
                escape_field(&row.join_time),
                escape_field(&row.leave_time),
                row.duration_minutes.to_string(),
                row.average_attention.to_string(),
            ];
            out.push_str(&fields.join(","));
            out.push('\n');
        }
        out
    }
}

fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
