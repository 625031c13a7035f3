use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::FixedOffset;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use super::builder::ReportRequest;
use super::mailer::ReportMailer;
use crate::error::Result;
use crate::session::LedgerSnapshot;

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
    pub timezone: FixedOffset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Host never supplied an email
    Skipped,
    /// Mailed; the artifact has been removed
    Delivered,
    /// Delivery failed; the artifact is left on disk
    Retained(PathBuf),
}

/// Non-blocking hand-off of finished sessions to report generation and delivery
#[derive(Clone)]
pub struct ReportQueue {
    sender: mpsc::UnboundedSender<LedgerSnapshot>,
}

impl ReportQueue {
    /// Creates the queue and spawns its background processor
    pub fn new(mailer: Arc<dyn ReportMailer>, settings: ReportSettings) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(Self::process_reports(mailer, settings, receiver));
        Self { sender }
    }

    /// Queues a snapshot for reporting. Returns false when the report is skipped.
    pub fn submit(&self, snapshot: LedgerSnapshot) -> bool {
        if snapshot.host_email.is_none() {
            tracing::info!(room_id = %snapshot.room_id, "No host email, skipping session report");
            return false;
        }
        tracing::info!(
            room_id = %snapshot.room_id,
            participants = snapshot.participants.len(),
            "Queueing session report"
        );
        if let Err(e) = self.sender.send(snapshot) {
            tracing::error!(error = %e, "Failed to queue session report");
            return false;
        }
        true
    }

    async fn process_reports(
        mailer: Arc<dyn ReportMailer>,
        settings: ReportSettings,
        mut receiver: mpsc::UnboundedReceiver<LedgerSnapshot>,
    ) {
        tracing::info!(output_dir = %settings.output_dir.display(), "Report processor started");

        while let Some(snapshot) = receiver.recv().await {
            match Self::deliver(mailer.as_ref(), &settings, &snapshot).await {
                Ok(DeliveryOutcome::Retained(path)) => tracing::warn!(
                    room_id = %snapshot.room_id,
                    artifact = %path.display(),
                    "Report artifact retained after failed delivery"
                ),
                Ok(_) => {}
                Err(e) => tracing::error!(
                    room_id = %snapshot.room_id,
                    error = %e,
                    "Failed to generate session report"
                ),
            }
        }

        tracing::info!("Report processor stopped");
    }

    /// Builds, writes and mails one report. The artifact is only removed when
    /// delivery succeeds.
    pub async fn deliver(
        mailer: &dyn ReportMailer,
        settings: &ReportSettings,
        snapshot: &LedgerSnapshot,
    ) -> Result<DeliveryOutcome> {
        let Some(request) = ReportRequest::from_snapshot(snapshot, &settings.timezone) else {
            return Ok(DeliveryOutcome::Skipped);
        };

        let artifact = write_artifact(&settings.output_dir, snapshot, &request).await?;

        match mailer.send(&request, &artifact).await {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&artifact).await {
                    tracing::warn!(artifact = %artifact.display(), error = %e, "Failed to remove report artifact");
                }
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                tracing::error!(
                    room_id = %request.room_id,
                    to = %request.host_email,
                    error = %e,
                    "Report delivery failed"
                );
                Ok(DeliveryOutcome::Retained(artifact))
            }
        }
    }
}

const MAX_ARTIFACT_ATTEMPTS: u32 = 100;

/// Writes the CSV under a name no other artifact holds. Retained artifacts from
/// rooms whose ids sanitize alike, or that ended in the same second, get a
/// numeric suffix instead of overwriting each other.
async fn write_artifact(dir: &Path, snapshot: &LedgerSnapshot, request: &ReportRequest) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let stem = artifact_stem(snapshot);
    let contents = request.report.to_csv();

    for attempt in 0..MAX_ARTIFACT_ATTEMPTS {
        let path = match attempt {
            0 => dir.join(format!("{}.csv", stem)),
            n => dir.join(format!("{}-{}.csv", stem, n)),
        };
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(mut file) => {
                file.write_all(contents.as_bytes()).await?;
                file.flush().await?;
                tracing::debug!(artifact = %path.display(), "Wrote report artifact");
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free artifact name for {} in {}", stem, dir.display()),
    )
    .into())
}

fn artifact_stem(snapshot: &LedgerSnapshot) -> String {
    let safe: String = snapshot
        .room_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{}", safe, snapshot.end_time.format("%Y%m%d%H%M%S"))
}
