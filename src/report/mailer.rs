use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::builder::ReportRequest;
use crate::config::MailConfig;
use crate::error::{Result, SessionError};

/// Outbound delivery of a finished report. Implementations own transport details.
#[async_trait]
pub trait ReportMailer: Send + Sync {
    async fn send(&self, request: &ReportRequest, artifact: &Path) -> Result<()>;
}

/// Posts reports to an HTTP mail API as a multipart form with the CSV attached
pub struct HttpMailer {
    api_url: String,
    api_key: Option<String>,
    from: String,
    client: reqwest::Client,
}

impl HttpMailer {
    pub fn new(config: &MailConfig) -> Result<Option<Self>> {
        let Some(api_url) = config.api_url.clone() else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SessionError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Some(Self {
            api_url,
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            client,
        }))
    }
}

#[async_trait]
impl ReportMailer for HttpMailer {
    async fn send(&self, request: &ReportRequest, artifact: &Path) -> Result<()> {
        let file_name = artifact
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attendance.csv")
            .to_string();
        let contents = tokio::fs::read(artifact).await?;

        let attachment = Part::bytes(contents)
            .file_name(file_name)
            .mime_str("text/csv")?;

        let form = Form::new()
            .text("from", self.from.clone())
            .text("to", request.host_email.clone())
            .text("subject", request.subject.clone())
            .text("text", request.summary())
            .part("attachment", attachment);

        let mut builder = self.client.post(&self.api_url).multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SessionError::delivery(format!(
                "Mail API returned {}: {}",
                status, error_text
            )));
        }

        tracing::info!(
            room_id = %request.room_id,
            to = %request.host_email,
            "Report delivered"
        );
        Ok(())
    }
}

/// Used when no mail API is configured. Never succeeds, so artifacts stay on disk.
pub struct LogMailer;

#[async_trait]
impl ReportMailer for LogMailer {
    async fn send(&self, request: &ReportRequest, artifact: &Path) -> Result<()> {
        tracing::warn!(
            room_id = %request.room_id,
            to = %request.host_email,
            artifact = %artifact.display(),
            "No mail transport configured, report not sent"
        );
        Err(SessionError::delivery("no mail transport configured"))
    }
}
