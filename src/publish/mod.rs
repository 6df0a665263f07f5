//! Publication of finished transcripts as Google Docs in a Drive folder.

pub mod docs;
pub mod drive;

pub use docs::DocsClient;
pub use drive::DriveClient;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::auth::TokenProvider;
use crate::record::TranscriptRecord;

/// Identifiers of a published transcript document.
#[derive(Debug, Clone)]
pub struct PublishedDocument {
    pub document_id: String,
    pub document_url: String,
}

/// Where finished transcripts go.
#[async_trait]
pub trait TranscriptPublisher: Send + Sync {
    /// Find or create the folder that receives the documents; returns its id.
    async fn ensure_folder(&self) -> Result<String>;

    /// Create a document for the record's transcript inside the folder.
    async fn publish(
        &self,
        folder_id: &str,
        record: &TranscriptRecord,
    ) -> Result<PublishedDocument>;
}

/// Publishes through the Drive and Docs APIs: create the document, move it
/// into the target folder, then insert the formatted content.
pub struct GoogleDocsPublisher {
    drive: DriveClient,
    docs: DocsClient,
    folder_name: String,
    root_folder_id: String,
}

impl GoogleDocsPublisher {
    pub fn new(
        http: reqwest::Client,
        token: Arc<TokenProvider>,
        folder_name: impl Into<String>,
        root_folder_id: impl Into<String>,
    ) -> Self {
        Self::with_clients(
            DriveClient::new(http.clone(), Arc::clone(&token)),
            DocsClient::new(http, token),
            folder_name,
            root_folder_id,
        )
    }

    pub fn with_clients(
        drive: DriveClient,
        docs: DocsClient,
        folder_name: impl Into<String>,
        root_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            drive,
            docs,
            folder_name: folder_name.into(),
            root_folder_id: root_folder_id.into(),
        }
    }
}

#[async_trait]
impl TranscriptPublisher for GoogleDocsPublisher {
    async fn ensure_folder(&self) -> Result<String> {
        self.drive
            .find_or_create_folder(&self.folder_name, &self.root_folder_id)
            .await
            .with_context(|| format!("Failed to prepare folder '{}'", self.folder_name))
    }

    async fn publish(
        &self,
        folder_id: &str,
        record: &TranscriptRecord,
    ) -> Result<PublishedDocument> {
        let title = format!("{} - Transcript", record.title);
        let document_id = self.docs.create_document(&title).await?;
        self.drive.move_file(&document_id, folder_id).await?;
        self.docs
            .insert_text(&document_id, 1, &format_document_body(record))
            .await?;

        let document_url = docs::document_url(&document_id);
        info!("Published '{}' at {}", title, document_url);
        Ok(PublishedDocument {
            document_id,
            document_url,
        })
    }
}

/// Render the document content: a fixed header, a rule, then the transcript.
pub fn format_document_body(record: &TranscriptRecord) -> String {
    let generated = record
        .transcribed_at
        .map(|at| at.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let model = record.model_name.as_deref().unwrap_or("unknown");
    let duration = record.duration_minutes.unwrap_or(0.0);
    let transcript = record.transcript.as_deref().unwrap_or("");

    format!(
        "TRANSCRIPT: {}\nGenerated: {}\nModel: {}\nDuration: {:.1} minutes\n\n{}\n\n{}",
        record.title,
        generated,
        model,
        duration,
        "=".repeat(50),
        transcript,
    )
}
