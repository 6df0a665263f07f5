//! Persistent per-file processing state.
//!
//! One record exists per source audio file, stored as a JSON object under the
//! metadata prefix of the bucket. The record is the pipeline's only durable
//! state: a record that is `completed` and carries a document URL is what lets
//! a re-run skip work it already did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Known to the store but not yet transcribed.
    Pending,
    /// Transcript produced; document not yet published.
    Transcribed,
    /// Transcript published as a document.
    Completed,
}

/// One timestamped span of the transcript, in seconds from the start of the audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Durable record tracking one source file through the pipeline.
///
/// Output fields stay unset until the stage that produces them succeeds, and
/// are omitted from the stored JSON while unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Source object basename, e.g. `interview.m4a`.
    pub filename: String,
    /// Display title: the filename without its audio extension.
    pub title: String,
    /// Full object path of the source audio within the bucket.
    pub remote_path: String,
    /// When this record was first created.
    pub created_at: DateTime<Utc>,
    pub status: RecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<TranscriptSegment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcribed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_url: Option<String>,
}

impl TranscriptRecord {
    /// Fresh record for a file seen for the first time.
    pub fn new(filename: &str, remote_path: &str) -> Self {
        Self {
            filename: filename.to_string(),
            title: file_stem(filename).to_string(),
            remote_path: remote_path.to_string(),
            created_at: Utc::now(),
            status: RecordStatus::Pending,
            transcript: None,
            segments: None,
            model_name: None,
            transcribed_at: None,
            duration_minutes: None,
            processing_time_minutes: None,
            document_id: None,
            document_url: None,
        }
    }

    /// Whether a prior run already published this file's transcript.
    pub fn is_published(&self) -> bool {
        self.status == RecordStatus::Completed && self.document_url.is_some()
    }

    /// Store the output of a finished transcription pass.
    pub fn apply_transcription(
        &mut self,
        transcript: String,
        segments: Vec<TranscriptSegment>,
        model_name: &str,
        duration_minutes: f64,
        processing_minutes: f64,
    ) {
        self.transcript = Some(transcript);
        self.segments = Some(segments);
        self.model_name = Some(model_name.to_string());
        self.transcribed_at = Some(Utc::now());
        self.duration_minutes = Some(duration_minutes);
        self.processing_time_minutes = Some(processing_minutes);
        self.status = RecordStatus::Transcribed;
    }

    /// Store the identifiers of the published document.
    pub fn apply_publication(&mut self, document_id: String, document_url: String) {
        self.document_id = Some(document_id);
        self.document_url = Some(document_url);
        self.status = RecordStatus::Completed;
    }
}

/// Filename without its final extension; unchanged when there is none.
pub fn file_stem(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => filename,
    }
}
