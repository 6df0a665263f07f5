//! cloud-transcriber - batch transcription of bucket-hosted audio
//!
//! This crate pulls audio files from a Cloud Storage bucket, transcribes
//! them locally with whisper.cpp, publishes each transcript as a Google Doc
//! in a Drive folder, and tracks per-file state as JSON records in the same
//! bucket. It features:
//!
//! - One durable metadata record per source file; completed records are
//!   skipped on re-runs
//! - On-demand model download; the model is loaded once and reused for the
//!   whole batch
//! - Per-item failure isolation: one bad file never stops the batch
//!
//! # Example
//!
//! ```no_run
//! use cloud_transcriber::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(PipelineConfig::default()).await?;
//!     let summary = pipeline.run().await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod auth;
pub mod config;
pub mod gcs;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod record;
pub mod store;
pub mod stt;

pub use config::PipelineConfig;
pub use gcs::{discover_audio, AudioObject, GcsClient, ObjectStore};
pub use model::ModelSize;
pub use pipeline::{Pipeline, RunSummary};
pub use record::{RecordStatus, TranscriptRecord, TranscriptSegment};
pub use store::{LoadedRecord, MetadataStore};
pub use stt::{SpeechToText, WhisperEngine};
