//! The batch driver: discover candidates, then for each one download,
//! transcribe, publish, persist, and clean up, isolating failures to the item.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tokio::task;
use tracing::{debug, error, info, warn};

use crate::auth::{ServiceAccountKey, TokenProvider};
use crate::config::PipelineConfig;
use crate::gcs::{discover_audio, AudioObject, GcsClient, ObjectStore};
use crate::model;
use crate::publish::{GoogleDocsPublisher, TranscriptPublisher};
use crate::record::TranscriptRecord;
use crate::store::{LoadedRecord, MetadataStore};
use crate::stt::{SpeechToText, WhisperEngine};

/// Counters for one batch run. `completed` counts skipped items too, so a
/// fully caught-up bucket still reports every file as completed.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub attempted: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Batch finished: attempted={}, completed={}, skipped={}, failed={}",
            self.attempted, self.completed, self.skipped, self.failed
        )
    }
}

enum ItemOutcome {
    /// Freshly transcribed and published this run.
    Published { document_url: String },
    /// A prior run already finished this file.
    AlreadyDone { document_url: String },
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    records: MetadataStore,
    engine: Arc<dyn SpeechToText>,
    publisher: Arc<dyn TranscriptPublisher>,
}

impl Pipeline {
    /// Wire up the real services: credentials, bucket client, model
    /// (downloaded if missing, loaded once), and the Drive/Docs publisher.
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        let http = reqwest::Client::new();

        let key = ServiceAccountKey::from_file(&config.credentials_path)
            .context("Failed to load service-account credentials")?;
        let token = Arc::new(TokenProvider::new(http.clone(), key));

        let store: Arc<dyn ObjectStore> = Arc::new(GcsClient::new(
            http.clone(),
            Arc::clone(&token),
            config.bucket.clone(),
        ));

        let model_file = model::ensure_model(&http, &config.models_dir, config.model_size)
            .await
            .context("Failed to provision the whisper model")?;
        let model_name = config.model_size.to_string();
        let language = config.language.clone();
        let engine =
            task::spawn_blocking(move || WhisperEngine::load(&model_file, &model_name, &language))
                .await
                .context("Model load task failed")??;

        let publisher = GoogleDocsPublisher::new(
            http,
            token,
            config.folder_name.clone(),
            config.root_folder_id.clone(),
        );

        Ok(Self::with_parts(
            config,
            store,
            Arc::new(engine),
            Arc::new(publisher),
        ))
    }

    /// Assemble a pipeline from already-built parts.
    pub fn with_parts(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn SpeechToText>,
        publisher: Arc<dyn TranscriptPublisher>,
    ) -> Self {
        let records = MetadataStore::new(Arc::clone(&store), config.metadata_prefix.clone());
        Self {
            config,
            store,
            records,
            engine,
            publisher,
        }
    }

    /// Process the discovered list exactly once.
    pub async fn run(&self) -> Result<RunSummary> {
        let folder_id = self
            .publisher
            .ensure_folder()
            .await
            .context("Failed to prepare the transcript folder")?;

        let files = discover_audio(
            self.store.as_ref(),
            &self.config.audio_prefix,
            &self.config.audio_suffix,
        )
        .await
        .context("Failed to list source audio")?;

        if files.is_empty() {
            info!(
                "No '{}' files under gs://{}/{}",
                self.config.audio_suffix, self.config.bucket, self.config.audio_prefix
            );
            return Ok(RunSummary::default());
        }

        info!("Found {} audio file(s)", files.len());
        for file in &files {
            debug!("  {} ({} MB)", file.filename, file.size_mb());
        }

        tokio::fs::create_dir_all(&self.config.scratch_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create scratch directory {}",
                    self.config.scratch_dir.display()
                )
            })?;

        let mut summary = RunSummary::default();
        for (index, file) in files.iter().enumerate() {
            info!("[{}/{}] Processing {}", index + 1, files.len(), file.filename);
            summary.attempted += 1;

            let scratch_path = self.config.scratch_dir.join(&file.filename);
            match self.process_item(file, &folder_id, &scratch_path).await {
                Ok(ItemOutcome::AlreadyDone { document_url }) => {
                    summary.completed += 1;
                    summary.skipped += 1;
                    debug!("Already published: {}", document_url);
                }
                Ok(ItemOutcome::Published { document_url }) => {
                    summary.completed += 1;
                    info!("Published: {}", document_url);
                }
                Err(err) => {
                    summary.failed += 1;
                    error!("Failed to process {}: {:#}", file.filename, err);
                    remove_scratch(&scratch_path).await;
                }
            }
        }

        info!("{}", summary);
        Ok(summary)
    }

    async fn process_item(
        &self,
        file: &AudioObject,
        folder_id: &str,
        scratch_path: &Path,
    ) -> Result<ItemOutcome> {
        let mut record = match self.records.load(&file.filename).await? {
            LoadedRecord::Found(record) if record.is_published() => {
                let document_url = record.document_url.clone().unwrap_or_default();
                return Ok(ItemOutcome::AlreadyDone { document_url });
            }
            LoadedRecord::Found(record) => record,
            LoadedRecord::NotFound => TranscriptRecord::new(&file.filename, &file.remote_path),
            LoadedRecord::Corrupt(err) => {
                return Err(anyhow!(err).context(
                    "Metadata record is unreadable; refusing to overwrite it with a blank one",
                ));
            }
        };

        self.store
            .download_to_file(&file.remote_path, scratch_path)
            .await
            .with_context(|| format!("Failed to download '{}'", file.remote_path))?;
        debug!("Downloaded to {}", scratch_path.display());

        let engine = Arc::clone(&self.engine);
        let audio_path = scratch_path.to_path_buf();
        let started = Instant::now();
        let transcription = task::spawn_blocking(move || engine.transcribe_file(&audio_path))
            .await
            .context("Transcription task failed")?
            .with_context(|| format!("Failed to transcribe '{}'", file.filename))?;
        let processing_minutes = started.elapsed().as_secs_f64() / 60.0;
        let duration_minutes = transcription.duration_seconds / 60.0;
        info!(
            "Transcribed {:.1} minutes of audio in {:.1} minutes",
            duration_minutes, processing_minutes
        );

        record.apply_transcription(
            transcription.text,
            transcription.segments,
            self.engine.model_name(),
            duration_minutes,
            processing_minutes,
        );

        let published = self
            .publisher
            .publish(folder_id, &record)
            .await
            .with_context(|| format!("Failed to publish '{}'", record.title))?;
        record.apply_publication(published.document_id, published.document_url.clone());

        self.records
            .save(&record)
            .await
            .context("Failed to persist the metadata record")?;

        remove_scratch(scratch_path).await;
        Ok(ItemOutcome::Published {
            document_url: published.document_url,
        })
    }
}

/// Best-effort deletion of the in-flight audio file.
async fn remove_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed scratch file {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove scratch file {}: {}", path.display(), err),
    }
}
