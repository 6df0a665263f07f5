//! Pipeline configuration, assembled once at startup and passed down.

use std::path::PathBuf;

use crate::model::ModelSize;

/// Everything the batch run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bucket holding both source audio and metadata records.
    pub bucket: String,
    /// Object prefix the source audio lives under.
    pub audio_prefix: String,
    /// Object prefix the metadata records live under.
    pub metadata_prefix: String,
    /// Only objects whose name ends with this are picked up.
    pub audio_suffix: String,
    /// Service-account key file.
    pub credentials_path: PathBuf,
    /// Whisper model size to run.
    pub model_size: ModelSize,
    /// Directory model files are kept in.
    pub models_dir: PathBuf,
    /// Spoken language passed to the model.
    pub language: String,
    /// Drive folder that receives published transcripts.
    pub folder_name: String,
    /// Drive folder id the transcript folder lives under.
    pub root_folder_id: String,
    /// Local scratch directory for the in-flight audio file.
    pub scratch_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: "custom-transcription".to_string(),
            audio_prefix: "audio_files/".to_string(),
            metadata_prefix: "metadata/".to_string(),
            audio_suffix: ".m4a".to_string(),
            credentials_path: PathBuf::from("credentials.json"),
            model_size: ModelSize::Medium,
            models_dir: PathBuf::from("models"),
            language: "en".to_string(),
            folder_name: "Custom Audio Transcripts".to_string(),
            root_folder_id: "136Nmn3gJe0DPVh8p4vUl3oD4-qDNRySh".to_string(),
            scratch_dir: PathBuf::from("temp_audio"),
        }
    }
}
