//! Command-line entry point for the transcription pipeline.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use cloud_transcriber::{ModelSize, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "cloud-transcriber")]
#[command(about = "Transcribes bucket-hosted audio and publishes Google Docs")]
#[command(version)]
pub struct Args {
    /// Service-account credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Bucket holding the audio and metadata objects
    #[arg(long, default_value = "custom-transcription")]
    pub bucket: String,

    /// Object prefix the source audio lives under
    #[arg(long, default_value = "audio_files/")]
    pub audio_prefix: String,

    /// Object prefix the metadata records live under
    #[arg(long, default_value = "metadata/")]
    pub metadata_prefix: String,

    /// Only process objects ending in this suffix
    #[arg(long, default_value = ".m4a")]
    pub audio_suffix: String,

    /// Whisper model size
    #[arg(long, value_enum, default_value = "medium")]
    pub model_size: ModelSize,

    /// Directory the model files are kept in
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Spoken language passed to the model
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Drive folder that receives the transcripts
    #[arg(long, default_value = "Custom Audio Transcripts")]
    pub folder_name: String,

    /// Drive folder id the transcript folder is created under
    #[arg(long, default_value = "136Nmn3gJe0DPVh8p4vUl3oD4-qDNRySh")]
    pub root_folder_id: String,

    /// Local scratch directory for in-flight audio files
    #[arg(long, default_value = "temp_audio")]
    pub scratch_dir: PathBuf,

    /// Power the host off after a batch that completed at least one file
    #[arg(long)]
    pub shutdown: bool,

    /// Seconds to wait before powering off (Ctrl+C cancels)
    #[arg(long, default_value = "60")]
    pub shutdown_delay: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl Args {
    fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            bucket: self.bucket.clone(),
            audio_prefix: self.audio_prefix.clone(),
            metadata_prefix: self.metadata_prefix.clone(),
            audio_suffix: self.audio_suffix.clone(),
            credentials_path: self.credentials.clone(),
            model_size: self.model_size,
            models_dir: self.models_dir.clone(),
            language: self.language.clone(),
            folder_name: self.folder_name.clone(),
            root_folder_id: self.root_folder_id.clone(),
            scratch_dir: self.scratch_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level: tracing::Level = args.log_level.into();
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("Starting cloud-transcriber v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Bucket: gs://{}/{}", args.bucket, args.audio_prefix);
    info!("  Metadata prefix: {}", args.metadata_prefix);
    info!("  Model: {} (dir: {})", args.model_size, args.models_dir.display());
    info!("  Transcript folder: {}", args.folder_name);
    if args.shutdown {
        info!("  Shutdown after batch: yes ({}s delay)", args.shutdown_delay);
    }

    let pipeline = Pipeline::new(args.to_config())
        .await
        .context("Failed to initialize the pipeline")?;

    let summary = pipeline.run().await.context("Batch run failed")?;

    if args.shutdown && summary.completed > 0 {
        power_off_after(Duration::from_secs(args.shutdown_delay)).await;
    }

    Ok(())
}

/// Waits out the delay, then powers the host off. Ctrl+C during the delay
/// cancels the shutdown and leaves the host running.
async fn power_off_after(delay: Duration) {
    info!("Powering off in {}s; press Ctrl+C to cancel", delay.as_secs());
    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            match tokio::process::Command::new("sudo")
                .args(["shutdown", "-h", "now"])
                .status()
                .await
            {
                Ok(status) if status.success() => info!("Shutdown command issued"),
                Ok(status) => error!("Shutdown command exited with {}", status),
                Err(err) => error!("Failed to run shutdown command: {}", err),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["cloud-transcriber"]);

        assert_eq!(args.bucket, "custom-transcription");
        assert_eq!(args.audio_prefix, "audio_files/");
        assert_eq!(args.audio_suffix, ".m4a");
        assert!(matches!(args.model_size, ModelSize::Medium));
        assert!(!args.shutdown);
        assert_eq!(args.shutdown_delay, 60);
        assert!(matches!(args.log_level, LogLevel::Info));
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from([
            "cloud-transcriber",
            "--bucket",
            "my-audio",
            "--model-size",
            "small",
            "--audio-prefix",
            "incoming/",
            "--shutdown",
            "--shutdown-delay",
            "10",
            "--log-level",
            "debug",
        ]);

        assert_eq!(args.bucket, "my-audio");
        assert!(matches!(args.model_size, ModelSize::Small));
        assert!(args.shutdown);
        assert_eq!(args.shutdown_delay, 10);
        assert!(matches!(args.log_level, LogLevel::Debug));

        let config = args.to_config();
        assert_eq!(config.bucket, "my-audio");
        assert_eq!(config.audio_prefix, "incoming/");
        assert_eq!(config.model_size, ModelSize::Small);
    }
}
