//! Whisper model files: naming, location, and on-demand download.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// ggml model files published for whisper.cpp.
const MODEL_HOST: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Even the tiny model is tens of megabytes; anything smaller is an error
/// page or a truncated download.
const MIN_MODEL_BYTES: u64 = 10 * 1024 * 1024;

/// Pretrained model sizes, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// ggml file name for this size, e.g. `ggml-medium.bin`.
    pub fn file_name(&self) -> String {
        format!("ggml-{}.bin", self.as_str())
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Local path a model of this size lives at.
pub fn model_path(models_dir: &Path, size: ModelSize) -> PathBuf {
    models_dir.join(size.file_name())
}

/// Return the local model file, downloading it first if missing.
pub async fn ensure_model(
    http: &reqwest::Client,
    models_dir: &Path,
    size: ModelSize,
) -> Result<PathBuf> {
    ensure_model_from(http, MODEL_HOST, models_dir, size).await
}

/// Same as [`ensure_model`] with an explicit download host.
pub async fn ensure_model_from(
    http: &reqwest::Client,
    host: &str,
    models_dir: &Path,
    size: ModelSize,
) -> Result<PathBuf> {
    let path = model_path(models_dir, size);
    if path.exists() {
        debug!("Model {} already present at {}", size, path.display());
        return Ok(path);
    }

    fs::create_dir_all(models_dir).await.with_context(|| {
        format!("Failed to create model directory {}", models_dir.display())
    })?;

    let url = format!("{}/{}", host, size.file_name());
    info!("Downloading whisper model '{}' from {}", size, url);

    let response = http
        .get(&url)
        .send()
        .await
        .context("Model download request failed")?;
    let status = response.status();
    if !status.is_success() {
        bail!("Model download failed with HTTP {}", status);
    }

    let mut file = fs::File::create(&path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Model download interrupted")?;
        file.write_all(&chunk)
            .await
            .context("Failed to write model file")?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    if written < MIN_MODEL_BYTES {
        let _ = fs::remove_file(&path).await;
        bail!(
            "Downloaded model is truncated ({} bytes), removed {}",
            written,
            path.display()
        );
    }

    info!(
        "Model saved to {} ({} MB)",
        path.display(),
        written / (1024 * 1024)
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn file_names_follow_ggml_convention() {
        assert_eq!(ModelSize::Tiny.file_name(), "ggml-tiny.bin");
        assert_eq!(ModelSize::Medium.file_name(), "ggml-medium.bin");
        assert_eq!(ModelSize::Medium.to_string(), "medium");
    }

    #[tokio::test]
    async fn existing_model_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        let existing = model_path(dir.path(), ModelSize::Base);
        std::fs::write(&existing, b"model bytes").unwrap();

        // An unroutable host proves no request is ever made.
        let http = reqwest::Client::new();
        let path = ensure_model_from(&http, "http://invalid.invalid", dir.path(), ModelSize::Base)
            .await
            .unwrap();
        assert_eq!(path, existing);
    }

    #[tokio::test]
    async fn truncated_download_is_removed_and_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/ggml-tiny.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"<html>quota</html>".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let err = ensure_model_from(&http, &server.uri(), dir.path(), ModelSize::Tiny)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("truncated"));
        assert!(!model_path(dir.path(), ModelSize::Tiny).exists());
    }

    #[tokio::test]
    async fn http_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/ggml-small.bin"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let http = reqwest::Client::new();
        let err = ensure_model_from(&http, &server.uri(), dir.path(), ModelSize::Small)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }
}
