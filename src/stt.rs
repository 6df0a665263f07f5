//! Speech to text via whisper.cpp.

use std::path::Path;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::{self, WHISPER_SAMPLE_RATE};
use crate::record::TranscriptSegment;

const INFERENCE_THREADS: i32 = 4;

/// Transcription of one audio file.
#[derive(Debug, Clone)]
pub struct FileTranscription {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    /// Length of the source audio in seconds.
    pub duration_seconds: f64,
}

/// The pipeline's contract with the model: a local audio file in, text plus
/// timestamped segments and the audio duration out.
pub trait SpeechToText: Send + Sync {
    /// Identifier recorded alongside transcripts, e.g. `medium`.
    fn model_name(&self) -> &str;

    /// Decode and transcribe one local audio file. Blocks for the whole
    /// inference; call it on a blocking thread from async code.
    fn transcribe_file(&self, path: &Path) -> Result<FileTranscription>;
}

/// whisper.cpp engine, loaded once per run and reused across every file.
pub struct WhisperEngine {
    ctx: WhisperContext,
    model_name: String,
    language: String,
}

impl WhisperEngine {
    /// Load a ggml model from disk. Expensive; do it once.
    pub fn load(model_path: &Path, model_name: &str, language: &str) -> Result<Self> {
        if !model_path.exists() {
            bail!("Model file {} does not exist", model_path.display());
        }

        info!("Loading whisper model from {}", model_path.display());
        let ctx = WhisperContext::new_with_params(
            &model_path.to_string_lossy(),
            WhisperContextParameters::default(),
        )
        .map_err(|e| anyhow!("Failed to load whisper model: {}", e))?;
        info!("Whisper model loaded");

        Ok(Self {
            ctx,
            model_name: model_name.to_string(),
            language: language.to_string(),
        })
    }

    /// Run inference over mono samples at [`WHISPER_SAMPLE_RATE`].
    pub fn transcribe_samples(&self, samples: &[f32]) -> Result<(String, Vec<TranscriptSegment>)> {
        if samples.is_empty() {
            bail!("No audio samples to transcribe");
        }
        debug!(
            "Transcribing {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / WHISPER_SAMPLE_RATE as f32
        );

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_n_threads(INFERENCE_THREADS);
        params.set_language(Some(&self.language));
        params.set_translate(false);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(false);
        params.set_no_context(true);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| anyhow!("Failed to create whisper state: {}", e))?;
        state
            .full(params, samples)
            .map_err(|e| anyhow!("Whisper inference failed: {}", e))?;

        let num_segments = state
            .full_n_segments()
            .map_err(|e| anyhow!("Failed to read segment count: {}", e))?;

        let mut segments = Vec::with_capacity(num_segments as usize);
        let mut text = String::new();
        for i in 0..num_segments {
            let segment_text = state
                .full_get_segment_text(i)
                .map_err(|e| anyhow!("Failed to read segment {}: {}", i, e))?;
            // Timestamps come back in centiseconds.
            let start = state
                .full_get_segment_t0(i)
                .map_err(|e| anyhow!("Failed to read segment {} start: {}", i, e))?
                as f64
                / 100.0;
            let end = state
                .full_get_segment_t1(i)
                .map_err(|e| anyhow!("Failed to read segment {} end: {}", i, e))?
                as f64
                / 100.0;

            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment_text.trim());
            segments.push(TranscriptSegment::new(start, end, segment_text.trim()));
        }

        debug!(
            "Transcription produced {} segments, {} chars",
            segments.len(),
            text.len()
        );
        Ok((text.trim().to_string(), segments))
    }
}

impl SpeechToText for WhisperEngine {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn transcribe_file(&self, path: &Path) -> Result<FileTranscription> {
        let decoded = audio::decode_audio(path)?;
        let (text, segments) = self.transcribe_samples(&decoded.samples)?;
        Ok(FileTranscription {
            text,
            segments,
            duration_seconds: decoded.duration_seconds,
        })
    }
}

// Safety: WhisperContext is thread-safe for inference
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}
