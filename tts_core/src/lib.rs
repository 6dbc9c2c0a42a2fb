mod wav;

pub use wav::{decode_wav, DecodeError, PcmAudio};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use thiserror::Error;
use tracing::debug;

/// Failure of the remote synthesis call for a single phrase.
///
/// Carries the offending phrase text so the caller can report which part of
/// the reply lost its audio.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis request failed for phrase {phrase:?}: {source}")]
    Transport {
        phrase: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("synthesis service rejected phrase {phrase:?} with status {status}")]
    Service { phrase: String, status: u16 },
}

impl SynthesisError {
    pub fn phrase(&self) -> &str {
        match self {
            SynthesisError::Transport { phrase, .. } => phrase,
            SynthesisError::Service { phrase, .. } => phrase,
        }
    }
}

/// Ordered raw audio buffers for one phrase, tagged with its sequence index.
#[derive(Debug, Clone, Default)]
pub struct AudioChunkSet {
    pub index: u64,
    pub chunks: Vec<Bytes>,
}

impl AudioChunkSet {
    pub fn empty(index: u64) -> Self {
        Self {
            index,
            chunks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenate all chunks into one contiguous buffer for decoding.
    pub fn concat(&self) -> Vec<u8> {
        let total: usize = self.chunks.iter().map(|c| c.len()).sum();
        let mut out = Vec::with_capacity(total);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }
}

/// Remote speech service: cleaned phrase text and a voice id in, raw audio
/// byte chunks (a wav container) out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn fetch_speech(&self, text: &str, voice: &str) -> Result<Vec<Bytes>, SynthesisError>;
}

/// HTTP client for an OpenTTS-compatible `/api/tts` endpoint.
pub struct OpenTtsClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenTtsClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenTtsClient {
    async fn fetch_speech(&self, text: &str, voice: &str) -> Result<Vec<Bytes>, SynthesisError> {
        let url = format!("{}/api/tts", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("voice", voice), ("text", text), ("cache", "true")])
            .send()
            .await
            .map_err(|source| SynthesisError::Transport {
                phrase: text.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Service {
                phrase: text.to_string(),
                status: status.as_u16(),
            });
        }

        let mut body = response.bytes_stream();
        let mut chunks = Vec::new();
        while let Some(item) = body.next().await {
            let chunk = item.map_err(|source| SynthesisError::Transport {
                phrase: text.to_string(),
                source,
            })?;
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

/// Converts one phrase of text into synthesized audio chunks.
///
/// Many phrases may be in flight at once; each call is independent and may
/// fail independently.
pub struct SynthesisStage {
    service: Arc<dyn SpeechSynthesizer>,
    voice: String,
}

impl SynthesisStage {
    pub fn new(service: Arc<dyn SpeechSynthesizer>, voice: impl Into<String>) -> Self {
        Self {
            service,
            voice: voice.into(),
        }
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Synthesize one phrase.
    ///
    /// Markdown artifacts are stripped first and a terminator is appended so
    /// the speech comes to a natural stop. A phrase that is empty after
    /// cleaning short-circuits to an empty chunk set without touching the
    /// service. All-zero chunks received from the service are padding, not
    /// audio, and are dropped.
    pub async fn synthesize(&self, index: u64, text: &str) -> Result<AudioChunkSet, SynthesisError> {
        let cleaned = clean_for_speech(text);
        if cleaned.is_empty() {
            debug!(index, "phrase empty after cleaning, skipping synthesis");
            return Ok(AudioChunkSet::empty(index));
        }

        let spoken = format!("{cleaned}.");
        let raw = self.service.fetch_speech(&spoken, &self.voice).await?;

        let mut chunks = Vec::with_capacity(raw.len());
        for chunk in raw {
            if is_silence(&chunk) {
                debug!(index, len = chunk.len(), "dropping all-zero padding chunk");
                continue;
            }
            chunks.push(chunk);
        }
        Ok(AudioChunkSet { index, chunks })
    }
}

/// Strip markdown artifacts the upstream text generator leaks into prose.
/// Newlines, emphasis markers and horizontal rules must not be spoken.
pub fn clean_for_speech(text: &str) -> String {
    text.replace('\n', "")
        .replace("**", "")
        .replace("---", "")
        .trim()
        .to_string()
}

/// A chunk made entirely of zero bytes is synthesis-service padding.
fn is_silence(chunk: &[u8]) -> bool {
    chunk.iter().all(|&b| b == 0)
}
