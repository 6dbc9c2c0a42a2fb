//! Playback of synthesized phrases on the audio output device.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tts_core::{decode_wav, AudioChunkSet, PcmAudio};

use crate::error::PipelineError;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to open audio output device: {0}")]
    Device(String),

    #[error("audio device error: {0}")]
    Output(String),
}

/// Abstract audio output device.
///
/// Exactly one render may be active at a time; implementations must release
/// the device session before returning so the next commit can acquire it
/// cleanly. A render interrupted by cancellation returns `Ok` — silence is
/// a normal outcome, not a failure.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    async fn render(&self, audio: PcmAudio) -> Result<(), PlaybackError>;
}

/// Renders one phrase's decoded audio to the output device.
pub struct PlaybackSink {
    device: Arc<dyn AudioOutput>,
}

impl PlaybackSink {
    pub fn new(device: Arc<dyn AudioOutput>) -> Self {
        Self { device }
    }

    /// Decode and render one phrase's audio, resolving when the device has
    /// emitted every sample or the render was cancelled. An empty chunk set
    /// resolves immediately as a no-op.
    pub async fn play(&self, chunks: AudioChunkSet) -> Result<(), PipelineError> {
        if chunks.is_empty() {
            debug!(index = chunks.index, "no audio for phrase, skipping playback");
            return Ok(());
        }

        let audio = decode_wav(&chunks.concat())?;
        debug!(
            index = chunks.index,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            duration_ms = audio.duration_ms(),
            "rendering phrase"
        );
        self.device.render(audio).await?;
        Ok(())
    }
}

/// rodio-backed output device.
///
/// The output stream is opened per render and dropped when the render
/// settles, releasing the device for the next phrase. Cancellation stops the
/// sink immediately and discards whatever samples were still buffered.
pub struct RodioOutput {
    cancel: CancellationToken,
}

impl RodioOutput {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    async fn render(&self, audio: PcmAudio) -> Result<(), PlaybackError> {
        let cancel = self.cancel.clone();

        // rodio's output stream is not Send, so the whole device session
        // lives inside one blocking task
        let rendered = tokio::task::spawn_blocking(move || {
            let (_stream, handle) = rodio::OutputStream::try_default()
                .map_err(|e| PlaybackError::Device(e.to_string()))?;
            let sink = rodio::Sink::try_new(&handle)
                .map_err(|e| PlaybackError::Device(e.to_string()))?;

            let buffer =
                rodio::buffer::SamplesBuffer::new(audio.channels, audio.sample_rate, audio.samples);
            sink.append(buffer);

            loop {
                if cancel.is_cancelled() {
                    sink.stop();
                    break;
                }
                if sink.empty() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Ok(())
        })
        .await;

        match rendered {
            Ok(result) => result,
            Err(e) => Err(PlaybackError::Output(format!("render task aborted: {e}"))),
        }
    }
}
