use thiserror::Error;

use crate::playback::PlaybackError;
use tts_core::{DecodeError, SynthesisError};

/// Per-stage failure taxonomy for the pipeline.
///
/// Synthesis, decode and playback failures are phrase-local: the queue logs
/// them and keeps going, so one bad phrase never stalls the ones behind it.
/// A text source failure is fatal to the session, but only after the pending
/// phrase is flushed and the enqueued tasks have drained.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("text source failed: {0}")]
    TextSource(anyhow::Error),

    #[error("playback queue stopped before draining")]
    QueueClosed,
}
