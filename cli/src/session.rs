//! One end-to-end prompt/reply/playback interaction.

use std::sync::Arc;

use futures_util::{pin_mut, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use tts_core::{AudioChunkSet, SynthesisStage};

use crate::error::PipelineError;
use crate::playback::PlaybackSink;
use crate::queue::SequencedQueue;
use crate::segment::{Phrase, PhraseSegmenter};

/// What one session produced.
///
/// The transcript is kept even when the session ends with an error, so the
/// text side can still be shown and saved.
pub struct SessionOutcome {
    pub transcript: String,
    pub error: Option<PipelineError>,
}

/// Owns the per-session pipeline state: the segmenter's pending buffer, the
/// ordered task queue, and the cancellation flag.
pub struct PipelineSession {
    synth: Arc<SynthesisStage>,
    sink: Arc<PlaybackSink>,
    cancel: CancellationToken,
}

impl PipelineSession {
    pub fn new(synth: Arc<SynthesisStage>, sink: Arc<PlaybackSink>, cancel: CancellationToken) -> Self {
        Self { synth, sink, cancel }
    }

    /// Drive a stream of reply deltas through the full pipeline: segment
    /// into phrases, synthesize phrases concurrently, play audio strictly in
    /// phrase order. Resolves once every enqueued phrase has settled.
    ///
    /// `on_delta` is invoked for each delta in arrival order (the CLI echoes
    /// them to the terminal).
    ///
    /// A text source failure ends segmentation but still flushes the pending
    /// phrase and drains the queue before the outcome is returned.
    pub async fn run<S, F>(&self, deltas: S, on_delta: F) -> SessionOutcome
    where
        S: Stream<Item = anyhow::Result<String>>,
        F: Fn(&str),
    {
        let queue = SequencedQueue::new();
        let mut segmenter = PhraseSegmenter::new();
        let mut transcript = String::new();
        let mut session_error = None;

        pin_mut!(deltas);
        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    on_delta(&text);
                    transcript.push_str(&text);
                    for phrase in segmenter.feed(&text) {
                        self.enqueue_phrase(&queue, phrase);
                    }
                }
                Err(e) => {
                    // fatal for the text side; phrases already enqueued
                    // still play out below
                    error!(error = %e, "text source failed, ending segmentation");
                    session_error = Some(PipelineError::TextSource(e));
                    break;
                }
            }
        }

        if let Some(phrase) = segmenter.flush() {
            self.enqueue_phrase(&queue, phrase);
        }

        if let Err(e) = queue.drain().await {
            error!(error = %e, "playback queue did not drain cleanly");
            session_error.get_or_insert(e);
        }

        SessionOutcome {
            transcript,
            error: session_error,
        }
    }

    fn enqueue_phrase(&self, queue: &SequencedQueue<AudioChunkSet>, phrase: Phrase) {
        debug!(index = phrase.index, text = %phrase.text, "phrase ready for synthesis");

        let synth = Arc::clone(&self.synth);
        let sink = Arc::clone(&self.sink);
        let cancel = self.cancel.clone();
        let Phrase { index, text } = phrase;

        queue.enqueue(
            // prepare: may finish out of order with its neighbours
            async move { Ok(synth.synthesize(index, &text).await?) },
            // commit: runs only once every earlier phrase has finished
            move |audio| async move {
                if cancel.is_cancelled() {
                    debug!(index, "session cancelled, settling phrase silently");
                    return Ok(());
                }
                sink.play(audio).await
            },
        );
    }
}
