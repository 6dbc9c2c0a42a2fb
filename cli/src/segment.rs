//! Phrase segmentation of an incrementally arriving text stream.

/// Sentence terminator used for phrase boundaries.
///
/// Only the full stop is a boundary; other sentence punctuation is
/// deliberately left inside phrases because the synthesizer handles it
/// better as intra-phrase prosody.
const TERMINATOR: char = '.';

/// A complete unit of text selected for independent speech synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    /// Monotonic sequence index, assigned at emission time.
    pub index: u64,
    pub text: String,
}

/// Splits a growing text buffer into complete phrases, holding the
/// unfinished tail until more text (or end of stream) arrives.
///
/// Pure state machine: no I/O, cannot fail.
#[derive(Debug, Default)]
pub struct PhraseSegmenter {
    pending: String,
    next_index: u64,
}

impl PhraseSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unresolved tail: text after the last terminator seen so far.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Append a delta and return the complete phrases it unlocked.
    ///
    /// Everything before the last terminator splits into phrases; embedded
    /// line breaks collapse into the terminator so a mid-phrase newline does
    /// not abort the sentence boundary. Phrases that are empty after
    /// trimming are discarded (a delta of bare terminators emits nothing).
    pub fn feed(&mut self, delta: &str) -> Vec<Phrase> {
        self.pending.push_str(delta);

        let mut segments: Vec<&str> = self.pending.split(TERMINATOR).collect();
        // the last segment is the new phrase-in-progress
        let tail = segments.pop().unwrap_or_default().to_string();

        let mut phrases = Vec::new();
        for segment in segments {
            let text = segment.replace('\n', ".");
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            phrases.push(Phrase {
                index: self.next_index,
                text: text.to_string(),
            });
            self.next_index += 1;
        }

        self.pending = tail;
        phrases
    }

    /// Emit the trimmed tail as a final phrase at end of stream.
    pub fn flush(&mut self) -> Option<Phrase> {
        let tail = std::mem::take(&mut self.pending);
        let text = tail.trim();
        if text.is_empty() {
            return None;
        }
        let phrase = Phrase {
            index: self.next_index,
            text: text.to_string(),
        };
        self.next_index += 1;
        Some(phrase)
    }
}
