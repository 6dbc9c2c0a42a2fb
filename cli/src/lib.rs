//! Streaming chat-to-speech pipeline.
//!
//! Text deltas from the model are segmented into phrases, synthesized
//! concurrently, and played back strictly in the order the phrases were
//! spoken by the model.

pub mod config;
pub mod error;
pub mod playback;
pub mod queue;
pub mod segment;
pub mod session;
