//! Text-to-Speech adapter and the process-wide sequential queue.
//!
//! Narrows this codebase's multi-backend `TextToSpeech` trait (Kokoro /
//! Edge / Orpheus / Piper / Silence, runtime-selected via a registry) to
//! a single configured provider - this bridge speaks to exactly one TTS
//! vendor per deployment, so the registry/adapter-selection machinery is
//! dropped, but the trait-based adapter shape is kept.

mod provider;
mod queue;

pub use provider::SarvamTtsProvider;
pub use queue::{spawn_queue, TtsQueueHandle};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("invalid text: {0}")]
    InvalidText(String),
}

/// One TTS backend. `synthesize` returns linear PCM16LE @ 8 kHz mono -
/// the format the Frame Pacer expects to re-encode to μ-law.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, language_code: &str) -> Result<Vec<u8>, TtsError>;
}
