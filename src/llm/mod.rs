//! Streaming chat-completion LLM driver.
//!
//! Generalises this codebase's `AIProviderAdapter` trait (one-shot
//! request/response across several vendor API styles) into a streaming
//! contract: a provider yields a `Stream` of text deltas rather than a
//! single response, so the incremental segmenter can start feeding TTS
//! before generation finishes.

mod driver;
mod provider;
mod segmenter;

pub use driver::{LlmDriver, LlmTurnOutcome};
pub use provider::{BedrockChatProvider, LlmProvider, LlmStream};
pub use segmenter::Segmenter;

use thiserror::Error;

use crate::session::Role;

/// One chat turn: a `{role, text}` history entry.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("stream ended unexpectedly: {0}")]
    StreamError(String),
}

/// System prompt for the agricultural-advisor persona.
pub const SYSTEM_PROMPT: &str = "Reply in the exact language of the user; 2 short sentences max; no lists; one counter-question at a time when information is missing; refer out-of-scope or abusive queries back to farming; suggest calling the Kisan Call Center (1800-180-1551) when unsure.";
