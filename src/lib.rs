//! voicebridge - real-time voice-agent bridge
//!
//! Wires a telephony provider's media-stream WebSocket to a streaming
//! speech-to-text provider, a streaming chat completion LLM, and a
//! text-to-speech provider. See the per-call `orchestrator` module for
//! the core of the system.

pub mod audio;
pub mod config;
pub mod llm;
pub mod logging;
pub mod media;
pub mod orchestrator;
pub mod recording;
pub mod session;
pub mod stt;
pub mod tts;
pub mod utterance;

pub use orchestrator::CallOrchestrator;
pub use session::CallSession;
