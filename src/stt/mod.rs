//! Speech-to-Text session manager.
//!
//! Mirrors this codebase's STT adapter trait convention (`SpeechToText` /
//! `STTError` in `voice::stt`), generalised from a one-shot
//! transcribe-a-buffer call to a long-lived streaming upstream
//! connection with a reconnect policy.

mod provider;
mod session;

pub use provider::WsSttProvider;
pub use session::{
    PcmBuffer, SttConnEvent, SttConnection, SttEvent, SttSession, SttSessionHandle, SttTransport,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    #[error("upstream connect failed: {0}")]
    ConnectFailed(String),
}
