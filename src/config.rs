//! Process configuration - loaded once from the environment.
//!
//! Mirrors this codebase's `secrets` module: a lazily-initialised,
//! process-global config object. Unlike that module, there is no
//! `~/.continuum/config.env` file convention here - this bridge reads
//! plain environment variables only.

use std::env;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Recognised environment configuration, per the external interfaces spec.
#[derive(Debug, Clone)]
pub struct Config {
    pub aws_region: String,
    pub bedrock_model_id: String,
    pub sarvam_api_key: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub base_url: String,
    pub port: u16,
    pub debug_llm_prompt: bool,
    /// Streaming STT upstream WebSocket URL and API key. Not named in
    /// the external-interfaces list verbatim, but required to build a
    /// working `SttTransport` - added as part of the ambient config
    /// surface.
    pub stt_ws_url: String,
    pub stt_api_key: Option<String>,
}

impl Config {
    fn load() -> Self {
        Self {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bedrock_model_id: env::var("BEDROCK_MODEL_ID")
                .unwrap_or_else(|_| "anthropic.claude-3-haiku-20240307-v1:0".to_string()),
            sarvam_api_key: env::var("SARVAM_API_KEY").ok(),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").ok(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").ok(),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            debug_llm_prompt: env::var("DEBUG_LLM_PROMPT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            stt_ws_url: env::var("STT_WS_URL")
                .unwrap_or_else(|_| "wss://api.sarvam.ai/speech-to-text/ws".to_string()),
            stt_api_key: env::var("STT_API_KEY").ok().or_else(|| env::var("SARVAM_API_KEY").ok()),
        }
    }

    /// WebSocket URL the telephony control document should point callers at.
    pub fn stream_ws_url(&self) -> String {
        let without_scheme = self
            .base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        format!("wss://{without_scheme}/voice/stream")
    }
}

/// Get the global config, loading it from the environment on first call.
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::load)
}
