use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use voicebridge::config::config;
use voicebridge::llm::{BedrockChatProvider, LlmDriver};
use voicebridge::media::{handle_incoming_call, handle_stream_upgrade, AppState};
use voicebridge::stt::WsSttProvider;
use voicebridge::tts::{spawn_queue, SarvamTtsProvider};

#[tokio::main]
async fn main() {
    voicebridge::logging::init();
    let cfg = config();

    let llm_provider = BedrockChatProvider::new(&cfg.aws_region, &cfg.bedrock_model_id).await;
    let llm = Arc::new(LlmDriver::new(Arc::new(llm_provider)));

    let tts_provider = SarvamTtsProvider::new(cfg.sarvam_api_key.clone().unwrap_or_default());
    let tts = spawn_queue(Arc::new(tts_provider));

    let stt: Arc<dyn voicebridge::stt::SttTransport> = Arc::new(WsSttProvider::new(
        cfg.stt_ws_url.clone(),
        cfg.stt_api_key.clone(),
    ));

    let state = AppState { llm, tts, stt };

    let app = Router::new()
        .route("/voice/incoming", post(handle_incoming_call))
        .route("/voice/stream", get(handle_stream_upgrade))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", cfg.port);
    info!("voicebridge listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));
    axum::serve(listener, app)
        .await
        .unwrap_or_else(|e| panic!("server error: {e}"));
}
