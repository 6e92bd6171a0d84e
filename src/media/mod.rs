//! Media Adapter - parses/emits the telephony WS control+media JSON and
//! owns the call lifecycle. Delegates audio/STT/LLM/TTS
//! wiring to `CallOrchestrator`; this module only knows the wire
//! protocol.
//!
//! Same shape as a typical Twilio media-stream handler: `StreamEvent`
//! enum mirroring the wire discriminator, a `tokio::select!` reader +
//! response-channel-writer loop so the WS read never blocks on the
//! pipeline, and spawning per-utterance work off the reader task.

pub mod incoming;
pub mod pacer;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use incoming::handle_incoming_call;

use crate::llm::LlmDriver;
use crate::orchestrator::CallOrchestrator;
use crate::recording::Recorder;
use crate::stt::SttTransport;
use crate::tts::TtsQueueHandle;

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<LlmDriver>,
    pub tts: TtsQueueHandle,
    pub stt: Arc<dyn SttTransport>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum StreamEvent {
    Connected {
        #[serde(default)]
        #[allow(dead_code)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid")]
        #[allow(dead_code)]
        stream_sid: String,
        start: StartMetadata,
    },
    Media {
        #[serde(rename = "streamSid")]
        #[allow(dead_code)]
        stream_sid: String,
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid")]
        #[allow(dead_code)]
        stream_sid: String,
    },
}

#[derive(Debug, Deserialize)]
struct StartMetadata {
    #[serde(rename = "callSid")]
    call_sid: String,
    #[serde(rename = "streamSid")]
    stream_sid: String,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

pub async fn handle_stream_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(mut socket: WebSocket, state: AppState) {
    info!("telephony media stream connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(256);
    let mut orchestrator = CallOrchestrator::new(state.llm, state.tts, state.stt);
    let mut recorder = Recorder::new(orchestrator.session_id());

    loop {
        tokio::select! {
            biased;

            ws_msg = socket.recv() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<StreamEvent>(&text) {
                            Ok(StreamEvent::Connected { .. }) => {
                                debug!("stream connected handshake");
                            }
                            Ok(StreamEvent::Start { start, .. }) => {
                                info!(call_sid = %start.call_sid, stream_sid = %start.stream_sid, "stream started");
                                orchestrator.on_start(start.stream_sid, start.call_sid).await;
                                orchestrator.send_welcome(outbound_tx.clone());
                            }
                            Ok(StreamEvent::Media { media, .. }) => {
                                match B64.decode(&media.payload) {
                                    Ok(mulaw) => {
                                        recorder.push(&mulaw).await;
                                        orchestrator.on_media(&mulaw).await;
                                    }
                                    Err(e) => warn!("failed to decode base64 media payload: {e}"),
                                }
                            }
                            Ok(StreamEvent::Stop { .. }) => {
                                info!("stream stopped");
                                orchestrator.stop();
                                break;
                            }
                            Err(e) => debug!("ignoring unrecognised/malformed stream event: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("telephony ws closed");
                        orchestrator.stop();
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("telephony ws error: {e}");
                        orchestrator.stop();
                        break;
                    }
                }
            }

            maybe_event = orchestrator.next_stt_event() => {
                match maybe_event {
                    Some(event) => orchestrator.handle_stt_event(event, outbound_tx.clone()).await,
                    None => {}
                }
            }

            () = orchestrator.silence_tick() => {
                orchestrator.on_silence_timeout(outbound_tx.clone()).await;
            }

            Some(msg) = outbound_rx.recv() => {
                if socket.send(msg).await.is_err() {
                    warn!("failed to write to telephony ws");
                    orchestrator.stop();
                    break;
                }
            }
        }

        if orchestrator.is_stopped() {
            break;
        }
    }

    recorder.finish().await;
}
