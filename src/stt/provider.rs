//! A concrete `SttTransport` against a generic streaming-STT WebSocket
//! contract: connect, send base64 WAV frames tagged `transcribe`, and
//! receive `transcript` / `speech_start` / `speech_end` / `error` JSON
//! events (`transcript` may be nested under `data`).
//!
//! Grounded on this codebase's OpenAI-Realtime STT adapter: same
//! connect_async + header-auth + event-loop shape, generalised from a
//! one-shot request/response into a long-lived duplex session.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::client::IntoClientRequest, tungstenite::Message};
use tracing::{debug, warn};

use crate::stt::{SttConnEvent, SttConnection, SttError, SttTransport};

pub struct WsSttProvider {
    pub url: String,
    pub api_key: Option<String>,
}

impl WsSttProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ServerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

fn extract_transcript(ev: &ServerEvent) -> Option<String> {
    if let Some(text) = &ev.text {
        if !text.is_empty() {
            return Some(text.clone());
        }
    }
    ev.data
        .as_ref()
        .and_then(|d| d.get("text"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl SttTransport for WsSttProvider {
    async fn connect(&self) -> Result<SttConnection, SttError> {
        let mut request = self
            .url
            .clone()
            .into_client_request()
            .map_err(|e| SttError::ConnectFailed(e.to_string()))?;

        if let Some(key) = &self.api_key {
            request.headers_mut().insert(
                "Authorization",
                format!("Bearer {key}")
                    .parse()
                    .map_err(|_| SttError::ConnectFailed("invalid api key header".into()))?,
            );
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| SttError::ConnectFailed(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (to_upstream_tx, mut to_upstream_rx) = mpsc::channel::<Vec<u8>>(32);
        let (events_tx, events_rx) = mpsc::channel::<SttConnEvent>(256);

        // Writer task: WAV-wrapped PCM -> base64 `transcribe` frames.
        tokio::spawn(async move {
            while let Some(wav) = to_upstream_rx.recv().await {
                let frame = serde_json::json!({
                    "type": "transcribe",
                    "audio": B64.encode(&wav),
                });
                if write.send(Message::Text(frame.to_string())).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        // Reader task: upstream JSON events -> SttConnEvent.
        let events_tx_reader = events_tx.clone();
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(ev) => {
                                let mapped = match ev.kind.as_str() {
                                    "transcript" => {
                                        extract_transcript(&ev).map(SttConnEvent::Transcript)
                                    }
                                    "speech_start" => Some(SttConnEvent::SpeechStart),
                                    "speech_end" => Some(SttConnEvent::SpeechEnd),
                                    "error" => Some(SttConnEvent::Error),
                                    _ => None,
                                };
                                if let Some(mapped) = mapped {
                                    if events_tx_reader.send(mapped).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => debug!("malformed stt upstream message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        let _ = events_tx_reader.send(SttConnEvent::Closed { code }).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("stt upstream read error: {e}");
                        let _ = events_tx_reader
                            .send(SttConnEvent::Closed { code: None })
                            .await;
                        break;
                    }
                    None => {
                        let _ = events_tx_reader
                            .send(SttConnEvent::Closed { code: None })
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(SttConnection {
            to_upstream: to_upstream_tx,
            events: events_rx,
        })
    }
}
