//! Frame Pacer - slices outbound PCM16LE @ 8 kHz into 20 ms μ-law
//! frames and writes them to the telephony WS.
//!
//! Paced to real time between chunks rather than sent as fast as the
//! socket accepts them - send-as-fast-as-possible is an equally-correct
//! alternative, but pacing is chosen here to bound jitter without
//! depending on the provider to buffer.

use std::time::Duration;

use axum::extract::ws::Message;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::audio::{mulaw_encode, CodecError};
use crate::session::CancellationHandle;

const CHUNK_BYTES: usize = 320; // 20ms @ 8kHz, 16-bit mono PCM
const FRAME_INTERVAL: Duration = Duration::from_millis(20);

pub fn build_media_frame(stream_sid: &str, mulaw_chunk: &[u8]) -> Message {
    let payload = B64.encode(mulaw_chunk);
    let frame = serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload },
    });
    Message::Text(frame.to_string())
}

/// Encode `pcm16le` to μ-law 20 ms frames and send them paced to real
/// time, stopping promptly if `cancellation` fires between chunks.
pub async fn pace_and_send(
    pcm16le: &[u8],
    stream_sid: &str,
    outbound_tx: &mpsc::Sender<Message>,
    cancellation: &CancellationHandle,
) -> Result<(), CodecError> {
    for chunk in pcm16le.chunks(CHUNK_BYTES) {
        if cancellation.is_stopped() {
            break;
        }
        let mulaw = mulaw_encode(chunk)?;
        if outbound_tx
            .send(build_media_frame(stream_sid, &mulaw))
            .await
            .is_err()
        {
            break;
        }
        sleep(FRAME_INTERVAL).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_media_frame_is_well_formed_json() {
        let msg = build_media_frame("sid-1", &[0xffu8; 160]);
        let Message::Text(text) = msg else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "sid-1");
        assert!(value["media"]["payload"].as_str().unwrap().len() > 0);
    }

    fn payload_byte_len(msg: &Message) -> usize {
        let Message::Text(text) = msg else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        let payload = value["media"]["payload"].as_str().unwrap();
        B64.decode(payload).unwrap().len()
    }

    #[tokio::test]
    async fn emits_ceil_frame_count_with_a_shorter_last_frame() {
        tokio::time::pause();
        // Each length is an even byte count (whole 16-bit samples); only
        // the last is a multiple of CHUNK_BYTES, so every other case
        // exercises the shorter final frame.
        for len in [320usize, 322, 480, 640, 642, 100] {
            let pcm = vec![0u8; len];
            let (tx, mut rx) = mpsc::channel(64);
            let cancellation = CancellationHandle::new();

            pace_and_send(&pcm, "sid-frames", &tx, &cancellation)
                .await
                .unwrap();
            drop(tx);

            let mut frames = Vec::new();
            while let Some(msg) = rx.recv().await {
                frames.push(msg);
            }

            let expected_frames = len.div_ceil(CHUNK_BYTES);
            assert_eq!(frames.len(), expected_frames, "frame count for len={len}");

            let last_chunk_bytes = len - (expected_frames - 1) * CHUNK_BYTES;
            let last_frame_mulaw_len = payload_byte_len(frames.last().unwrap());
            assert_eq!(
                last_frame_mulaw_len,
                last_chunk_bytes / 2,
                "last frame mulaw length for len={len}"
            );

            if expected_frames > 1 {
                let first_frame_mulaw_len = payload_byte_len(&frames[0]);
                assert_eq!(first_frame_mulaw_len, CHUNK_BYTES / 2);
            }
        }
    }
}
