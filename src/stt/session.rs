use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::CancellationHandle;

use super::SttError;

/// Growable byte buffer accumulating linear-PCM samples awaiting dispatch
/// to the STT upstream. `bytes_per_ms` is 16 for 8 kHz mono 16-bit PCM.
pub struct PcmBuffer {
    bytes: Vec<u8>,
    bytes_per_ms: usize,
    flush_threshold_ms: u64,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, bytes_per_sample: usize, flush_threshold_ms: u64) -> Self {
        Self {
            bytes: Vec::new(),
            bytes_per_ms: (sample_rate as usize * bytes_per_sample) / 1000,
            flush_threshold_ms,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn buffered_ms(&self) -> u64 {
        (self.bytes.len() / self.bytes_per_ms.max(1)) as u64
    }

    pub fn should_flush(&self) -> bool {
        self.buffered_ms() >= self.flush_threshold_ms
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Take and clear the buffered bytes.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

/// Events surfaced to the orchestrator. Reconnect/dark-upstream mechanics
/// are entirely internal to `SttSession` - the orchestrator only needs to
/// know what happened to the conversation, plus the raw close code so it
/// can apply the close-code-1000 implicit-flush fallback.
#[derive(Debug, Clone)]
pub enum SttEvent {
    Transcript(String),
    SpeechStart,
    SpeechEnd,
    /// The upstream socket closed. `code` is `None` if the transport could
    /// not recover one. The session has already decided internally
    /// whether to reconnect; this event is purely informational.
    Closed { code: Option<u16> },
}

/// Internal events a concrete transport produces while a connection is alive.
#[derive(Debug, Clone)]
pub enum SttConnEvent {
    Transcript(String),
    SpeechStart,
    SpeechEnd,
    Error,
    Closed { code: Option<u16> },
}

/// One live upstream connection: a sink for outbound WAV-framed audio and
/// a stream of provider events. A concrete transport owns the real
/// WebSocket plumbing and its own reader/writer tasks.
pub struct SttConnection {
    pub to_upstream: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<SttConnEvent>,
}

/// Abstracts the streaming STT provider's wire protocol. Only the
/// abstract contract is specified - a concrete implementation talks to
/// whatever cloud STT endpoint is configured.
#[async_trait]
pub trait SttTransport: Send + Sync {
    async fn connect(&self) -> Result<SttConnection, SttError>;
}

/// Handle used by the media adapter to push decoded PCM and by the
/// orchestrator to stop the session's background task.
pub struct SttSessionHandle {
    pub audio_tx: mpsc::Sender<Vec<u8>>,
}

/// Drives one call's STT upstream: connect/reconnect policy, PCM
/// batching, and close-code-1000 fallback signalling.
pub struct SttSession;

impl SttSession {
    /// Spawn the session's long-lived task. Returns a handle for pushing
    /// audio; events arrive on `event_tx`.
    pub fn spawn(
        transport: Arc<dyn SttTransport>,
        cancellation: CancellationHandle,
        event_tx: mpsc::Sender<SttEvent>,
    ) -> SttSessionHandle {
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::spawn(run(transport, audio_rx, event_tx, cancellation));
        SttSessionHandle { audio_tx }
    }
}

async fn run(
    transport: Arc<dyn SttTransport>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    event_tx: mpsc::Sender<SttEvent>,
    cancellation: CancellationHandle,
) {
    let mut buffer = PcmBuffer::new(8_000, 2, 200);
    let mut had_error = false;
    let mut conn: Option<SttConnection> = None;

    loop {
        if cancellation.is_stopped() {
            flush(&mut buffer, &mut conn).await;
            if let Some(c) = conn.take() {
                drop(c.to_upstream);
            }
            return;
        }

        if conn.is_none() && !had_error {
            match transport.connect().await {
                Ok(new_conn) => {
                    info!("stt upstream connected");
                    conn = Some(new_conn);
                    flush(&mut buffer, &mut conn).await;
                }
                Err(e) => {
                    warn!("stt upstream connect failed: {e}");
                    had_error = true;
                }
            }
        }

        tokio::select! {
            biased;

            maybe_audio = audio_rx.recv() => {
                match maybe_audio {
                    Some(pcm) => {
                        buffer.push(&pcm);
                        if buffer.should_flush() {
                            flush(&mut buffer, &mut conn).await;
                        }
                    }
                    None => {
                        flush(&mut buffer, &mut conn).await;
                        return;
                    }
                }
            }

            maybe_event = recv_conn_event(&mut conn) => {
                match maybe_event {
                    Some(SttConnEvent::Transcript(text)) => {
                        if !text.trim().is_empty() {
                            let _ = event_tx.send(SttEvent::Transcript(text)).await;
                        }
                    }
                    Some(SttConnEvent::SpeechStart) => {
                        let _ = event_tx.send(SttEvent::SpeechStart).await;
                    }
                    Some(SttConnEvent::SpeechEnd) => {
                        let _ = event_tx.send(SttEvent::SpeechEnd).await;
                    }
                    Some(SttConnEvent::Error) => {
                        had_error = true;
                        debug!("stt upstream reported an error; reconnect suppressed");
                    }
                    Some(SttConnEvent::Closed { code }) => {
                        conn = None;
                        let normal_close = code == Some(1000);
                        if !normal_close {
                            had_error = true;
                        }
                        let _ = event_tx.send(SttEvent::Closed { code }).await;
                    }
                    None => {
                        // No connection yet; avoid a busy loop.
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                }
            }
        }
    }
}

async fn recv_conn_event(conn: &mut Option<SttConnection>) -> Option<SttConnEvent> {
    match conn {
        Some(c) => c.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn flush(buffer: &mut PcmBuffer, conn: &mut Option<SttConnection>) {
    if buffer.is_empty() {
        return;
    }
    let Some(c) = conn else { return };
    let pcm = buffer.take();
    let wav = crate::audio::wrap_wav(&pcm, 8_000, 1, 16);
    let _ = c.to_upstream.send(wav).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Closes the first connection with a normal (1000) code, then hands
    /// out a live second connection - exercises the reconnect policy in
    /// isolation from the rest of the orchestrator.
    struct ReconnectingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SttTransport for ReconnectingTransport {
        async fn connect(&self) -> Result<SttConnection, SttError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let (to_upstream, _drop_outbound_audio) = mpsc::channel::<Vec<u8>>(4);
            let (events_tx, events_rx) = mpsc::channel(4);
            if call == 0 {
                events_tx
                    .send(SttConnEvent::Closed { code: Some(1000) })
                    .await
                    .unwrap();
            } else {
                events_tx.send(SttConnEvent::SpeechStart).await.unwrap();
            }
            Ok(SttConnection {
                to_upstream,
                events: events_rx,
            })
        }
    }

    #[tokio::test]
    async fn reconnects_after_a_normal_close() {
        let transport = Arc::new(ReconnectingTransport {
            calls: AtomicUsize::new(0),
        });
        let cancellation = CancellationHandle::new();
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let _handle = SttSession::spawn(transport.clone(), cancellation.clone(), event_tx);

        let event = event_rx.recv().await.unwrap();
        assert!(matches!(event, SttEvent::Closed { code: Some(1000) }));

        // Only a successful second `connect()` produces this event - proves
        // the session reconnected rather than giving up after the close.
        let event = event_rx.recv().await.unwrap();
        assert!(matches!(event, SttEvent::SpeechStart));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);

        cancellation.fire();
    }

    #[test]
    fn pcm_buffer_flush_threshold() {
        let mut buf = PcmBuffer::new(8_000, 2, 200);
        assert!(!buf.should_flush());
        // 200ms @ 8kHz mono 16-bit = 3200 bytes
        buf.push(&vec![0u8; 3200]);
        assert!(buf.should_flush());
    }

    #[test]
    fn pcm_buffer_take_clears() {
        let mut buf = PcmBuffer::new(8_000, 2, 200);
        buf.push(&[1, 2, 3, 4]);
        let taken = buf.take();
        assert_eq!(taken, vec![1, 2, 3, 4]);
        assert!(buf.is_empty());
    }
}
