//! Session Orchestrator - wires the Media Adapter's decoded audio and
//! control events to the STT session, utterance assembler, LLM driver,
//! and TTS queue. The "wiring/state" component.
//!
//! `CallSession` itself stays a single-writer plain record; the
//! orchestrator is the one place that needs concurrent read/write
//! access to it (the WS loop reads `stopped`/`stream_sid`, a spawned
//! turn task mutates `history`), so it lives behind a `tokio::Mutex`
//! here rather than forcing the session to own synchronisation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audio::mulaw_decode;
use crate::llm::{LlmDriver, LlmTurnOutcome};
use crate::media::pacer::pace_and_send;
use crate::session::{CallSession, CancellationHandle};
use crate::stt::{SttEvent, SttSession, SttSessionHandle, SttTransport};
use crate::tts::TtsQueueHandle;
use crate::utterance::{accept_utterance, UtteranceAssembler};

const WELCOME_MESSAGE: &str = "Welcome to Agri Agents. Please tell me your question.";
const DEFAULT_LANGUAGE: &str = "en-IN";

pub struct CallOrchestrator {
    session: Arc<Mutex<CallSession>>,
    session_id: Uuid,
    cancellation: CancellationHandle,
    pipeline_processing: Arc<AtomicBool>,
    assembler: UtteranceAssembler,
    stt: SttSessionHandle,
    stt_events: mpsc::Receiver<SttEvent>,
    llm: Arc<LlmDriver>,
    tts: TtsQueueHandle,
    stream_sid: Option<String>,
    /// The currently in-flight turn task, if any - kept so `stop` can
    /// forcibly abort it if it's wedged on a stalled provider stream
    /// instead of relying solely on the cooperative cancellation check.
    turn_handle: Option<JoinHandle<()>>,
}

impl CallOrchestrator {
    pub fn new(
        llm: Arc<LlmDriver>,
        tts: TtsQueueHandle,
        stt_transport: Arc<dyn SttTransport>,
    ) -> Self {
        let session = CallSession::new();
        let session_id = session.session_id;
        let cancellation = session.cancellation.clone();
        let (event_tx, stt_events) = mpsc::channel(64);
        let stt = SttSession::spawn(stt_transport, cancellation.clone(), event_tx);

        Self {
            session: Arc::new(Mutex::new(session)),
            session_id,
            cancellation,
            pipeline_processing: Arc::new(AtomicBool::new(false)),
            assembler: UtteranceAssembler::new(),
            stt,
            stt_events,
            llm,
            tts,
            stream_sid: None,
            turn_handle: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation.is_stopped()
    }

    pub async fn on_start(&mut self, stream_sid: String, call_sid: String) {
        self.stream_sid = Some(stream_sid.clone());
        let mut guard = self.session.lock().await;
        guard.stream_sid = Some(stream_sid);
        guard.call_sid = Some(call_sid);
    }

    /// Decode inbound μ-law and forward it to the STT session.
    pub async fn on_media(&mut self, mulaw: &[u8]) {
        let pcm = mulaw_decode(mulaw);
        let _ = self.stt.audio_tx.send(pcm).await;
    }

    /// Await the next STT upstream event. Pending forever once the
    /// channel closes so a `tokio::select!` arm never spins.
    pub async fn next_stt_event(&mut self) -> Option<SttEvent> {
        self.stt_events.recv().await
    }

    pub async fn handle_stt_event(&mut self, event: SttEvent, outbound_tx: mpsc::Sender<Message>) {
        match event {
            SttEvent::Transcript(text) => self.assembler.push_partial(text),
            SttEvent::SpeechStart => self.assembler.clear(),
            SttEvent::SpeechEnd => self.flush_and_maybe_start_turn(outbound_tx).await,
            SttEvent::Closed { code } => {
                // Some providers close the stream after each utterance
                // without emitting speech_end.
                if code == Some(1000) && self.assembler.has_pending() {
                    self.flush_and_maybe_start_turn(outbound_tx).await;
                }
            }
        }
    }

    /// How long until the silence timer would fire; `None` parks this
    /// arm forever when nothing is pending.
    pub async fn silence_tick(&self) {
        match self.assembler.silence_deadline() {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending().await,
        }
    }

    pub async fn on_silence_timeout(&mut self, outbound_tx: mpsc::Sender<Message>) {
        self.flush_and_maybe_start_turn(outbound_tx).await;
    }

    async fn flush_and_maybe_start_turn(&mut self, outbound_tx: mpsc::Sender<Message>) {
        let in_flight = self.pipeline_processing.load(Ordering::SeqCst);
        let Some(text) = self.assembler.flush() else {
            return;
        };
        if in_flight {
            debug!("dropping utterance, a turn is already in flight");
            return;
        }
        if !accept_utterance(&text) {
            debug!("utterance rejected by filter: {text:?}");
            return;
        }
        self.start_turn(text, outbound_tx);
    }

    fn start_turn(&mut self, utterance: String, outbound_tx: mpsc::Sender<Message>) {
        self.pipeline_processing.store(true, Ordering::SeqCst);

        let session = self.session.clone();
        let cancellation = self.cancellation.clone();
        let llm = self.llm.clone();
        let tts = self.tts.clone();
        let pipeline_processing = self.pipeline_processing.clone();
        let stream_sid = self.stream_sid.clone();

        let handle = tokio::spawn(async move {
            let (segment_tx, mut segment_rx) = mpsc::channel::<String>(8);

            let drive = async {
                let mut guard = session.lock().await;
                llm.run_turn(&mut guard, &cancellation, utterance, &segment_tx)
                    .await
            };

            let playback = async {
                while let Some(segment) = segment_rx.recv().await {
                    if cancellation.is_stopped() {
                        break;
                    }
                    if let Some(pcm) = tts
                        .synthesize(segment, DEFAULT_LANGUAGE.to_string())
                        .await
                    {
                        if let Some(sid) = &stream_sid {
                            let _ = pace_and_send(&pcm, sid, &outbound_tx, &cancellation).await;
                        }
                    }
                }
            };

            let (outcome, ()) = tokio::join!(drive, playback);
            match outcome {
                LlmTurnOutcome::Completed(_) => {}
                LlmTurnOutcome::Aborted => debug!("llm turn aborted"),
                LlmTurnOutcome::Failed(e) => warn!("llm turn failed: {e}"),
            }
            pipeline_processing.store(false, Ordering::SeqCst);
        });
        self.turn_handle = Some(handle);
    }

    /// Speak the welcome message right after `start`, without blocking
    /// the caller's first media frames.
    pub fn send_welcome(&self, outbound_tx: mpsc::Sender<Message>) {
        let Some(stream_sid) = self.stream_sid.clone() else {
            return;
        };
        let tts = self.tts.clone();
        let cancellation = self.cancellation.clone();
        tokio::spawn(async move {
            if let Some(pcm) = tts
                .synthesize(WELCOME_MESSAGE.to_string(), DEFAULT_LANGUAGE.to_string())
                .await
            {
                let _ = pace_and_send(&pcm, &stream_sid, &outbound_tx, &cancellation).await;
            }
        });
    }

    /// Fire cancellation: the STT session flushes and closes itself on
    /// its next loop iteration, the in-flight LLM turn (if any) pops its
    /// dangling user turn, and the Frame Pacer stops between chunks.
    /// Also aborts the in-flight turn task directly, so a provider
    /// stream stalled past the point of ever observing cancellation
    /// can't keep the session mutex held indefinitely.
    pub fn stop(&mut self) {
        self.cancellation.fire();
        if let Some(handle) = self.turn_handle.take() {
            handle.abort();
        }
    }
}
