//! Drives one LLM turn: append the user utterance to history, stream a
//! completion, and feed the incremental segmenter.
//!
//! The at-most-one-turn-in-flight invariant and the abort-pops-history
//! behaviour live here rather than in `CallSession`, so the session
//! stays a plain data record (per this codebase's convention of keeping
//! orchestration logic out of state structs).

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChatMessage, LlmError, LlmProvider, Segmenter, SYSTEM_PROMPT};
use crate::session::{CallSession, CancellationHandle};

/// Outcome of driving one turn, handed back to the orchestrator so it
/// can decide whether to push the assistant turn onto history.
pub enum LlmTurnOutcome {
    /// The full reply, already delivered to `segment_tx` as segments.
    Completed(String),
    /// Cancelled mid-stream; the dangling user turn has been popped.
    Aborted,
    /// The provider failed; the dangling user turn has been popped.
    Failed(LlmError),
}

/// Drives LLM turns for one call. Holds nothing but the provider handle
/// and the history access is threaded through `run_turn`'s `&mut
/// CallSession` so there is exactly one place that mutates history.
pub struct LlmDriver {
    provider: Arc<dyn LlmProvider>,
}

impl LlmDriver {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Run one turn to completion, abort, or failure. `segment_tx`
    /// receives each TTS-ready segment as soon as the segmenter emits
    /// it, so TTS can start before the full reply has arrived.
    ///
    /// Caller contract: only call this when no other turn is in
    /// flight for the session (the orchestrator's `pipeline_processing`
    /// flag enforces this).
    pub async fn run_turn(
        &self,
        session: &mut CallSession,
        cancellation: &CancellationHandle,
        utterance: String,
        segment_tx: &mpsc::Sender<String>,
    ) -> LlmTurnOutcome {
        let turn_index = session.push_user_turn(utterance);

        let history: Vec<ChatMessage> = session
            .history
            .iter()
            .map(|turn| ChatMessage {
                role: turn.role,
                text: turn.text.clone(),
            })
            .collect();

        if crate::config::config().debug_llm_prompt {
            debug!(system_prompt = SYSTEM_PROMPT, ?history, "dispatching llm turn");
        }

        let mut stream = match self.provider.stream_reply(SYSTEM_PROMPT, &history).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("llm request failed: {e}");
                session.pop_dangling_user_turn(turn_index);
                return LlmTurnOutcome::Failed(e);
            }
        };

        let mut segmenter = Segmenter::new();
        let mut full_reply = String::new();

        loop {
            tokio::select! {
                biased;

                () = cancellation.cancelled() => {
                    session.pop_dangling_user_turn(turn_index);
                    return LlmTurnOutcome::Aborted;
                }

                next = stream.next() => {
                    match next {
                        Some(Ok(delta)) => {
                            full_reply.push_str(&delta);
                            for segment in segmenter.push_delta(&delta) {
                                if segment_tx.send(segment).await.is_err() {
                                    session.pop_dangling_user_turn(turn_index);
                                    return LlmTurnOutcome::Aborted;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            warn!("llm stream error: {e}");
                            session.pop_dangling_user_turn(turn_index);
                            return LlmTurnOutcome::Failed(e);
                        }
                        None => break,
                    }
                }
            }
        }

        for segment in segmenter.finish() {
            if segment_tx.send(segment).await.is_err() {
                session.pop_dangling_user_turn(turn_index);
                return LlmTurnOutcome::Aborted;
            }
        }

        debug!("llm turn completed, {} chars", full_reply.len());
        session.push_assistant_turn(full_reply.clone());
        LlmTurnOutcome::Completed(full_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use async_trait::async_trait;
    use futures_util::stream;
    use std::pin::Pin;
    use tokio::sync::Mutex;

    struct StubProvider {
        deltas: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn stream_reply(
            &self,
            _system_prompt: &str,
            _history: &[ChatMessage],
        ) -> Result<super::super::LlmStream, LlmError> {
            let deltas = self.deltas.lock().await.clone();
            let s = stream::iter(deltas.into_iter().map(|d| Ok(d.to_string())));
            Ok(Box::pin(s) as Pin<Box<dyn futures_util::Stream<Item = Result<String, LlmError>> + Send>>)
        }
    }

    #[tokio::test]
    async fn completes_and_pushes_assistant_turn() {
        let provider = Arc::new(StubProvider {
            deltas: Mutex::new(vec!["Sow wheat in November for the best possible yield. "]),
        });
        let driver = LlmDriver::new(provider);
        let mut session = CallSession::new();
        let cancellation = CancellationHandle::new();
        let (tx, mut rx) = mpsc::channel(8);

        let outcome = driver
            .run_turn(&mut session, &cancellation, "when to sow wheat?".into(), &tx)
            .await;

        assert!(matches!(outcome, LlmTurnOutcome::Completed(_)));
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[1].role, Role::Assistant);
        let segment = rx.recv().await.unwrap();
        assert!(segment.contains("Sow wheat"));
    }

    #[tokio::test]
    async fn abort_pops_dangling_user_turn() {
        let provider = Arc::new(StubProvider {
            deltas: Mutex::new(vec!["first delta here that is long enough "]),
        });
        let driver = LlmDriver::new(provider);
        let mut session = CallSession::new();
        let cancellation = CancellationHandle::new();
        cancellation.fire();
        let (tx, _rx) = mpsc::channel(8);

        let outcome = driver
            .run_turn(&mut session, &cancellation, "question".into(), &tx)
            .await;

        assert!(matches!(outcome, LlmTurnOutcome::Aborted));
        assert!(session.history.is_empty());
    }
}
