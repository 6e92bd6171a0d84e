//! Process-wide sequential TTS queue - one request in flight across all
//! calls. Modelled on this codebase's "only entry point is the service
//! wrapper" convention (`voice_service.rs`), here realised as a single
//! background worker task instead of a per-call runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use super::{TextToSpeech, TtsError};

const MAX_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const MIN_WORDS: usize = 5;

struct TtsJob {
    text: String,
    language_code: String,
    respond_to: oneshot::Sender<Option<Vec<u8>>>,
}

/// Handle for submitting synthesis jobs to the shared queue. Cheap to
/// clone; every call holds one.
#[derive(Clone)]
pub struct TtsQueueHandle {
    tx: mpsc::Sender<TtsJob>,
}

impl TtsQueueHandle {
    /// Synthesize `text`, never throwing: on permanent failure, or if
    /// the text is too short to bother with, returns `None` and the
    /// segment is silently skipped.
    pub async fn synthesize(&self, text: String, language_code: String) -> Option<Vec<u8>> {
        if word_count(&text) < MIN_WORDS {
            return None;
        }
        let (respond_to, rx) = oneshot::channel();
        if self
            .tx
            .send(TtsJob {
                text,
                language_code,
                respond_to,
            })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.unwrap_or(None)
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Spawn the worker task and return a handle to it. Call once at
/// startup; share the handle across every session.
pub fn spawn_queue(provider: Arc<dyn TextToSpeech>) -> TtsQueueHandle {
    let (tx, rx) = mpsc::channel(128);
    tokio::spawn(worker(provider, rx));
    TtsQueueHandle { tx }
}

async fn worker(provider: Arc<dyn TextToSpeech>, mut rx: mpsc::Receiver<TtsJob>) {
    while let Some(job) = rx.recv().await {
        let audio = synthesize_with_retry(provider.as_ref(), &job.text, &job.language_code).await;
        let _ = job.respond_to.send(audio);
    }
}

async fn synthesize_with_retry(
    provider: &dyn TextToSpeech,
    text: &str,
    language_code: &str,
) -> Option<Vec<u8>> {
    for attempt in 0..=MAX_RETRIES {
        match provider.synthesize(text, language_code).await {
            Ok(pcm) => return Some(pcm),
            Err(e) => {
                warn!("tts attempt {attempt} failed: {e}");
                if attempt < MAX_RETRIES {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyOnceProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextToSpeech for FlakyOnceProvider {
        async fn synthesize(&self, _text: &str, _language_code: &str) -> Result<Vec<u8>, TtsError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err(TtsError::SynthesisFailed("transient".into()))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    struct AlwaysFailProvider;

    #[async_trait]
    impl TextToSpeech for AlwaysFailProvider {
        async fn synthesize(&self, _text: &str, _language_code: &str) -> Result<Vec<u8>, TtsError> {
            Err(TtsError::SynthesisFailed("down".into()))
        }
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let provider = Arc::new(FlakyOnceProvider {
            calls: AtomicUsize::new(0),
        });
        let handle = spawn_queue(provider);
        let result = handle
            .synthesize("sow wheat in november for best yield".into(), "en-IN".into())
            .await;
        assert_eq!(result, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_none() {
        let handle = spawn_queue(Arc::new(AlwaysFailProvider));
        let result = handle
            .synthesize("sow wheat in november for best yield".into(), "en-IN".into())
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn rejects_short_text_before_calling_provider() {
        let handle = spawn_queue(Arc::new(AlwaysFailProvider));
        let result = handle.synthesize("too short".into(), "en-IN".into()).await;
        assert_eq!(result, None);
    }

    /// Tracks how many calls are inside `synthesize` at once, holding
    /// each one open briefly so overlapping calls would actually collide.
    struct ConcurrencyTrackingProvider {
        current: AtomicUsize,
        max_observed: AtomicUsize,
    }

    #[async_trait]
    impl TextToSpeech for ConcurrencyTrackingProvider {
        async fn synthesize(&self, _text: &str, _language_code: &str) -> Result<Vec<u8>, TtsError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![9])
        }
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized_to_one_in_flight_request() {
        let provider = Arc::new(ConcurrencyTrackingProvider {
            current: AtomicUsize::new(0),
            max_observed: AtomicUsize::new(0),
        });
        let handle = spawn_queue(provider.clone());

        let callers: Vec<_> = (0..5)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .synthesize("sow wheat in november for the best yield".into(), "en-IN".into())
                        .await
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Some(vec![9]));
        }

        assert_eq!(provider.max_observed.load(Ordering::SeqCst), 1);
    }
}
