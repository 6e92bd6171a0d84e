//! Utterance Assembler - aggregates partial transcripts, runs the
//! silence timer, and filters filler utterances.
//!
//! Owned by the orchestrator task; no locks, single writer.

use std::time::{Duration, Instant};

const SILENCE_TIMEOUT: Duration = Duration::from_millis(1200);
const MIN_CHARS: usize = 8;

const FILLERS: &[&str] = &[
    "okay", "ok", "hm", "hmm", "haan", "han", "yes", "no", "right", "aha", "uh", "um", "oh",
    "sure", "alright", "good", "fine", "thanks", "thank you",
];

/// Accumulated partial transcripts since the last flush, plus the
/// deadline for the silence timer. At any moment the assembler holds
/// either zero utterances (between speakers) or one in-progress
/// utterance.
pub struct UtteranceAssembler {
    partials: Vec<String>,
    last_update: Option<Instant>,
}

impl UtteranceAssembler {
    pub fn new() -> Self {
        Self {
            partials: Vec::new(),
            last_update: None,
        }
    }

    /// A new partial transcript arrived: append it and restart the
    /// silence timer.
    pub fn push_partial(&mut self, text: String) {
        self.partials.push(text);
        self.last_update = Some(Instant::now());
    }

    /// `speech_start`: clear any partial utterance held so far.
    pub fn clear(&mut self) {
        self.partials.clear();
        self.last_update = None;
    }

    /// How long to sleep before the silence timer would fire, if a
    /// partial is currently pending. `None` means there is nothing to
    /// time out.
    pub fn silence_deadline(&self) -> Option<Duration> {
        let last_update = self.last_update?;
        Some(SILENCE_TIMEOUT.saturating_sub(last_update.elapsed()))
    }

    pub fn has_pending(&self) -> bool {
        !self.partials.is_empty()
    }

    /// Flush: select the longest accumulated transcript, clear the list,
    /// and return it for filtering. `None` if nothing was accumulated.
    pub fn flush(&mut self) -> Option<String> {
        if self.partials.is_empty() {
            return None;
        }
        let longest = self
            .partials
            .iter()
            .max_by_key(|t| t.len())
            .cloned()
            .unwrap();
        self.partials.clear();
        self.last_update = None;
        Some(longest)
    }
}

impl Default for UtteranceAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject empty/short text or filler acknowledgements; otherwise accept.
pub fn accept_utterance(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < MIN_CHARS {
        return false;
    }
    let normalized = trimmed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    !FILLERS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_longest_partial_on_flush() {
        let mut assembler = UtteranceAssembler::new();
        assembler.push_partial("how".into());
        assembler.push_partial("how is".into());
        assembler.push_partial("how is the weather".into());
        assert_eq!(assembler.flush().as_deref(), Some("how is the weather"));
        assert!(!assembler.has_pending());
    }

    #[test]
    fn flush_on_empty_returns_none() {
        let mut assembler = UtteranceAssembler::new();
        assert_eq!(assembler.flush(), None);
    }

    #[test]
    fn clear_drops_partial_utterance() {
        let mut assembler = UtteranceAssembler::new();
        assembler.push_partial("hello".into());
        assembler.clear();
        assert!(!assembler.has_pending());
        assert_eq!(assembler.flush(), None);
    }

    #[test]
    fn filler_words_are_rejected_any_case_and_punctuation() {
        for word in FILLERS {
            assert!(!accept_utterance(&word.to_uppercase()));
            assert!(!accept_utterance(&format!("{word}.")));
            assert!(!accept_utterance(&format!("{word}!")));
        }
    }

    #[test]
    fn short_text_is_rejected() {
        assert!(!accept_utterance(""));
        assert!(!accept_utterance("yo yo"));
        assert!(!accept_utterance("       "));
    }

    #[test]
    fn real_questions_are_accepted() {
        assert!(accept_utterance(
            "which crop should I sow in July in Punjab?"
        ));
        assert!(accept_utterance("weather in Punjab next week"));
    }

    #[test]
    fn silence_deadline_none_without_pending_partial() {
        let assembler = UtteranceAssembler::new();
        assert!(assembler.silence_deadline().is_none());
    }
}
