//! Call Session - the top-level per-call entity.
//!
//! Owned exclusively by the orchestrator task; every other task talks to
//! it through channels, never by reaching into its fields. Mirrors this
//! codebase's "owned state record, single logical writer" convention.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A single turn in the conversation history. Insertion order is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Cancellation handle shared between the orchestrator and every task it
/// spawns for this call. Firing it lets every suspension point observe
/// it promptly: a plain poll (`is_stopped`) for loops that are already
/// between suspension points, and an awaitable (`cancelled`) for loops
/// that need to race it against a network read via `tokio::select!` so
/// a stalled read can't hang the task forever.
#[derive(Clone)]
pub struct CancellationHandle {
    token: CancellationToken,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn fire(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `fire` has been called, including if it already
    /// has been - safe to race against another future in `select!`
    /// without missing a cancellation that lands before the `select!`
    /// is polled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The top-level per-call entity. One per WebSocket connection.
pub struct CallSession {
    pub session_id: Uuid,
    /// Provider-issued stream identifier; only known after `start`, and
    /// mandatory for sending any outbound media.
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub history: Vec<Turn>,
    pub cancellation: CancellationHandle,
}

impl CallSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            stream_sid: None,
            call_sid: None,
            history: Vec::new(),
            cancellation: CancellationHandle::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation.is_stopped()
    }

    pub fn stop(&self) {
        self.cancellation.fire();
    }

    /// Append a user turn, returning its index so it can be popped again
    /// on abort without disturbing any turns appended afterwards.
    pub fn push_user_turn(&mut self, text: String) -> usize {
        self.history.push(Turn {
            role: Role::User,
            text,
        });
        self.history.len() - 1
    }

    pub fn push_assistant_turn(&mut self, text: String) {
        self.history.push(Turn {
            role: Role::Assistant,
            text,
        });
    }

    /// Remove the user turn at `index` if it is still the last entry and
    /// still a user turn - i.e. no assistant reply was appended after it.
    /// Used when an LLM turn is aborted mid-generation.
    pub fn pop_dangling_user_turn(&mut self, index: usize) {
        if self.history.len() == index + 1 {
            if let Some(turn) = self.history.last() {
                if turn.role == Role::User {
                    self.history.pop();
                }
            }
        }
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_dangling_user_turn_removes_only_if_last_and_unanswered() {
        let mut session = CallSession::new();
        let idx = session.push_user_turn("hello".into());
        session.pop_dangling_user_turn(idx);
        assert!(session.history.is_empty());
    }

    #[test]
    fn pop_dangling_user_turn_is_noop_once_answered() {
        let mut session = CallSession::new();
        let idx = session.push_user_turn("hello".into());
        session.push_assistant_turn("hi there".into());
        session.pop_dangling_user_turn(idx);
        assert_eq!(session.history.len(), 2);
    }

    #[test]
    fn cancellation_handle_is_idempotent() {
        let handle = CancellationHandle::new();
        assert!(!handle.is_stopped());
        handle.fire();
        handle.fire();
        assert!(handle.is_stopped());
    }
}
