//! Session store: the single writer of record for one conversation.
//!
//! The store owns the stable session id (generated exactly once per
//! conversation context), the ordered message log, and the single
//! "in progress" assistant slot. Stream consumption and retry coordination
//! request mutations through it; they never hold independent copies of the
//! log.
//!
//! Every streaming mutation is gated by a [`TurnToken`] minted when the turn
//! begins. A token is invalidated by turn completion, placeholder removal, or
//! a reset, so events from a superseded stream fold into nothing instead of
//! corrupting a newer log.

use crate::error::{JiwonError, Result};
use crate::evidence::Evidence;

use super::context::ContextRef;
use super::message::{ChatMessage, MessageRole};

/// Capability to mutate the in-progress assistant message of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnToken(u64);

/// Lifecycle state of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session accepts turns.
    Active,
    /// Torn down; a new session identity is required for a new conversation.
    Terminated,
}

/// Owns the message log and session identity for one conversation context.
pub struct SessionStore {
    session_id: String,
    context: ContextRef,
    messages: Vec<ChatMessage>,
    active_turn: Option<TurnToken>,
    next_token: u64,
    state: SessionState,
}

impl SessionStore {
    /// Creates a fresh session for `context` with a newly generated id.
    pub fn new(context: ContextRef) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            context,
            messages: Vec::new(),
            active_turn: None,
            next_token: 0,
            state: SessionState::Active,
        }
    }

    /// Creates a session seeded with a previously persisted message log.
    ///
    /// The session id is still freshly generated: only the log is persisted,
    /// so the first send after a restore re-establishes remote context
    /// through the cache-miss recovery path.
    pub fn restore(context: ContextRef, messages: Vec<ChatMessage>) -> Self {
        let mut store = Self::new(context);
        store.messages = messages;
        store
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn context(&self) -> &ContextRef {
        &self.context
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The storage slot key for this conversation.
    pub fn storage_key(&self) -> String {
        self.context.storage_key()
    }

    pub fn turn_in_progress(&self) -> bool {
        self.active_turn.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    fn mint_token(&mut self) -> TurnToken {
        let token = TurnToken(self.next_token);
        self.next_token += 1;
        self.active_turn = Some(token);
        token
    }

    fn token_is_current(&self, token: TurnToken) -> bool {
        self.active_turn == Some(token)
    }

    /// Starts a new turn: appends the user message and an empty assistant
    /// placeholder, and returns the token that authorizes mutations of it.
    ///
    /// # Errors
    ///
    /// - [`JiwonError::SessionClosed`] after teardown
    /// - [`JiwonError::TurnInProgress`] while a turn is still streaming
    pub fn begin_turn(&mut self, user_text: &str) -> Result<TurnToken> {
        if self.is_terminated() {
            return Err(JiwonError::SessionClosed);
        }
        if self.turn_in_progress() {
            return Err(JiwonError::TurnInProgress);
        }

        self.messages.push(ChatMessage::user(user_text));
        self.messages.push(ChatMessage::assistant_placeholder());
        Ok(self.mint_token())
    }

    /// Re-creates the assistant placeholder for a retried turn.
    ///
    /// The user message of the original attempt is kept; only the placeholder
    /// is appended, under a fresh token, so text from the superseded stream
    /// can never interleave into the retried message.
    pub fn recreate_placeholder(&mut self) -> Result<TurnToken> {
        if self.is_terminated() {
            return Err(JiwonError::SessionClosed);
        }
        if self.turn_in_progress() {
            return Err(JiwonError::TurnInProgress);
        }

        self.messages.push(ChatMessage::assistant_placeholder());
        Ok(self.mint_token())
    }

    /// Appends streamed text to the in-progress assistant message.
    ///
    /// A stale token makes this a no-op: a late chunk from a superseded
    /// stream folds into nothing.
    pub fn append_chunk(&mut self, token: TurnToken, chunk: &str) {
        if !self.token_is_current(token) {
            tracing::debug!("dropping chunk for stale turn token");
            return;
        }
        if let Some(last) = self.messages.last_mut() {
            if last.role == MessageRole::Assistant {
                last.content.push_str(chunk);
            }
        }
    }

    /// Attaches the evidence list to the in-progress assistant message,
    /// replacing any previously attached list. Stale tokens are no-ops.
    pub fn attach_evidence(&mut self, token: TurnToken, evidence: Vec<Evidence>) {
        if !self.token_is_current(token) {
            tracing::debug!("dropping evidence for stale turn token");
            return;
        }
        if let Some(last) = self.messages.last_mut() {
            if last.role == MessageRole::Assistant {
                last.evidence = evidence;
            }
        }
    }

    /// Marks the turn finished and releases the in-progress slot.
    pub fn complete_turn(&mut self, token: TurnToken) {
        if self.token_is_current(token) {
            self.active_turn = None;
        }
    }

    /// Overwrites the in-progress message with a user-facing failure text and
    /// completes the turn.
    pub fn fail_turn(&mut self, token: TurnToken, text: &str) {
        if !self.token_is_current(token) {
            return;
        }
        if let Some(last) = self.messages.last_mut() {
            if last.role == MessageRole::Assistant {
                last.content = text.to_string();
            }
        }
        self.active_turn = None;
    }

    /// Removes the in-progress assistant placeholder, keeping the user
    /// message, ahead of a retry. Releases the in-progress slot.
    pub fn drop_placeholder(&mut self, token: TurnToken) {
        if !self.token_is_current(token) {
            return;
        }
        if self
            .messages
            .last()
            .is_some_and(|m| m.role == MessageRole::Assistant)
        {
            self.messages.pop();
        }
        self.active_turn = None;
    }

    /// Replaces the log with a restored copy.
    ///
    /// Skipped while a turn is in progress: the restored copy cannot carry
    /// the in-progress slot, and the persisted mirror trails the live log by
    /// at most one mutation anyway.
    pub fn replace_log(&mut self, messages: Vec<ChatMessage>) {
        if self.turn_in_progress() {
            tracing::debug!("skipping log restore while a turn is in progress");
            return;
        }
        self.messages = messages;
    }

    /// Clears the conversation. The session identity is kept; outstanding
    /// turn tokens are invalidated so late stream events are no-ops.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.active_turn = None;
    }

    /// Tears the session down. There is no way back to `Active` for this
    /// identity.
    pub fn terminate(&mut self) {
        self.state = SessionState::Terminated;
        self.active_turn = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(ContextRef::Policy { policy_id: 7 })
    }

    #[test]
    fn test_chunks_concatenate_in_emission_order() {
        let mut store = store();
        let token = store.begin_turn("질문입니다").unwrap();

        store.append_chunk(token, "지원 ");
        store.append_chunk(token, "대상은 ");
        store.append_chunk(token, "예비창업자입니다.");
        store.complete_turn(token);

        assert!(!store.turn_in_progress());
        let last = store.messages().last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.content, "지원 대상은 예비창업자입니다.");
    }

    #[test]
    fn test_second_begin_is_rejected_while_in_progress() {
        let mut store = store();
        let _token = store.begin_turn("first").unwrap();

        let err = store.begin_turn("second").unwrap_err();
        assert!(matches!(err, JiwonError::TurnInProgress));
        // No second placeholder was created.
        assert_eq!(store.messages().len(), 2);
    }

    #[test]
    fn test_stale_token_mutations_are_noops() {
        let mut store = store();
        let first = store.begin_turn("question").unwrap();
        store.append_chunk(first, "partial");
        store.drop_placeholder(first);

        let retry = store.recreate_placeholder().unwrap();
        // Late events from the first stream must not touch the retried slot.
        store.append_chunk(first, "ghost text");
        store.attach_evidence(first, vec![Evidence::web_source("https://x", "t", "c")]);

        let last = store.messages().last().unwrap();
        assert_eq!(last.content, "");
        assert!(last.evidence.is_empty());

        store.append_chunk(retry, "real text");
        assert_eq!(store.messages().last().unwrap().content, "real text");
    }

    #[test]
    fn test_drop_placeholder_keeps_user_message() {
        let mut store = store();
        let token = store.begin_turn("question").unwrap();
        store.append_chunk(token, "doomed");
        store.drop_placeholder(token);

        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].role, MessageRole::User);
        assert!(!store.turn_in_progress());
    }

    #[test]
    fn test_fail_turn_writes_fallback_and_completes() {
        let mut store = store();
        let token = store.begin_turn("question").unwrap();
        store.append_chunk(token, "partial answer");
        store.fail_turn(token, "죄송합니다. 다시 시도해주세요.");

        assert!(!store.turn_in_progress());
        let last = store.messages().last().unwrap();
        assert_eq!(last.content, "죄송합니다. 다시 시도해주세요.");
    }

    #[test]
    fn test_reset_invalidates_outstanding_token() {
        let mut store = store();
        let token = store.begin_turn("question").unwrap();
        store.reset();

        assert!(store.messages().is_empty());
        // A late event against the now-different log is a no-op.
        store.append_chunk(token, "late");
        assert!(store.messages().is_empty());
    }

    #[test]
    fn test_terminated_session_rejects_turns() {
        let mut store = store();
        store.terminate();
        let err = store.begin_turn("question").unwrap_err();
        assert!(matches!(err, JiwonError::SessionClosed));
    }

    #[test]
    fn test_evidence_attaches_to_in_progress_message() {
        let mut store = store();
        let token = store.begin_turn("question").unwrap();
        let evidence = vec![
            Evidence::policy_doc(7, "chunk-1", "문서 발췌"),
            Evidence::web_source("https://news.example", "기사", "본문"),
        ];
        store.attach_evidence(token, evidence.clone());
        store.complete_turn(token);

        assert_eq!(store.messages().last().unwrap().evidence, evidence);
    }

    #[test]
    fn test_replace_log_skipped_mid_turn() {
        let mut store = store();
        let _token = store.begin_turn("question").unwrap();
        store.replace_log(Vec::new());
        assert_eq!(store.messages().len(), 2);
    }
}
