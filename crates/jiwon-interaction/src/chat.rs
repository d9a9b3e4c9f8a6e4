//! Chat service: coordinates one "send user message" operation.
//!
//! The service wraps the stream transport with cache-miss recovery. A turn
//! runs through an explicit phase machine:
//!
//! ```text
//! Sending --(done)-------------------------------> Terminal
//! Sending --(cache miss)-> Reinitializing -> Retrying --(done)--> Terminal
//! Sending --(other error)---------------> Failing -> Terminal
//! Retrying --(any error)----------------> Failing -> Terminal
//! ```
//!
//! `Retrying` can only reach `Terminal` (directly or through `Failing`), so a
//! turn retries at most once no matter what the retried stream reports.

use std::sync::Arc;

use jiwon_core::session::{
    ChatMessage, ContextRef, ConversationRepository, PersistenceBridge, SessionStore, TurnToken,
};
use jiwon_core::{JiwonError, Result};

use crate::context::RemoteContext;
use crate::protocol::ChatRequest;
use crate::stream::{NullObserver, StatusObserver, TurnError, TurnTransport};

/// User-facing text shown when a turn fails without a server-provided message.
pub const FALLBACK_ANSWER: &str =
    "죄송합니다. 메시지 전송 중 오류가 발생했습니다. 다시 시도해주세요.";

/// Outcome of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The turn ran to completion (possibly ending in a fallback answer).
    Completed,
    /// The send was a no-op: empty input, a turn still in progress, or a
    /// torn-down session.
    Rejected,
}

enum TurnPhase {
    Sending { token: TurnToken },
    Reinitializing,
    Retrying,
    Failing { token: TurnToken, error: TurnError },
    Terminal,
}

/// Coordinates sends, streaming, retry, and persistence for one conversation.
pub struct ChatService {
    session: Arc<PersistenceBridge>,
    transport: Arc<dyn TurnTransport>,
    remote: Arc<dyn RemoteContext>,
    observer: Arc<dyn StatusObserver>,
}

impl ChatService {
    /// Wraps an already-opened session bridge.
    pub fn new(
        session: Arc<PersistenceBridge>,
        transport: Arc<dyn TurnTransport>,
        remote: Arc<dyn RemoteContext>,
    ) -> Self {
        Self {
            session,
            transport,
            remote,
            observer: Arc::new(NullObserver),
        }
    }

    /// Attaches a status observer for diagnostics.
    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Opens the conversation for `context`: restores persisted messages and
    /// establishes remote context.
    ///
    /// A failed initialization is logged, not fatal: the first send recovers
    /// through the cache-miss retry path.
    pub async fn open(
        context: ContextRef,
        repository: Arc<dyn ConversationRepository>,
        transport: Arc<dyn TurnTransport>,
        remote: Arc<dyn RemoteContext>,
    ) -> Self {
        let session = Arc::new(PersistenceBridge::open(context, repository).await);
        let service = Self::new(session, transport, remote);

        let (session_id, context) = service.identity().await;
        if let Err(err) = service.remote.initialize(&session_id, &context).await {
            tracing::warn!(%err, "failed to initialize remote context");
        }
        service
    }

    /// The session bridge, for hosts that share it across components.
    pub fn session(&self) -> &Arc<PersistenceBridge> {
        &self.session
    }

    /// Snapshot of the message log, for rendering.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.session.messages().await
    }

    async fn identity(&self) -> (String, ContextRef) {
        self.session
            .read(|s| (s.session_id().to_string(), s.context().clone()))
            .await
    }

    /// Sends one user message and drives its turn to a terminal state.
    ///
    /// Rejected (as a no-op) while a previous turn is still streaming.
    /// Every failure path resolves into a renderable assistant message; the
    /// returned error covers only local session faults (e.g. a send after
    /// teardown racing the turn).
    pub async fn send_message(&self, text: &str) -> Result<SendStatus> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SendStatus::Rejected);
        }

        let token = match self.session.mutate(|s| s.begin_turn(text)).await {
            Ok(token) => token,
            Err(JiwonError::TurnInProgress) | Err(JiwonError::SessionClosed) => {
                return Ok(SendStatus::Rejected);
            }
            Err(err) => return Err(err),
        };

        let request = self
            .session
            .read(|s| ChatRequest {
                session_id: s.session_id().to_string(),
                message: text.to_string(),
                policy_id: s.context().wire_policy_id(),
            })
            .await;

        let mut phase = TurnPhase::Sending { token };
        loop {
            phase = match phase {
                TurnPhase::Sending { token } => match self.run_attempt(&request, token).await {
                    Ok(()) => TurnPhase::Terminal,
                    Err(error) if error.is_cache_miss() => {
                        // The retried stream gets a fresh placeholder; the
                        // user message stays.
                        self.session.mutate(|s| s.drop_placeholder(token)).await;
                        TurnPhase::Reinitializing
                    }
                    Err(error) => TurnPhase::Failing { token, error },
                },

                TurnPhase::Reinitializing => {
                    tracing::debug!("cache miss detected, reinitializing remote context");
                    let (session_id, context) = self.identity().await;
                    match self.remote.initialize(&session_id, &context).await {
                        Ok(()) => TurnPhase::Retrying,
                        Err(err) => {
                            tracing::warn!(%err, "failed to reinitialize remote context");
                            let token = self.session.mutate(SessionStore::recreate_placeholder).await?;
                            TurnPhase::Failing {
                                token,
                                error: TurnError::transport(err.to_string()),
                            }
                        }
                    }
                }

                TurnPhase::Retrying => {
                    let token = self.session.mutate(SessionStore::recreate_placeholder).await?;
                    match self.run_attempt(&request, token).await {
                        Ok(()) => TurnPhase::Terminal,
                        // A second cache miss is not retried again.
                        Err(error) => TurnPhase::Failing { token, error },
                    }
                }

                TurnPhase::Failing { token, error } => {
                    let text = fallback_text(&error);
                    self.session.mutate(|s| s.fail_turn(token, &text)).await;
                    TurnPhase::Terminal
                }

                TurnPhase::Terminal => break,
            };
        }

        Ok(SendStatus::Completed)
    }

    async fn run_attempt(&self, request: &ChatRequest, token: TurnToken) -> std::result::Result<(), TurnError> {
        self.transport
            .run_turn(request, &self.session, token, self.observer.as_ref())
            .await
    }

    /// Starts a new conversation: clears the in-memory log and the persisted
    /// slot. The session identity is kept.
    pub async fn reset(&self) -> Result<()> {
        self.session.mutate(SessionStore::reset).await;
        self.session.clear_persisted().await
    }

    /// Re-runs restoration when the hosting view regains visibility.
    pub async fn on_resume(&self) {
        self.session.on_resume().await;
    }

    /// Tears the session down: fires a best-effort remote cleanup without
    /// waiting for its result, then clears local and persisted state.
    pub async fn teardown(&self) -> Result<()> {
        let (session_id, _) = self.identity().await;
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            if let Err(err) = remote.cleanup(&session_id).await {
                tracing::warn!(%err, "remote cleanup failed");
            }
        });

        self.session.terminate().await
    }
}

fn fallback_text(error: &TurnError) -> String {
    match error {
        TurnError::Remote { message, .. } if !message.is_empty() => message.clone(),
        _ => FALLBACK_ANSWER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use jiwon_core::evidence::Evidence;
    use jiwon_core::session::MessageRole;

    use super::*;
    use crate::protocol::CACHE_MISS_CODE;

    #[derive(Default)]
    struct MemoryRepository {
        slots: StdMutex<HashMap<String, Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl ConversationRepository for MemoryRepository {
        async fn restore(&self, key: &str) -> Vec<ChatMessage> {
            self.slots
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_default()
        }

        async fn save(&self, key: &str, messages: &[ChatMessage]) -> Result<()> {
            self.slots
                .lock()
                .unwrap()
                .insert(key.to_string(), messages.to_vec());
            Ok(())
        }

        async fn clear(&self, key: &str) -> Result<()> {
            self.slots.lock().unwrap().remove(key);
            Ok(())
        }
    }

    /// A turn attempt the scripted transport should play back.
    enum Attempt {
        Succeed {
            chunks: Vec<&'static str>,
            evidence: Vec<Evidence>,
        },
        Fail(TurnError),
    }

    struct ScriptedTransport {
        script: StdMutex<VecDeque<Attempt>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Attempt>) -> Self {
            Self {
                script: StdMutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TurnTransport for ScriptedTransport {
        async fn run_turn(
            &self,
            _request: &ChatRequest,
            session: &PersistenceBridge,
            token: TurnToken,
            _observer: &dyn StatusObserver,
        ) -> std::result::Result<(), TurnError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let attempt = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more times than scripted");
            match attempt {
                Attempt::Succeed { chunks, evidence } => {
                    for chunk in chunks {
                        session.mutate(|s| s.append_chunk(token, chunk)).await;
                    }
                    if !evidence.is_empty() {
                        session.mutate(|s| s.attach_evidence(token, evidence)).await;
                    }
                    session.mutate(|s| s.complete_turn(token)).await;
                    Ok(())
                }
                Attempt::Fail(error) => Err(error),
            }
        }
    }

    #[derive(Default)]
    struct MockRemote {
        init_calls: AtomicUsize,
        cleanup_calls: AtomicUsize,
        fail_init: bool,
    }

    #[async_trait]
    impl RemoteContext for MockRemote {
        async fn initialize(&self, _session_id: &str, _context: &ContextRef) -> Result<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(JiwonError::transport("init failed"));
            }
            Ok(())
        }

        async fn cleanup(&self, _session_id: &str) -> Result<()> {
            self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn cache_miss() -> TurnError {
        TurnError::Remote {
            code: CACHE_MISS_CODE.to_string(),
            message: String::new(),
        }
    }

    fn service(
        script: Vec<Attempt>,
    ) -> (ChatService, Arc<ScriptedTransport>, Arc<MockRemote>, Arc<MemoryRepository>) {
        let repository = Arc::new(MemoryRepository::default());
        let transport = Arc::new(ScriptedTransport::new(script));
        let remote = Arc::new(MockRemote::default());
        let bridge = Arc::new(PersistenceBridge::new(
            SessionStore::new(ContextRef::Policy { policy_id: 7 }),
            repository.clone(),
        ));
        let service = ChatService::new(bridge, transport.clone(), remote.clone());
        (service, transport, remote, repository)
    }

    #[tokio::test]
    async fn test_successful_turn_streams_into_log() {
        let evidence = vec![Evidence::web_source("https://a.example", "A", "a")];
        let (service, transport, remote, _repo) = service(vec![Attempt::Succeed {
            chunks: vec!["지원 ", "대상입니다."],
            evidence: evidence.clone(),
        }]);

        let status = service.send_message("누가 지원할 수 있나요?").await.unwrap();
        assert_eq!(status, SendStatus::Completed);
        assert_eq!(transport.calls(), 1);
        assert_eq!(remote.init_calls.load(Ordering::SeqCst), 0);

        let messages = service.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content, "지원 대상입니다.");
        assert_eq!(messages[1].evidence, evidence);
    }

    #[tokio::test]
    async fn test_cache_miss_reinitializes_and_retries_once() {
        let (service, transport, remote, _repo) = service(vec![
            Attempt::Fail(cache_miss()),
            Attempt::Succeed {
                chunks: vec!["재시도 답변"],
                evidence: Vec::new(),
            },
        ]);

        let status = service.send_message("질문").await.unwrap();
        assert_eq!(status, SendStatus::Completed);
        assert_eq!(transport.calls(), 2);
        assert_eq!(remote.init_calls.load(Ordering::SeqCst), 1);

        // Exactly one user message and one assistant message survive.
        let messages = service.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "재시도 답변");
    }

    #[tokio::test]
    async fn test_second_cache_miss_falls_back_without_another_retry() {
        let (service, transport, remote, _repo) =
            service(vec![Attempt::Fail(cache_miss()), Attempt::Fail(cache_miss())]);

        service.send_message("질문").await.unwrap();
        assert_eq!(transport.calls(), 2);
        assert_eq!(remote.init_calls.load(Ordering::SeqCst), 1);

        let messages = service.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_non_cache_miss_error_is_not_retried() {
        let (service, transport, remote, _repo) = service(vec![Attempt::Fail(TurnError::Remote {
            code: "INTERNAL".to_string(),
            message: "서버 오류가 발생했습니다.".to_string(),
        })]);

        service.send_message("질문").await.unwrap();
        assert_eq!(transport.calls(), 1);
        assert_eq!(remote.init_calls.load(Ordering::SeqCst), 0);

        let messages = service.messages().await;
        assert_eq!(messages[1].content, "서버 오류가 발생했습니다.");
    }

    #[tokio::test]
    async fn test_transport_failure_shows_fallback() {
        let (service, _transport, _remote, _repo) =
            service(vec![Attempt::Fail(TurnError::transport("connection reset"))]);

        service.send_message("질문").await.unwrap();
        let messages = service.messages().await;
        assert_eq!(messages[1].content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_failed_reinitialization_falls_back() {
        let repository = Arc::new(MemoryRepository::default());
        let transport = Arc::new(ScriptedTransport::new(vec![Attempt::Fail(cache_miss())]));
        let remote = Arc::new(MockRemote {
            fail_init: true,
            ..Default::default()
        });
        let bridge = Arc::new(PersistenceBridge::new(
            SessionStore::new(ContextRef::Policy { policy_id: 7 }),
            repository,
        ));
        let service = ChatService::new(bridge, transport.clone(), remote.clone());

        service.send_message("질문").await.unwrap();
        assert_eq!(transport.calls(), 1);
        let messages = service.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_send_rejected_while_turn_in_progress() {
        let (service, transport, _remote, _repo) = service(vec![]);
        // Occupy the in-progress slot out-of-band.
        let _token = service
            .session()
            .mutate(|s| s.begin_turn("먼저 보낸 질문"))
            .await
            .unwrap();

        let status = service.send_message("두 번째 질문").await.unwrap();
        assert_eq!(status, SendStatus::Rejected);
        assert_eq!(transport.calls(), 0);
        // No second placeholder was appended.
        assert_eq!(service.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let (service, transport, _remote, _repo) = service(vec![]);
        let status = service.send_message("   ").await.unwrap();
        assert_eq!(status, SendStatus::Rejected);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_reset_clears_log_and_slot() {
        let (service, _transport, _remote, repo) = service(vec![Attempt::Succeed {
            chunks: vec!["답변"],
            evidence: Vec::new(),
        }]);
        service.send_message("질문").await.unwrap();
        assert!(!repo.restore("qa_messages_7").await.is_empty());

        service.reset().await.unwrap();
        assert!(service.messages().await.is_empty());
        assert!(repo.restore("qa_messages_7").await.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_cleans_up_and_rejects_further_sends() {
        let (service, _transport, remote, repo) = service(vec![Attempt::Succeed {
            chunks: vec!["답변"],
            evidence: Vec::new(),
        }]);
        service.send_message("질문").await.unwrap();

        service.teardown().await.unwrap();
        // Let the fire-and-forget cleanup task run.
        tokio::task::yield_now().await;

        assert_eq!(remote.cleanup_calls.load(Ordering::SeqCst), 1);
        assert!(repo.restore("qa_messages_7").await.is_empty());
        let status = service.send_message("또 질문").await.unwrap();
        assert_eq!(status, SendStatus::Rejected);
    }
}
