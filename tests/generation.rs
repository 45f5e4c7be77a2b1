//! Orchestrator tests: the full streaming state machine driven by scripted
//! completion and mock embedding providers.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

use docweave::generation::{
    ChatEngine, ChatEvent, ChatRequest, GenerationConfig, INVALID_SESSION_ERROR,
};
use docweave::message::Message;
use docweave::providers::{CompletionProvider, DeltaStream, MockEmbeddingProvider};
use docweave::retrieval::RetrievalEngine;
use docweave::stores::{
    GoalStore, InMemoryGoalStore, InMemorySessionStore, MemoryStore, SessionStore, SharedMemory,
};
use docweave::types::EngineError;

/// Completion provider that answers the main request with scripted deltas
/// and the extraction prompts with fixed replies.
#[derive(Clone)]
struct ScriptedCompletionProvider {
    deltas: Vec<String>,
    fail_after: Option<usize>,
    memory_reply: String,
    goal_reply: String,
}

impl ScriptedCompletionProvider {
    fn new(deltas: &[&str]) -> Self {
        Self {
            deltas: deltas.iter().map(|s| s.to_string()).collect(),
            fail_after: None,
            memory_reply: r#"{"save": false}"#.into(),
            goal_reply: r#"{"save": false}"#.into(),
        }
    }

    fn with_memory_reply(mut self, reply: &str) -> Self {
        self.memory_reply = reply.into();
        self
    }

    fn with_goal_reply(mut self, reply: &str) -> Self {
        self.goal_reply = reply.into();
        self
    }

    fn failing_after(mut self, deltas: usize) -> Self {
        self.fail_after = Some(deltas);
        self
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletionProvider {
    async fn stream_chat(
        &self,
        messages: &[Message],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<DeltaStream, EngineError> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        if last.contains("Learning Memory Scanner") {
            let reply = self.memory_reply.clone();
            return Ok(stream! { yield Ok(reply); }.boxed());
        }
        if last.contains("Goal Detection Assistant") {
            let reply = self.goal_reply.clone();
            return Ok(stream! { yield Ok(reply); }.boxed());
        }

        let deltas = self.deltas.clone();
        let fail_after = self.fail_after;
        Ok(stream! {
            let total = deltas.len();
            for (sent, delta) in deltas.into_iter().enumerate() {
                if fail_after == Some(sent) {
                    yield Err(EngineError::Provider("stream interrupted".into()));
                    return;
                }
                yield Ok(delta);
            }
            if fail_after.is_some_and(|n| n >= total) {
                yield Err(EngineError::Provider("stream interrupted".into()));
            }
        }
        .boxed())
    }
}

/// Memory store that always fails, for the degradation path.
struct FailingMemoryStore;

#[async_trait]
impl MemoryStore for FailingMemoryStore {
    async fn get(&self) -> Result<Option<String>, EngineError> {
        Err(EngineError::Persistence("memory store offline".into()))
    }

    async fn append(&self, _line: &str) -> Result<(), EngineError> {
        Err(EngineError::Persistence("memory store offline".into()))
    }
}

struct Harness {
    engine: ChatEngine,
    sessions: Arc<InMemorySessionStore>,
    memory: Arc<SharedMemory>,
    goals: Arc<InMemoryGoalStore>,
    _dir: tempfile::TempDir,
}

/// Installs a fmt subscriber once so degradation paths log under
/// `RUST_LOG=docweave=warn` instead of vanishing.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn harness(completion: ScriptedCompletionProvider) -> Harness {
    init_tracing();
    let dir = tempdir().unwrap();
    let retrieval = Arc::new(
        RetrievalEngine::open(dir.path(), Arc::new(MockEmbeddingProvider::new(64)))
            .await
            .unwrap(),
    );
    let sessions = Arc::new(InMemorySessionStore::new());
    let memory = Arc::new(SharedMemory::new());
    let goals = Arc::new(InMemoryGoalStore::new());
    let engine = ChatEngine::new(
        retrieval,
        Arc::new(completion),
        sessions.clone(),
        memory.clone(),
        goals.clone(),
        GenerationConfig::default(),
    );
    Harness {
        engine,
        sessions,
        memory,
        goals,
        _dir: dir,
    }
}

async fn collect_events(rx: flume::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_async().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}

#[tokio::test]
async fn invalid_session_emits_exactly_one_terminal_event() {
    let h = harness(ScriptedCompletionProvider::new(&["should", "not", "run"])).await;

    let rx = h.engine.stream_response(ChatRequest::new("ghost", "hello"));
    let events = collect_events(rx).await;

    assert_eq!(events.len(), 1);
    let ChatEvent::Terminal(meta) = &events[0] else {
        panic!("expected a terminal event");
    };
    assert_eq!(meta.error.as_deref(), Some(INVALID_SESSION_ERROR));
}

#[tokio::test]
async fn deltas_arrive_in_order_and_terminal_carries_metadata() {
    let completion = ScriptedCompletionProvider::new(&["Mitosis", " is", " cell division."])
        .with_memory_reply(r#"{"save": true, "memory": "Studying cell division"}"#)
        .with_goal_reply(
            r#"{"save": true, "goals": [{"title": "Pass the biology exam", "description": "Revise mitosis and meiosis"}]}"#,
        );
    let h = harness(completion).await;
    h.sessions.create_session("s1");

    let rx = h
        .engine
        .stream_response(ChatRequest::new("s1", "what is mitosis?"));
    let events = collect_events(rx).await;

    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Delta(text) => Some(text.as_str()),
            ChatEvent::Terminal(_) => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Mitosis", " is", " cell division."]);

    let ChatEvent::Terminal(meta) = events.last().unwrap() else {
        panic!("stream must end with a terminal event");
    };
    assert_eq!(meta.error, None);
    assert!(meta.response_id.is_some());
    assert!(meta.memory_saved);
    assert_eq!(meta.memory_text.as_deref(), Some("Studying cell division"));
    assert_eq!(meta.goals_created.len(), 1);
    assert_eq!(meta.goals_created[0].title, "Pass the biology exam");
    assert_eq!(meta.goals_created[0].status, "pending");

    // The exchange was persisted as two ordered messages.
    let turns = h.sessions.recent_messages("s1", 10).await.unwrap();
    assert_eq!(turns.len(), 2);
    assert!(turns[0].is_user);
    assert_eq!(turns[0].content, "what is mitosis?");
    assert!(!turns[1].is_user);
    assert_eq!(turns[1].content, "Mitosis is cell division.");

    // Memory and goals landed in their stores.
    assert_eq!(
        h.memory.get().await.unwrap().as_deref(),
        Some("Studying cell division")
    );
    assert_eq!(h.goals.list("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn empty_deltas_are_swallowed() {
    let completion = ScriptedCompletionProvider::new(&["", "Hello", "", " world", ""]);
    let h = harness(completion).await;
    h.sessions.create_session("s1");

    let rx = h.engine.stream_response(ChatRequest::new("s1", "hi"));
    let events = collect_events(rx).await;

    let deltas: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Delta(text) => Some(text.as_str()),
            ChatEvent::Terminal(_) => None,
        })
        .collect();
    assert_eq!(deltas, vec!["Hello", " world"]);

    let turns = h.sessions.recent_messages("s1", 10).await.unwrap();
    assert_eq!(turns[1].content, "Hello world");
}

#[tokio::test]
async fn mid_stream_provider_failure_ends_with_terminal_error() {
    let completion = ScriptedCompletionProvider::new(&["partial", " answer"]).failing_after(1);
    let h = harness(completion).await;
    h.sessions.create_session("s1");

    let rx = h.engine.stream_response(ChatRequest::new("s1", "hi"));
    let events = collect_events(rx).await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ChatEvent::Delta("partial".into()));
    let ChatEvent::Terminal(meta) = &events[1] else {
        panic!("expected terminal error event");
    };
    assert!(meta.error.as_deref().unwrap().contains("stream interrupted"));

    // The failed exchange is not persisted.
    assert!(h.sessions.recent_messages("s1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_context_source_degrades_to_empty_context() {
    init_tracing();
    let dir = tempdir().unwrap();
    let retrieval = Arc::new(
        RetrievalEngine::open(dir.path(), Arc::new(MockEmbeddingProvider::new(64)))
            .await
            .unwrap(),
    );
    let sessions = Arc::new(InMemorySessionStore::new());
    sessions.create_session("s1");
    let engine = ChatEngine::new(
        retrieval,
        Arc::new(ScriptedCompletionProvider::new(&["still", " works"])),
        sessions.clone(),
        Arc::new(FailingMemoryStore),
        Arc::new(InMemoryGoalStore::new()),
        GenerationConfig::default(),
    );

    let rx = engine.stream_response(ChatRequest::new("s1", "hello"));
    let events = collect_events(rx).await;

    let ChatEvent::Terminal(meta) = events.last().unwrap() else {
        panic!("stream must end with a terminal event");
    };
    assert_eq!(meta.error, None);
    assert!(!meta.memory_saved, "memory append cannot succeed when the store is down");
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ChatEvent::Delta(_)))
            .count(),
        2
    );
}

#[tokio::test]
async fn disconnected_caller_still_gets_bookkeeping() {
    let completion = ScriptedCompletionProvider::new(&["long", " streamed", " response"])
        .with_memory_reply(r#"{"save": true, "memory": "Persistent fact"}"#);
    let h = harness(completion).await;
    h.sessions.create_session("s1");

    let rx = h.engine.stream_response(ChatRequest::new("s1", "hi"));
    // Take one delta, then hang up.
    let first = rx.recv_async().await.unwrap();
    assert_eq!(first, ChatEvent::Delta("long".into()));
    drop(rx);

    // Persistence and extraction continue in the background.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let turns = h.sessions.recent_messages("s1", 10).await.unwrap();
        if turns.len() == 2 {
            assert_eq!(turns[1].content, "long streamed response");
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "bookkeeping never completed after caller disconnect"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if h.memory.get().await.unwrap().as_deref() == Some("Persistent fact") {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "memory extraction never completed after caller disconnect"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn retrieval_context_reaches_the_completion_prompt() {
    // Capture the messages the orchestrator assembles.
    #[derive(Clone)]
    struct CapturingProvider {
        inner: ScriptedCompletionProvider,
        seen: Arc<parking_lot::Mutex<Vec<Vec<Message>>>>,
    }

    #[async_trait]
    impl CompletionProvider for CapturingProvider {
        async fn stream_chat(
            &self,
            messages: &[Message],
            temperature: f32,
            max_tokens: u32,
        ) -> Result<DeltaStream, EngineError> {
            self.seen.lock().push(messages.to_vec());
            self.inner.stream_chat(messages, temperature, max_tokens).await
        }
    }

    init_tracing();
    let dir = tempdir().unwrap();
    let retrieval = Arc::new(
        RetrievalEngine::open(dir.path(), Arc::new(MockEmbeddingProvider::new(64)))
            .await
            .unwrap(),
    );
    retrieval
        .ingest("the krebs cycle produces ATP in mitochondria", "bio.txt", None)
        .await
        .unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sessions = Arc::new(InMemorySessionStore::new());
    sessions.create_session("s1");
    let engine = ChatEngine::new(
        retrieval,
        Arc::new(CapturingProvider {
            inner: ScriptedCompletionProvider::new(&["ok"]),
            seen: seen.clone(),
        }),
        sessions,
        Arc::new(SharedMemory::new()),
        Arc::new(InMemoryGoalStore::new()),
        GenerationConfig::default(),
    );

    let rx = engine.stream_response(ChatRequest::new(
        "s1",
        "the krebs cycle produces ATP in mitochondria",
    ));
    collect_events(rx).await;

    let calls = seen.lock();
    let main_call = &calls[0];
    assert!(main_call[0].has_role(Message::SYSTEM));
    assert!(main_call[0].content.contains("Relevant Document Context"));
    assert!(main_call[0].content.contains("bio.txt"));
    assert!(main_call.last().unwrap().has_role(Message::USER));
}
