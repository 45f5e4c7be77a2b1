//! The streaming generation orchestrator.
//!
//! Drives one request through the state machine
//! `INIT → CONTEXT_LOADED → STREAMING → PERSISTING → EXTRACTING → DONE`:
//! validates the session, gathers memory/goals/retrieval context (each source
//! degrading independently to empty on failure), relays completion deltas to
//! the caller as they arrive, persists the exchange, and finally runs memory
//! and goal extraction before emitting one terminal event.
//!
//! Events are delivered over a `flume` channel. If the caller disconnects
//! mid-stream, forwarding stops but persistence and extraction still run —
//! the partial response may already be materially complete.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::compose;
use crate::extraction::{extract_goals, extract_memory, GoalVerdict, MemoryVerdict};
use crate::message::Message;
use crate::providers::CompletionProvider;
use crate::retrieval::RetrievalEngine;
use crate::stores::{Goal, GoalStore, MemoryStore, SessionStore};

/// Terminal error emitted for an unknown session identifier.
pub const INVALID_SESSION_ERROR: &str = "Invalid session ID";

/// Tunables for response generation.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    /// Base system prompt the context preamble is appended to.
    pub system_prompt: String,
    /// Sampling temperature for the main response.
    pub temperature: f32,
    /// Token budget for the main response.
    pub max_tokens: u32,
    /// Maximum retrieval chunks composed into the preamble.
    pub max_chunks: usize,
    /// Number of recent history messages included, chronological order.
    pub history_turns: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful learning assistant.".into(),
            temperature: 0.7,
            max_tokens: 3000,
            max_chunks: 3,
            history_turns: 5,
        }
    }
}

/// One chat request.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    /// Session the request belongs to.
    pub session_id: String,
    /// The user's query.
    pub query: String,
    /// Restrict retrieval to one document; `None` searches the whole corpus.
    pub document_scope: Option<String>,
}

impl ChatRequest {
    /// Creates a corpus-wide request.
    #[must_use]
    pub fn new(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            document_scope: None,
        }
    }

    /// Restricts retrieval to a single document.
    #[must_use]
    pub fn scoped_to(mut self, document_id: impl Into<String>) -> Self {
        self.document_scope = Some(document_id.into());
        self
    }
}

/// Metadata carried by the final event of a response stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TerminalEvent {
    /// Error description; `None` for a successful response.
    pub error: Option<String>,
    /// Identifier of the persisted assistant message, when persistence
    /// succeeded.
    pub response_id: Option<String>,
    /// Goals created by extraction.
    pub goals_created: Vec<Goal>,
    /// Whether a memory line was appended.
    pub memory_saved: bool,
    /// The appended memory text, when saved.
    pub memory_text: Option<String>,
}

impl TerminalEvent {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// One event in a response stream: an incremental text delta or the terminal
/// event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// Non-empty incremental response text.
    Delta(String),
    /// Final event of the stream.
    Terminal(TerminalEvent),
}

impl ChatEvent {
    /// Returns `true` for the terminal event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Terminal(_))
    }

    /// Wire representation: `{"text": ..., "terminal": false}` for deltas,
    /// `{"terminal": true, ...metadata}` for the terminal event.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            ChatEvent::Delta(text) => json!({ "text": text, "terminal": false }),
            ChatEvent::Terminal(meta) => json!({
                "terminal": true,
                "error": meta.error,
                "response_id": meta.response_id,
                "goals_created": meta.goals_created,
                "memory_saved": meta.memory_saved,
                "memory_text": meta.memory_text,
            }),
        }
    }
}

/// Streaming chat engine over retrieval, session, memory, and goal stores.
#[derive(Clone)]
pub struct ChatEngine {
    retrieval: Arc<RetrievalEngine>,
    completion: Arc<dyn CompletionProvider>,
    sessions: Arc<dyn SessionStore>,
    memory: Arc<dyn MemoryStore>,
    goals: Arc<dyn GoalStore>,
    config: GenerationConfig,
}

impl ChatEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        completion: Arc<dyn CompletionProvider>,
        sessions: Arc<dyn SessionStore>,
        memory: Arc<dyn MemoryStore>,
        goals: Arc<dyn GoalStore>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            retrieval,
            completion,
            sessions,
            memory,
            goals,
            config,
        }
    }

    /// Starts generating a response and returns the event stream.
    ///
    /// Deltas arrive in completion order; the stream always ends with exactly
    /// one [`ChatEvent::Terminal`].
    pub fn stream_response(&self, request: ChatRequest) -> flume::Receiver<ChatEvent> {
        let (tx, rx) = flume::unbounded();
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(request, tx).await;
        });
        rx
    }

    async fn run(&self, request: ChatRequest, tx: flume::Sender<ChatEvent>) {
        // INIT: the session must exist before any work is done.
        match self.sessions.exists(&request.session_id).await {
            Ok(true) => {}
            Ok(false) => {
                let _ = tx.send(ChatEvent::Terminal(TerminalEvent::failed(
                    INVALID_SESSION_ERROR,
                )));
                return;
            }
            Err(err) => {
                let _ = tx.send(ChatEvent::Terminal(TerminalEvent::failed(format!(
                    "session lookup failed: {err}"
                ))));
                return;
            }
        }

        // CONTEXT_LOADED: each source degrades to empty independently;
        // partial context beats aborting the request.
        let memory_text = match self.memory.get().await {
            Ok(text) => text.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "failed to load memory context");
                String::new()
            }
        };

        let goal_list = match self.goals.list(&request.session_id).await {
            Ok(goals) => goals,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load goals context");
                Vec::new()
            }
        };

        let hits = match self
            .retrieval
            .search(
                &request.query,
                self.config.max_chunks,
                request.document_scope.as_deref(),
            )
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load retrieval context");
                Vec::new()
            }
        };

        let mut messages = Vec::new();
        let mut system_text = self.config.system_prompt.clone();
        system_text.push_str(&compose(&memory_text, &goal_list, &hits));
        if !system_text.is_empty() {
            messages.push(Message::system(&system_text));
        }

        match self
            .sessions
            .recent_messages(&request.session_id, self.config.history_turns)
            .await
        {
            Ok(history) => {
                for turn in history {
                    let role = if turn.is_user {
                        Message::USER
                    } else {
                        Message::ASSISTANT
                    };
                    messages.push(Message::new(role, &turn.content));
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load recent messages");
            }
        }
        messages.push(Message::user(&request.query));

        // STREAMING: relay non-empty deltas in arrival order. No retry on
        // provider failure; the caller may re-issue the request.
        let mut stream = match self
            .completion
            .stream_chat(&messages, self.config.temperature, self.config.max_tokens)
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                let _ = tx.send(ChatEvent::Terminal(TerminalEvent::failed(format!(
                    "Error generating response: {err}"
                ))));
                return;
            }
        };

        let mut full_response = String::new();
        let mut client_gone = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    if delta.is_empty() {
                        continue;
                    }
                    full_response.push_str(&delta);
                    if !client_gone && tx.send(ChatEvent::Delta(delta)).is_err() {
                        // Caller disconnected: stop forwarding, keep the
                        // bookkeeping going.
                        client_gone = true;
                    }
                }
                Err(err) => {
                    let _ = tx.send(ChatEvent::Terminal(TerminalEvent::failed(format!(
                        "Error generating response: {err}"
                    ))));
                    return;
                }
            }
        }

        // PERSISTING: the text is already delivered; failures are logged,
        // never surfaced.
        if let Err(err) = self
            .sessions
            .append_message(&request.session_id, &request.query, true)
            .await
        {
            tracing::warn!(error = %err, "failed to persist user message");
        }
        let response_id = match self
            .sessions
            .append_message(&request.session_id, &full_response, false)
            .await
        {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist assistant message");
                None
            }
        };

        // EXTRACTING: memory and goals are isolated from each other and from
        // the delivered response.
        let mut memory_saved = false;
        let mut memory_text = None;
        match extract_memory(self.completion.as_ref(), &request.query, &full_response).await {
            Ok(MemoryVerdict::Save { memory }) => match self.memory.append(&memory).await {
                Ok(()) => {
                    memory_saved = true;
                    memory_text = Some(memory);
                }
                Err(err) => tracing::warn!(error = %err, "failed to append extracted memory"),
            },
            Ok(MemoryVerdict::NoSave) => {}
            Err(err) => tracing::warn!(error = %err, "memory extraction failed"),
        }

        let mut goals_created = Vec::new();
        match extract_goals(
            self.completion.as_ref(),
            &request.query,
            &full_response,
            Utc::now().date_naive(),
        )
        .await
        {
            Ok(GoalVerdict::Save(drafts)) => {
                for draft in drafts {
                    match self.goals.create(&request.session_id, draft).await {
                        Ok(goal) => goals_created.push(goal),
                        Err(err) => tracing::warn!(error = %err, "failed to create extracted goal"),
                    }
                }
            }
            Ok(GoalVerdict::NoSave) => {}
            Err(err) => tracing::warn!(error = %err, "goal extraction failed"),
        }

        // DONE
        let _ = tx.send(ChatEvent::Terminal(TerminalEvent {
            error: None,
            response_id,
            goals_created,
            memory_saved,
            memory_text,
        }));
    }
}
