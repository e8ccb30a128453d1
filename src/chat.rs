//! Transient chat sessions held in process memory.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::embeddings::ScoredPassage;
use crate::rag::{Reply, Turn};
use crate::topics::{ASSISTANT_NAME, REFUSAL_MESSAGE, WELCOME_MESSAGES};

const USER_AUTHOR: &str = "You";
const PREVIEW_CHARS: usize = 160;

/// Idle time after which a session is dropped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Kind of a transcript entry or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Greeting shown when the session opens.
    Welcome,
    /// User question.
    Question,
    /// Grounded answer.
    Answer,
    /// Fixed refusal for off-topic questions.
    Refusal,
}

/// One line of a session transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    /// Display author.
    pub author: String,
    /// Entry kind.
    pub kind: MessageKind,
    /// Text shown to the user.
    pub content: String,
}

/// Passage reference returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    /// Passage identifier.
    pub id: String,
    /// Similarity reported by the index.
    pub score: f32,
    /// Leading characters of the passage text.
    pub preview: String,
}

impl From<&ScoredPassage> for SourceRef {
    fn from(passage: &ScoredPassage) -> Self {
        Self {
            id: passage.id.clone(),
            score: passage.score,
            preview: preview(&passage.text),
        }
    }
}

/// Reply to one posted message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// `answer` or `refusal`.
    pub kind: MessageKind,
    /// Text shown to the user.
    pub content: String,
    /// Route picked by the topic gate.
    pub route: Option<String>,
    /// Topic gate similarity.
    pub score: f32,
    /// Passages the answer was grounded on.
    pub sources: Vec<SourceRef>,
}

impl From<Reply> for ChatReply {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Refused { decision } => Self {
                kind: MessageKind::Refusal,
                content: REFUSAL_MESSAGE.to_string(),
                route: decision.route,
                score: decision.score,
                sources: Vec::new(),
            },
            Reply::Answered {
                text,
                passages,
                decision,
            } => Self {
                kind: MessageKind::Answer,
                content: text,
                route: decision.route,
                score: decision.score,
                sources: passages.iter().map(SourceRef::from).collect(),
            },
        }
    }
}

/// Externally visible state of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    /// Session identifier.
    pub id: Uuid,
    /// Name the assistant uses.
    pub assistant: &'static str,
    /// Full transcript, welcome messages first.
    pub transcript: Vec<TranscriptEntry>,
}

#[derive(Debug)]
struct Session {
    transcript: Vec<TranscriptEntry>,
    turns: Vec<Turn>,
    last_active: Instant,
}

impl Session {
    fn new() -> Self {
        let transcript = WELCOME_MESSAGES
            .iter()
            .map(|text| TranscriptEntry {
                author: ASSISTANT_NAME.to_string(),
                kind: MessageKind::Welcome,
                content: text.to_string(),
            })
            .collect();
        Self {
            transcript,
            turns: Vec::new(),
            last_active: Instant::now(),
        }
    }

    fn view(&self, id: Uuid) -> SessionView {
        SessionView {
            id,
            assistant: ASSISTANT_NAME,
            transcript: self.transcript.clone(),
        }
    }
}

type SessionMap = HashMap<Uuid, Session>;

/// All live sessions. Nothing is persisted.
///
/// A session untouched for longer than the idle TTL is dropped the next time
/// any session is opened or written to, so abandoned clients do not pile up.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<SessionMap>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Empty store using [`DEFAULT_SESSION_TTL`].
    pub fn new() -> Self {
        Self::with_idle_ttl(DEFAULT_SESSION_TTL)
    }

    /// Empty store dropping sessions idle for longer than `idle_ttl`.
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// Opens a session seeded with the welcome messages.
    pub fn create(&self) -> Result<SessionView> {
        let id = Uuid::new_v4();
        let session = Session::new();
        let view = session.view(id);
        let mut sessions = self.lock()?;
        self.evict_idle(&mut sessions, session.last_active);
        sessions.insert(id, session);
        Ok(view)
    }

    /// Current transcript, or `None` for an unknown id.
    pub fn get(&self, id: Uuid) -> Result<Option<SessionView>> {
        Ok(self.lock()?.get(&id).map(|session| session.view(id)))
    }

    /// Answered turns so far, or `None` for an unknown id. Counts as
    /// activity, since a turn is about to be answered.
    pub fn history(&self, id: Uuid) -> Result<Option<Vec<Turn>>> {
        Ok(self.lock()?.get_mut(&id).map(|session| {
            session.last_active = Instant::now();
            session.turns.clone()
        }))
    }

    /// Appends a question and its reply. Returns `false` when the session
    /// disappeared while the reply was being generated.
    ///
    /// Refusals are shown in the transcript but kept out of the history the
    /// model sees.
    pub fn record(&self, id: Uuid, question: &str, reply: &ChatReply) -> Result<bool> {
        let now = Instant::now();
        let mut sessions = self.lock()?;
        self.evict_idle(&mut sessions, now);
        let Some(session) = sessions.get_mut(&id) else {
            return Ok(false);
        };
        session.last_active = now;
        session.transcript.push(TranscriptEntry {
            author: USER_AUTHOR.to_string(),
            kind: MessageKind::Question,
            content: question.to_string(),
        });
        session.transcript.push(TranscriptEntry {
            author: ASSISTANT_NAME.to_string(),
            kind: reply.kind,
            content: reply.content.clone(),
        });
        if reply.kind == MessageKind::Answer {
            session.turns.push(Turn {
                question: question.to_string(),
                answer: reply.content.clone(),
            });
        }
        Ok(true)
    }

    /// Drops a session. Returns whether it existed.
    pub fn remove(&self, id: Uuid) -> Result<bool> {
        Ok(self.lock()?.remove(&id).is_some())
    }

    /// Number of live sessions.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn evict_idle(&self, sessions: &mut SessionMap, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, session| now.saturating_duration_since(session.last_active) <= self.idle_ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, live = sessions.len(), "dropped idle sessions");
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SessionMap>> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }
}

fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{RouteDecision, RouteLabel};

    fn answer(text: &str) -> ChatReply {
        ChatReply::from(Reply::Answered {
            text: text.to_string(),
            passages: vec![ScoredPassage {
                id: "bio-0".into(),
                score: 0.8,
                text: "x".repeat(400),
                source: Some("bio".into()),
                chunk_index: Some(0),
            }],
            decision: RouteDecision {
                route: Some("paul_allen_questions".into()),
                label: RouteLabel::InDomain,
                score: 0.9,
            },
        })
    }

    fn refusal() -> ChatReply {
        ChatReply::from(Reply::Refused {
            decision: RouteDecision {
                route: None,
                label: RouteLabel::OffTopic,
                score: 0.1,
            },
        })
    }

    #[test]
    fn new_session_starts_with_welcome() {
        let store = SessionStore::new();
        let view = store.create().expect("create");
        assert_eq!(view.assistant, "Paul Allen AI Agent");
        assert_eq!(view.transcript.len(), WELCOME_MESSAGES.len());
        assert!(view
            .transcript
            .iter()
            .all(|entry| entry.kind == MessageKind::Welcome));
        assert_eq!(store.get(view.id).unwrap(), Some(view));
    }

    #[test]
    fn refusals_stay_out_of_model_history() {
        let store = SessionStore::new();
        let id = store.create().unwrap().id;
        assert!(store.record(id, "weather?", &refusal()).unwrap());
        assert!(store.record(id, "who is he?", &answer("Paul Allen.")).unwrap());

        let history = store.history(id).unwrap().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "who is he?");

        let transcript = store.get(id).unwrap().unwrap().transcript;
        let kinds: Vec<_> = transcript.iter().skip(WELCOME_MESSAGES.len()).map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MessageKind::Question,
                MessageKind::Refusal,
                MessageKind::Question,
                MessageKind::Answer
            ]
        );
        assert_eq!(transcript[WELCOME_MESSAGES.len() + 1].content, REFUSAL_MESSAGE);
    }

    #[test]
    fn unknown_and_removed_sessions() {
        let store = SessionStore::new();
        let id = store.create().unwrap().id;
        assert!(store.remove(id).unwrap());
        assert!(!store.remove(id).unwrap());
        assert_eq!(store.get(id).unwrap(), None);
        assert!(!store.record(id, "q", &answer("a")).unwrap());
        assert_eq!(store.len().unwrap(), 0);
    }

    fn age(store: &SessionStore, id: Uuid, by: Duration) {
        let mut sessions = store.lock().unwrap();
        let session = sessions.get_mut(&id).unwrap();
        session.last_active = session.last_active.checked_sub(by).expect("monotonic clock");
    }

    #[test]
    fn idle_sessions_are_dropped_on_next_open() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        let stale = store.create().unwrap().id;
        let fresh = store.create().unwrap().id;
        age(&store, stale, Duration::from_secs(120));

        let newest = store.create().unwrap().id;
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get(stale).unwrap(), None);
        assert!(store.get(fresh).unwrap().is_some());
        assert!(store.get(newest).unwrap().is_some());
    }

    #[test]
    fn activity_keeps_a_session_alive() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        let busy = store.create().unwrap().id;
        let quiet = store.create().unwrap().id;
        age(&store, busy, Duration::from_secs(45));
        age(&store, quiet, Duration::from_secs(45));
        assert!(store.record(busy, "who is he?", &answer("Paul Allen.")).unwrap());
        age(&store, busy, Duration::from_secs(30));
        age(&store, quiet, Duration::from_secs(30));

        store.create().unwrap();
        assert!(store.get(busy).unwrap().is_some());
        assert_eq!(store.get(quiet).unwrap(), None);
    }

    #[test]
    fn many_opens_do_not_accumulate_abandoned_sessions() {
        let store = SessionStore::with_idle_ttl(Duration::from_secs(60));
        for _ in 0..100 {
            let id = store.create().unwrap().id;
            age(&store, id, Duration::from_secs(61));
        }
        store.create().unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn sources_are_previewed() {
        let reply = answer("text");
        assert_eq!(reply.sources[0].preview.chars().count(), PREVIEW_CHARS + 3);
        assert!(reply.sources[0].preview.ends_with("..."));
    }
}
