//! Per-session conversation memory used to disambiguate follow-up questions.
//!
//! Each session remembers the last inferred topic, the last question, and the question history.
//! Short or pronoun-bearing questions get the remembered topic appended before retrieval, so
//! "what about it?" after a budget question searches for budget content.
//!
//! Sessions are created on first access. Each one sits behind its own async mutex so that a
//! whole contextualize/search/update cycle for one session is serialized while different
//! sessions proceed independently. Without an eviction policy sessions live for the rest of the
//! process; [`EvictionPolicy`] bounds that by idle time and entry count.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Tokens that mark a question as referring back to earlier context.
pub const PRONOUNS: [&str; 8] = ["it", "that", "they", "this", "those", "them", "there", "here"];

/// Topic keywords in priority order.
pub const TOPIC_KEYWORDS: [&str; 10] = [
    "budget",
    "debt",
    "infrastructure",
    "tax",
    "revenue",
    "expenditure",
    "loan",
    "deficit",
    "grant",
    "policy",
];

const SHORT_QUESTION_TOKENS: usize = 5;
const FALLBACK_TOPIC_WORDS: usize = 3;
const FALLBACK_MIN_WORD_CHARS: usize = 4;

/// Conversation state of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    last_topic: String,
    last_user_question: String,
    history: Vec<String>,
}

impl SessionState {
    /// Most recent non-empty topic.
    pub fn last_topic(&self) -> &str {
        &self.last_topic
    }

    /// Most recent question.
    pub fn last_user_question(&self) -> &str {
        &self.last_user_question
    }

    /// Every question asked in this session, oldest first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn contextualize(&self, question: &str) -> String {
        let question = question.trim();
        if self.last_topic.is_empty() || !is_ambiguous(question) {
            return question.to_string();
        }
        format!("{question} (context: {})", self.last_topic)
    }

    fn update(&mut self, question: &str, topic: &str) {
        self.history.push(question.to_string());
        self.last_user_question = question.to_string();
        if !topic.is_empty() {
            self.last_topic = topic.to_string();
        }
    }
}

fn is_ambiguous(question: &str) -> bool {
    let lowered = question.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    tokens.len() <= SHORT_QUESTION_TOKENS || tokens.iter().any(|token| PRONOUNS.contains(token))
}

/// Guess the topic of a question.
///
/// Returns the keyword from [`TOPIC_KEYWORDS`] that occurs earliest in the question (matching is
/// case-insensitive and by substring); keywords starting at the same offset are ranked by list
/// order. Without a keyword, the first three words longer than three characters are joined by
/// spaces, which may produce an empty string.
pub fn infer_topic(question: &str) -> String {
    let lowered = question.to_lowercase();
    let keyword = TOPIC_KEYWORDS
        .iter()
        .enumerate()
        .filter_map(|(rank, keyword)| lowered.find(keyword).map(|offset| (offset, rank, *keyword)))
        .min()
        .map(|(_, _, keyword)| keyword.to_string());

    keyword.unwrap_or_else(|| {
        lowered
            .split_whitespace()
            .filter(|word| word.chars().count() >= FALLBACK_MIN_WORD_CHARS)
            .take(FALLBACK_TOPIC_WORDS)
            .collect::<Vec<_>>()
            .join(" ")
    })
}

/// Limits on how many sessions are retained and for how long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Drop sessions not accessed for this long.
    pub idle_ttl: Option<Duration>,
    /// Keep at most this many sessions, dropping the least recently used first.
    pub max_entries: Option<usize>,
}

struct SessionEntry {
    state: Arc<AsyncMutex<SessionState>>,
    last_seen: Instant,
}

/// Exclusive access to one session for the duration of a query.
pub struct SessionGuard {
    state: OwnedMutexGuard<SessionState>,
}

impl SessionGuard {
    /// Rewrite `question` with the remembered topic when it looks like a follow-up.
    ///
    /// Never mutates the session.
    pub fn contextualize(&self, question: &str) -> String {
        self.state.contextualize(question)
    }

    /// Record an answered question and, when non-empty, its topic.
    pub fn update(&mut self, question: &str, topic: &str) {
        self.state.update(question, topic);
    }
}

/// Keyed collection of session states.
#[derive(Default)]
pub struct ConversationMemory {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    policy: EvictionPolicy,
}

impl ConversationMemory {
    /// Memory without eviction; sessions live for the rest of the process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory that evicts according to `policy`.
    pub fn with_policy(policy: EvictionPolicy) -> Self {
        Self {
            sessions: Mutex::default(),
            policy,
        }
    }

    /// Lock `session_id`, creating an empty session on first access.
    pub async fn session(&self, session_id: &str) -> SessionGuard {
        let state = self.slot(session_id, Instant::now());
        SessionGuard {
            state: state.lock_owned().await,
        }
    }

    /// Rewrite `question` using the session's remembered topic.
    pub async fn contextualize(&self, session_id: &str, question: &str) -> String {
        self.session(session_id).await.contextualize(question)
    }

    /// Record an answered question for the session.
    pub async fn update(&self, session_id: &str, question: &str, topic: &str) {
        self.session(session_id).await.update(question, topic);
    }

    /// Copy of the session's state, if the session exists.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionState> {
        let state = {
            let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            sessions
                .get(session_id)
                .map(|entry| Arc::clone(&entry.state))
        }?;
        let guard = state.lock().await;
        Some(guard.clone())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no sessions exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply the eviction policy now, returning how many sessions were dropped.
    pub fn evict_idle(&self) -> usize {
        self.evict_at(Instant::now())
    }

    fn evict_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        evict(&mut sessions, &self.policy, now, None)
    }

    fn slot(&self, session_id: &str, now: Instant) -> Arc<AsyncMutex<SessionState>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let evicted = evict(&mut sessions, &self.policy, now, Some(session_id));
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "Evicted sessions");
        }

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "Created session");
                SessionEntry {
                    state: Arc::default(),
                    last_seen: now,
                }
            });
        entry.last_seen = now;
        let state = Arc::clone(&entry.state);

        if let Some(max) = self.policy.max_entries {
            let excess = sessions.len().saturating_sub(max);
            if excess > 0 {
                evict_oldest(&mut sessions, excess, Some(session_id));
            }
        }
        state
    }
}

/// Remove sessions that exceed the idle TTL. Sessions currently locked by a query and the
/// `keep` session are never removed.
fn evict(
    sessions: &mut HashMap<String, SessionEntry>,
    policy: &EvictionPolicy,
    now: Instant,
    keep: Option<&str>,
) -> usize {
    let before = sessions.len();
    if let Some(ttl) = policy.idle_ttl {
        sessions.retain(|id, entry| {
            Some(id.as_str()) == keep
                || in_use(entry)
                || now.saturating_duration_since(entry.last_seen) <= ttl
        });
    }
    if let Some(max) = policy.max_entries {
        let excess = sessions.len().saturating_sub(max);
        if excess > 0 {
            evict_oldest(sessions, excess, keep);
        }
    }
    before - sessions.len()
}

fn evict_oldest(sessions: &mut HashMap<String, SessionEntry>, count: usize, keep: Option<&str>) {
    let mut candidates: Vec<(Instant, String)> = sessions
        .iter()
        .filter(|(id, entry)| Some(id.as_str()) != keep && !in_use(entry))
        .map(|(id, entry)| (entry.last_seen, id.clone()))
        .collect();
    candidates.sort();
    for (_, id) in candidates.into_iter().take(count) {
        sessions.remove(&id);
    }
}

fn in_use(entry: &SessionEntry) -> bool {
    Arc::strong_count(&entry.state) > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pronoun_follow_up_gets_topic_context() {
        let memory = ConversationMemory::new();
        memory.update("s1", "How large is the budget?", "budget").await;

        let rewritten = memory.contextualize("s1", "what about it?").await;
        assert!(rewritten.ends_with("(context: budget)"));
        assert_eq!(rewritten, "what about it? (context: budget)");
    }

    #[tokio::test]
    async fn long_question_without_pronoun_is_unchanged() {
        let memory = ConversationMemory::new();
        memory.update("s1", "How large is the budget?", "budget").await;

        let question = "How much revenue did customs duties raise last year";
        assert_eq!(memory.contextualize("s1", question).await, question);
    }

    #[tokio::test]
    async fn long_question_with_pronoun_gets_context() {
        let memory = ConversationMemory::new();
        memory.update("s1", "debt levels", "debt").await;

        let rewritten = memory
            .contextualize("s1", "Why did the government expand those programs so quickly")
            .await;
        assert!(rewritten.ends_with("(context: debt)"));
    }

    #[tokio::test]
    async fn no_topic_means_no_rewrite() {
        let memory = ConversationMemory::new();
        assert_eq!(memory.contextualize("fresh", "and it?").await, "and it?");
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn update_records_history_and_keeps_topic_on_empty() {
        let memory = ConversationMemory::new();
        memory.update("s1", "Tell me about tax", "tax").await;
        memory.update("s1", "ok", "").await;

        let state = memory.snapshot("s1").await.expect("session");
        assert_eq!(state.history(), ["Tell me about tax", "ok"]);
        assert_eq!(state.last_user_question(), "ok");
        assert_eq!(state.last_topic(), "tax");
    }

    #[tokio::test]
    async fn sessions_do_not_share_state() {
        let memory = ConversationMemory::new();
        memory.update("a", "budget?", "budget").await;
        assert_eq!(memory.contextualize("b", "and it?").await, "and it?");
        assert!(memory.snapshot("missing").await.is_none());
    }

    #[tokio::test]
    async fn concurrent_updates_on_one_session_are_serialized() {
        let memory = Arc::new(ConversationMemory::new());
        let tasks: Vec<_> = (0..32)
            .map(|n| {
                let memory = Arc::clone(&memory);
                tokio::spawn(async move {
                    let mut session = memory.session("shared").await;
                    let _ = session.contextualize("q");
                    tokio::task::yield_now().await;
                    session.update(&format!("question {n}"), "loan");
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }

        let state = memory.snapshot("shared").await.expect("session");
        assert_eq!(state.history().len(), 32);
    }

    #[test]
    fn infer_topic_prefers_earliest_keyword() {
        assert_eq!(infer_topic("What is the tax and budget policy?"), "tax");
        assert_eq!(infer_topic("DEFICIT projections"), "deficit");
    }

    #[test]
    fn infer_topic_falls_back_to_long_words() {
        assert_eq!(
            infer_topic("Who signed the health reform agreement"),
            "signed health reform"
        );
        assert_eq!(infer_topic("why so?"), "");
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let memory = ConversationMemory::with_policy(EvictionPolicy {
            idle_ttl: Some(Duration::from_secs(60)),
            max_entries: None,
        });
        let start = Instant::now();
        memory.slot("old", start);
        memory.slot("recent", start + Duration::from_secs(50));

        let evicted = memory.evict_at(start + Duration::from_secs(90));
        assert_eq!(evicted, 1);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn entry_cap_drops_least_recently_used() {
        let memory = ConversationMemory::with_policy(EvictionPolicy {
            idle_ttl: None,
            max_entries: Some(2),
        });
        let start = Instant::now();
        memory.slot("a", start);
        memory.slot("b", start + Duration::from_secs(1));
        memory.slot("a", start + Duration::from_secs(2));
        memory.slot("c", start + Duration::from_secs(3));

        let sessions = memory.sessions.lock().expect("lock");
        assert!(sessions.contains_key("a"));
        assert!(sessions.contains_key("c"));
        assert!(!sessions.contains_key("b"));
    }
}
