//! Per-call conversation state and its keyed store.
//!
//! One live call maps to one [`ConversationContext`]. The store hands out
//! `Arc<Mutex<_>>` handles so a conversation is owned by at most one in-flight
//! turn, while turns for distinct conversations proceed fully concurrently.
//! Lifecycle: created on first turn, removed when the conversation ends, and
//! swept by [`ContextStore::evict_idle`] for abandoned calls so the map stays
//! bounded in long-running processes.

use crate::intent::{Intent, Sentiment};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Mutable state of one ongoing conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub started_at: DateTime<Utc>,
    /// Node id the next turn resolves against.
    pub current_node: String,
    pub turns: u32,
    /// Variables collected so far, merged from extracted entities.
    pub collected: HashMap<String, serde_json::Value>,
    pub sentiment_history: Vec<Sentiment>,
    pub intents_detected: Vec<Intent>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>, entry_node: impl Into<String>) -> Self {
        let now = Utc::now();
        ConversationContext {
            conversation_id: conversation_id.into(),
            started_at: now,
            current_node: entry_node.into(),
            turns: 0,
            collected: HashMap::new(),
            sentiment_history: Vec::new(),
            intents_detected: Vec::new(),
            last_activity: now,
        }
    }

    /// Record activity for idle eviction.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Append a turn's classification to the histories.
    pub fn record_intent(&mut self, intent: &Intent) {
        self.sentiment_history.push(intent.sentiment);
        self.intents_detected.push(intent.clone());
    }

    /// Last `n` sentiments, oldest first.
    pub fn recent_sentiments(&self, n: usize) -> &[Sentiment] {
        let start = self.sentiment_history.len().saturating_sub(n);
        &self.sentiment_history[start..]
    }
}

/// Concurrent store of active conversations, keyed by conversation id.
#[derive(Default)]
pub struct ContextStore {
    inner: DashMap<String, Arc<Mutex<ConversationContext>>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the context for this conversation, creating it at `entry_node`
    /// on the first turn.
    pub fn get_or_create(
        &self,
        conversation_id: &str,
        entry_node: &str,
    ) -> Arc<Mutex<ConversationContext>> {
        self.inner
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                debug!("🆕 conversation context created: {}", conversation_id);
                Arc::new(Mutex::new(ConversationContext::new(
                    conversation_id,
                    entry_node,
                )))
            })
            .clone()
    }

    /// Drop a conversation (end of call or structural failure).
    pub fn remove(&self, conversation_id: &str) -> Option<Arc<Mutex<ConversationContext>>> {
        self.inner.remove(conversation_id).map(|(_, ctx)| ctx)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.inner.contains_key(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove contexts idle longer than `max_idle`. Contexts with a turn in
    /// flight (mutex held) are never evicted. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let max_idle = chrono::Duration::from_std(max_idle)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let cutoff = Utc::now() - max_idle;
        let before = self.inner.len();
        self.inner.retain(|_, ctx| match ctx.try_lock() {
            Ok(guard) => guard.last_activity > cutoff,
            Err(_) => true,
        });
        before - self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_once_per_id() {
        let store = ContextStore::new();
        let a = store.get_or_create("call-1", "greeting");
        let b = store.get_or_create("call-1", "greeting");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_ends_lifecycle() {
        let store = ContextStore::new();
        store.get_or_create("call-1", "greeting");
        assert!(store.contains("call-1"));
        store.remove("call-1");
        assert!(!store.contains("call-1"));
        assert!(store.is_empty());
    }

    #[test]
    fn evicts_only_idle_contexts() {
        let store = ContextStore::new();
        let stale = store.get_or_create("stale", "greeting");
        store.get_or_create("fresh", "greeting");

        tokio_test::block_on(async {
            let mut guard = stale.lock().await;
            guard.last_activity = Utc::now() - chrono::Duration::seconds(3600);
        });

        let evicted = store.evict_idle(Duration::from_secs(900));
        assert_eq!(evicted, 1);
        assert!(!store.contains("stale"));
        assert!(store.contains("fresh"));
    }

    #[test]
    fn in_flight_conversations_survive_eviction() {
        let store = ContextStore::new();
        let busy = store.get_or_create("busy", "greeting");
        tokio_test::block_on(async {
            let mut guard = busy.lock().await;
            guard.last_activity = Utc::now() - chrono::Duration::seconds(3600);
        });

        // Hold the lock to simulate an in-flight turn.
        let guard = busy.try_lock().unwrap();
        assert_eq!(store.evict_idle(Duration::from_secs(900)), 0);
        drop(guard);
        assert_eq!(store.evict_idle(Duration::from_secs(900)), 1);
    }

    #[test]
    fn recent_sentiments_window() {
        let mut ctx = ConversationContext::new("c", "greeting");
        for s in [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative, Sentiment::Negative] {
            ctx.sentiment_history.push(s);
        }
        assert_eq!(
            ctx.recent_sentiments(3),
            &[Sentiment::Neutral, Sentiment::Negative, Sentiment::Negative]
        );
        assert_eq!(ctx.recent_sentiments(10).len(), 4);
    }
}
