use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::turns::{ChatMessage, Role, TurnBuffer};
use super::StoredMemory;
use crate::constants::{MEMORY_LABEL, SUMMARIZE_EVERY};

/// A conversation's scope: one user inside one chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Identity {
    pub(crate) chat_id: i64,
    pub(crate) user_id: i64,
}

impl Identity {
    pub(crate) fn new(chat_id: i64, user_id: i64) -> Self {
        Self { chat_id, user_id }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.user_id)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ConversationState {
    pub(crate) summary: String,
    pub(crate) turns: TurnBuffer,
    /// Turns recorded since the last summarization. Keeps counting after the buffer wraps.
    pub(crate) turn_count: u32,
    pub(crate) memory_enabled: bool,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            summary: String::new(),
            turns: TurnBuffer::default(),
            turn_count: 0,
            memory_enabled: true,
        }
    }
}

/// In-process cache of conversation state.
///
/// The durable store owns summary and the memory flag; callers must `refresh`
/// an identity from a fresh load before building a request for it. The turn
/// buffer and counter only live here.
pub(crate) struct MemoryStore {
    states: DashMap<Identity, ConversationState>,
    locks: DashMap<Identity, Arc<Mutex<()>>>,
    system_prompt: String,
}

impl MemoryStore {
    pub(crate) fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            states: DashMap::new(),
            locks: DashMap::new(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Get the cached state for an identity, inserting the default state if missing.
    pub(crate) fn get_or_create(
        &self,
        identity: Identity,
    ) -> RefMut<'_, Identity, ConversationState> {
        self.states.entry(identity).or_insert_with(|| {
            debug!(identity = %identity, "Conversation state created");
            ConversationState::default()
        })
    }

    /// Apply a freshly loaded durable record. Turns and counter are kept unless
    /// the record says memory is off.
    pub(crate) fn refresh(&self, identity: Identity, stored: &StoredMemory) {
        let mut st = self.get_or_create(identity);
        st.summary = stored.summary.clone();
        st.memory_enabled = stored.memory_enabled;
        if !stored.memory_enabled {
            st.turns.clear();
        }
    }

    pub(crate) fn build_request(&self, identity: Identity, new_text: &str) -> Vec<ChatMessage> {
        let mut msgs = vec![ChatMessage::system(self.system_prompt.clone())];
        if let Some(st) = self.states.get(&identity) {
            if st.memory_enabled && !st.summary.is_empty() {
                msgs.push(ChatMessage::system(format!("{MEMORY_LABEL}\n{}", st.summary)));
            }
            if st.memory_enabled {
                msgs.extend(st.turns.iter().cloned());
            }
        }
        msgs.push(ChatMessage::user(new_text));
        msgs
    }

    /// Call once per role per exchange: the due check relies on single steps.
    pub(crate) fn record_turn(&self, identity: Identity, role: Role, content: &str) {
        let mut st = self.get_or_create(identity);
        if !st.memory_enabled {
            return;
        }
        st.turns.push(ChatMessage::new(role, content));
        st.turn_count += 1;
    }

    pub(crate) fn is_summarization_due(&self, identity: Identity) -> bool {
        self.states
            .get(&identity)
            .map(|st| {
                st.memory_enabled && st.turn_count > 0 && st.turn_count % SUMMARIZE_EVERY == 0
            })
            .unwrap_or(false)
    }

    pub(crate) fn reset(&self, identity: Identity) {
        *self.get_or_create(identity) = ConversationState::default();
    }

    pub(crate) fn set_memory_enabled(&self, identity: Identity, enabled: bool) {
        let mut st = self.get_or_create(identity);
        st.memory_enabled = enabled;
        if !enabled {
            st.turns.clear();
        }
    }

    /// Fold the buffered turns into a new summary.
    pub(crate) fn apply_summary(&self, identity: Identity, summary: String) {
        let mut st = self.get_or_create(identity);
        st.summary = summary;
        st.turns.clear();
        st.turn_count = 0;
    }

    pub(crate) fn snapshot(&self, identity: Identity) -> ConversationState {
        self.states
            .get(&identity)
            .map(|st| st.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn evict(&self, identity: Identity) {
        self.states.remove(&identity);
        self.prune_lock(identity);
    }

    /// Serializes handlers for the same identity within this process.
    pub(crate) fn lock_for(&self, identity: Identity) -> Arc<Mutex<()>> {
        self.locks
            .entry(identity)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the identity's lock entry once no handler holds or waits on it.
    pub(crate) fn prune_lock(&self, identity: Identity) {
        self.locks
            .remove_if(&identity, |_, lock| Arc::strong_count(lock) == 1);
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_SYSTEM_PROMPT, MAX_TURNS};

    const ID: Identity = Identity {
        chat_id: -100,
        user_id: 42,
    };

    fn store() -> MemoryStore {
        MemoryStore::new(DEFAULT_SYSTEM_PROMPT)
    }

    fn exchange(store: &MemoryStore, i: usize) {
        store.record_turn(ID, Role::User, &format!("question {i}"));
        store.record_turn(ID, Role::Assistant, &format!("answer {i}"));
    }

    #[test]
    fn test_get_or_create_defaults() {
        let store = store();
        let st = store.get_or_create(ID).value().clone();
        assert!(st.summary.is_empty());
        assert!(st.turns.is_empty());
        assert_eq!(st.turn_count, 0);
        assert!(st.memory_enabled);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_build_request_fresh_identity() {
        let store = store();
        let msgs = store.build_request(ID, "hello");
        assert_eq!(
            msgs,
            vec![
                ChatMessage::system(DEFAULT_SYSTEM_PROMPT),
                ChatMessage::user("hello"),
            ]
        );
    }

    #[test]
    fn test_build_request_includes_summary_and_turns_in_order() {
        let store = store();
        store.apply_summary(ID, "- likes Rust".to_string());
        exchange(&store, 1);
        let msgs = store.build_request(ID, "next");
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(msgs[1].role, Role::System);
        assert_eq!(msgs[1].content, format!("{MEMORY_LABEL}\n- likes Rust"));
        assert_eq!(msgs[2], ChatMessage::user("question 1"));
        assert_eq!(msgs[3], ChatMessage::new(Role::Assistant, "answer 1"));
        assert_eq!(msgs[4], ChatMessage::user("next"));
    }

    #[test]
    fn test_build_request_has_no_side_effects() {
        let store = store();
        exchange(&store, 1);
        let _ = store.build_request(ID, "q");
        let st = store.snapshot(ID);
        assert_eq!(st.turn_count, 2);
        assert_eq!(st.turns.len(), 2);
    }

    #[test]
    fn test_build_request_hides_memory_when_disabled() {
        let store = store();
        store.apply_summary(ID, "secret summary".to_string());
        store.set_memory_enabled(ID, false);
        let msgs = store.build_request(ID, "hi");
        assert_eq!(msgs.len(), 2);
        assert!(msgs.iter().all(|m| !m.content.contains("secret summary")));
        assert_eq!(store.snapshot(ID).summary, "secret summary");
    }

    #[test]
    fn test_record_turn_bounded_buffer() {
        let store = store();
        for i in 0..50 {
            store.record_turn(ID, Role::User, &i.to_string());
            assert!(store.snapshot(ID).turns.len() <= MAX_TURNS);
        }
        let st = store.snapshot(ID);
        assert_eq!(st.turns.len(), MAX_TURNS);
        assert_eq!(st.turn_count, 50);
        assert_eq!(st.turns.iter().next().unwrap().content, "40");
    }

    #[test]
    fn test_summarization_due_on_exact_multiples() {
        let store = store();
        for n in 1..=36u32 {
            store.record_turn(ID, Role::User, "t");
            assert_eq!(store.is_summarization_due(ID), n % SUMMARIZE_EVERY == 0, "n = {n}");
        }
    }

    #[test]
    fn test_summarization_not_due_for_unknown_identity() {
        assert!(!store().is_summarization_due(ID));
    }

    #[test]
    fn test_summarization_not_due_when_disabled() {
        let store = store();
        for _ in 0..SUMMARIZE_EVERY {
            store.record_turn(ID, Role::User, "t");
        }
        assert!(store.is_summarization_due(ID));
        store.set_memory_enabled(ID, false);
        assert!(!store.is_summarization_due(ID));
    }

    #[test]
    fn test_disable_then_record_is_noop() {
        let store = store();
        exchange(&store, 1);
        store.set_memory_enabled(ID, false);
        let before = store.snapshot(ID);
        assert!(before.turns.is_empty());
        store.record_turn(ID, Role::User, "ignored");
        let after = store.snapshot(ID);
        assert!(after.turns.is_empty());
        assert_eq!(after.turn_count, before.turn_count);
    }

    #[test]
    fn test_reenable_keeps_summary_and_starts_empty() {
        let store = store();
        store.apply_summary(ID, "old facts".to_string());
        store.set_memory_enabled(ID, false);
        for i in 0..3 {
            exchange(&store, i);
        }
        store.set_memory_enabled(ID, true);
        let st = store.snapshot(ID);
        assert!(st.turns.is_empty());
        assert_eq!(st.summary, "old facts");
        assert!(st.memory_enabled);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let store = store();
        store.apply_summary(ID, "stuff".to_string());
        exchange(&store, 1);
        store.set_memory_enabled(ID, false);
        store.reset(ID);
        let st = store.snapshot(ID);
        assert!(st.summary.is_empty());
        assert!(st.turns.is_empty());
        assert_eq!(st.turn_count, 0);
        assert!(st.memory_enabled);
    }

    #[test]
    fn test_apply_summary_clears_turns_and_count() {
        let store = store();
        exchange(&store, 1);
        store.apply_summary(ID, "- fact".to_string());
        let st = store.snapshot(ID);
        assert_eq!(st.summary, "- fact");
        assert!(st.turns.is_empty());
        assert_eq!(st.turn_count, 0);
    }

    #[test]
    fn test_refresh_applies_durable_record_and_keeps_turns() {
        let store = store();
        exchange(&store, 1);
        store.refresh(
            ID,
            &StoredMemory {
                summary: "from disk".to_string(),
                memory_enabled: true,
                updated_at: None,
            },
        );
        let st = store.snapshot(ID);
        assert_eq!(st.summary, "from disk");
        assert_eq!(st.turns.len(), 2);
        assert_eq!(st.turn_count, 2);
    }

    #[test]
    fn test_refresh_disabled_record_clears_turns() {
        let store = store();
        exchange(&store, 1);
        store.refresh(
            ID,
            &StoredMemory {
                summary: String::new(),
                memory_enabled: false,
                updated_at: None,
            },
        );
        let st = store.snapshot(ID);
        assert!(!st.memory_enabled);
        assert!(st.turns.is_empty());
    }

    #[test]
    fn test_identities_are_isolated() {
        let store = store();
        let other = Identity::new(ID.chat_id, 7);
        exchange(&store, 1);
        assert!(store.snapshot(other).turns.is_empty());
        store.set_memory_enabled(other, false);
        assert!(store.snapshot(ID).memory_enabled);
    }

    #[test]
    fn test_evict_drops_cache_entry() {
        let store = store();
        exchange(&store, 1);
        store.evict(ID);
        assert_eq!(store.len(), 0);
        assert_eq!(store.snapshot(ID).turn_count, 0);
    }

    #[tokio::test]
    async fn test_lock_for_same_identity_is_shared() {
        let store = store();
        let a = store.lock_for(ID);
        let b = store.lock_for(ID);
        assert!(Arc::ptr_eq(&a, &b));
        let _held = a.lock().await;
        assert!(b.try_lock().is_err());
        let c = store.lock_for(Identity::new(1, 1));
        assert!(c.try_lock().is_ok());
    }

    #[test]
    fn test_prune_lock_drops_unused_entry() {
        let store = store();
        drop(store.lock_for(ID));
        assert_eq!(store.locks.len(), 1);
        store.prune_lock(ID);
        assert!(store.locks.is_empty());
    }

    #[test]
    fn test_prune_lock_keeps_entry_in_use() {
        let store = store();
        let held = store.lock_for(ID);
        store.prune_lock(ID);
        assert!(Arc::ptr_eq(&held, &store.lock_for(ID)));
    }

    #[test]
    fn test_evict_prunes_idle_lock() {
        let store = store();
        exchange(&store, 1);
        drop(store.lock_for(ID));
        store.evict(ID);
        assert!(store.locks.is_empty());
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new(-5, 9).to_string(), "-5:9");
    }
}
