use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message, serialized in the chat-completions wire shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub(crate) role: Role,
    pub(crate) content: String,
}

impl ChatMessage {
    pub(crate) fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub(crate) fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Fixed-capacity turn buffer. Pushing into a full buffer evicts the oldest turn.
#[derive(Clone, Debug)]
pub(crate) struct TurnBuffer {
    turns: VecDeque<ChatMessage>,
    capacity: usize,
}

impl TurnBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, turn: ChatMessage) {
        if self.capacity == 0 {
            return;
        }
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.turns.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.turns.iter()
    }
}

impl Default for TurnBuffer {
    fn default() -> Self {
        Self::with_capacity(crate::constants::MAX_TURNS)
    }
}
