//! Per-conversation state.

use dashmap::DashMap;

use crate::chart::Variant;
use crate::delivery::ConversationId;

/// What a conversation is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// No pending command.
    #[default]
    Idle,
    /// A chart command was issued; the next free text is a ticker.
    AwaitingTicker {
        /// Chart variant requested by the command.
        variant: Variant,
    },
}

/// Concurrent map of conversation states. Absent means [`ConversationState::Idle`].
#[derive(Debug, Default)]
pub struct SessionStore {
    states: DashMap<ConversationId, ConversationState>,
}

impl SessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `conversation`.
    pub fn get(&self, conversation: &ConversationId) -> ConversationState {
        self.states
            .get(conversation)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Replace the state of `conversation`.
    pub fn set(&self, conversation: &ConversationId, state: ConversationState) {
        match state {
            ConversationState::Idle => {
                self.states.remove(conversation);
            }
            other => {
                self.states.insert(conversation.clone(), other);
            }
        }
    }

    /// Reset `conversation` to idle and return what it was waiting for.
    pub fn take(&self, conversation: &ConversationId) -> ConversationState {
        self.states
            .remove(conversation)
            .map(|(_, state)| state)
            .unwrap_or_default()
    }

    /// Put back a state taken with [`Self::take`], unless a newer command
    /// already set one.
    pub fn restore(&self, conversation: &ConversationId, state: ConversationState) {
        if state != ConversationState::Idle {
            self.states.entry(conversation.clone()).or_insert(state);
        }
    }

    /// Conversations with a pending command.
    pub fn pending(&self) -> usize {
        self.states.len()
    }
}
