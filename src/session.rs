use crate::llm::{ChatMessage, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
        };
        ChatMessage::new(role, turn.content.clone())
    }
}

/// How much prior conversation is forwarded with each generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryWindow {
    #[default]
    Unbounded,
    Last(usize),
}

impl From<Option<usize>> for HistoryWindow {
    fn from(turns: Option<usize>) -> Self {
        turns.map_or(HistoryWindow::Unbounded, HistoryWindow::Last)
    }
}

/// Append-only turn log for one chat session.
#[derive(Debug)]
pub struct ConversationSession {
    id: Uuid,
    turns: Vec<ConversationTurn>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Trailing turns forwarded as prior context.
    pub fn window(&self, window: HistoryWindow) -> &[ConversationTurn] {
        match window {
            HistoryWindow::Unbounded => &self.turns,
            HistoryWindow::Last(n) => &self.turns[self.turns.len().saturating_sub(n)..],
        }
    }
}
