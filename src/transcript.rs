//! In-memory conversation transcript
//!
//! Ordered log of turns for one session. Only the most recent turn is ever
//! mutated, and only while a response is streaming into it.

use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// Code interpreter input streamed by the backend
    ToolOutput,
}

/// One entry in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a turn, returning its index
    pub fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    /// Append text to the last turn if it has the given role.
    ///
    /// Returns the index of the updated turn, or `None` when the last turn
    /// belongs to someone else (a new turn has started since).
    pub fn append_to_last(&mut self, role: Role, text: &str) -> Option<usize> {
        let index = self.turns.len().checked_sub(1)?;
        let turn = &mut self.turns[index];
        if turn.role != role {
            return None;
        }
        turn.text.push_str(text);
        Some(index)
    }

    /// Replace every occurrence of each `from` with its `to` in the last
    /// turn with the given role.
    pub fn rewrite_last(&mut self, role: Role, replacements: &[(String, String)]) -> Option<usize> {
        let index = self.turns.len().checked_sub(1)?;
        let turn = &mut self.turns[index];
        if turn.role != role {
            return None;
        }
        for (from, to) in replacements {
            if !from.is_empty() {
                turn.text = turn.text.replace(from.as_str(), to);
            }
        }
        Some(index)
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
