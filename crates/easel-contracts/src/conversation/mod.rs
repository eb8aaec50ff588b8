pub mod store;

pub use store::ConversationStore;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message in the conversation. Parts keep their original order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    parts: Vec<String>,
}

impl Turn {
    pub fn new(role: Role, parts: Vec<String>) -> Self {
        Self { role, parts }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![text.into()])
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![text.into()])
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Appends a completed user/model exchange as a unit.
    pub fn record_exchange(&mut self, user_input: &str, model_response: &str) {
        self.turns.push(Turn::user(user_input));
        self.turns.push(Turn::model(model_response));
    }

    /// Most recent `max_depth` turns in chronological order.
    pub fn trimmed(&self, max_depth: usize) -> Conversation {
        let start = self.turns.len().saturating_sub(max_depth);
        Conversation {
            turns: self.turns[start..].to_vec(),
        }
    }
}
