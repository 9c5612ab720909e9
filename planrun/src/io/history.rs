//! Bounded conversation history passed to the plan generator.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Number of turns kept; older turns are dropped first.
pub const MAX_TURNS: usize = 50;

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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Ordered turns, oldest first. Model turns may hold raw plans or summaries.
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: VecDeque<Turn>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push_back(Turn {
            role,
            text: text.into(),
        });
        while self.turns.len() > MAX_TURNS {
            self.turns.pop_front();
        }
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
