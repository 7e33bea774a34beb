use serde::{Deserialize, Serialize};
use std::fmt;

/// Name the assistant uses for itself in prompts and transcript lines.
pub const ASSISTANT_NAME: &str = "Geni";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => ASSISTANT_NAME,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.speaker.label(), self.text)
    }
}

/// Ordered log of the turns exchanged in one chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::User,
            text: text.into(),
        });
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn {
            speaker: Speaker::Assistant,
            text: text.into(),
        });
    }

    /// Drop the most recent turn, used when an exchange is abandoned.
    pub fn pop(&mut self) -> Option<Turn> {
        self.turns.pop()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// One speaker-tagged line per turn, oldest first.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
