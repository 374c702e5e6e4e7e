//! Conversation history owned by a session

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The person speaking to the assistant
    Human,
    /// The generated reply
    Assistant,
}

/// One entry in the history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    /// Speaker
    pub role: Role,
    /// Turn text
    pub text: String,
}

impl ConversationTurn {
    /// A human turn
    #[must_use]
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
        }
    }

    /// An assistant turn
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Ordered, append-only list of turns
#[derive(Debug, Default)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// All turns, oldest first
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// Every turn except the newest one
    #[must_use]
    pub fn before_last(&self) -> &[ConversationTurn] {
        self.turns.split_last().map_or(&[], |(_, rest)| rest)
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
