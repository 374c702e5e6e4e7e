//! Transcript fragments and utterance assembly

use std::fmt;

/// One piece of transcript text from the streaming STT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    /// Transcribed text, possibly empty
    pub text: String,
    /// Whether the provider considers the utterance finished
    pub is_final: bool,
}

impl TranscriptFragment {
    /// Non-final fragment
    #[must_use]
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    /// Fragment carrying the finality marker
    #[must_use]
    pub fn last(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Collects fragments of one utterance in arrival order
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    parts: Vec<String>,
}

impl TranscriptAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment's text
    pub fn add_part(&mut self, part: impl Into<String>) {
        self.parts.push(part.into());
    }

    /// Space-joined text of every part so far
    #[must_use]
    pub fn full_transcript(&self) -> String {
        self.parts.join(" ")
    }

    /// Forget all parts
    pub fn reset(&mut self) {
        self.parts.clear();
    }

    /// Whether no part has been added since the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// A finished, trimmed, non-empty utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance(String);

impl Utterance {
    /// Finalize assembled text; `None` when it is blank
    #[must_use]
    pub fn finalize(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Utterance text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the text
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    /// Case-insensitive substring test against an already lowercased phrase
    #[must_use]
    pub fn contains_phrase(&self, lowered_phrase: &str) -> bool {
        self.0.to_lowercase().contains(lowered_phrase)
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
