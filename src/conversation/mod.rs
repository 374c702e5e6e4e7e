//! Conversation flow: capture, history, barge-in and the session itself

mod capture;
mod history;
mod interrupt;
mod session;
mod transcript;

pub use capture::UtteranceCapture;
pub use history::{ConversationHistory, ConversationTurn, Role};
pub use interrupt::{InterruptWatcher, WatchOutcome};
pub use session::{ConversationSession, Services, SessionEnd, SessionState};
pub use transcript::{TranscriptAssembler, TranscriptFragment, Utterance};
