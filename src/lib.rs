//! Buddy - voice conversation session manager
//!
//! This library provides the core of a hands-free voice assistant:
//! - Wake phrase detection over a shared microphone
//! - Streaming speech-to-text capture of one utterance at a time
//! - Reply generation through an OpenAI-compatible chat API
//! - Interruptible text-to-speech playback with a spoken stop phrase
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  WakeListener                        │
//! │        microphone → keyword spotter (slot 0)         │
//! └────────────────────┬────────────────────────────────┘
//!                      │ start phrase
//! ┌────────────────────▼────────────────────────────────┐
//! │               ConversationSession                    │
//! │   capture → generate → speak ∥ interrupt watcher     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                External services                     │
//! │   Deepgram STT  │  Chat completions  │  Deepgram TTS │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod listener;
pub mod llm;
pub mod playback;
pub mod signal;
pub mod speech;

pub use config::Config;
pub use error::{Error, Result};
pub use listener::WakeListener;
