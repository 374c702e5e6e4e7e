//! Speech services
//!
//! Streaming STT for utterances, batch STT for keyword segments, and
//! streaming TTS for replies.

mod stt;
mod tts;

pub use stt::{DeepgramBatch, DeepgramLive, LiveOptions, Transcriber, TranscriptionConnection};
pub use tts::{AudioChunks, DeepgramSpeech, Synthesizer};
