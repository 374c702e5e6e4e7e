//! Audio input
//!
//! Handles the shared input device, framing and keyword spotting.

mod device;
mod frame;
mod microphone;
mod spotter;

pub use device::{AudioDevice, AudioSource, DeviceLease};
pub use frame::{AudioFrame, FRAME_LENGTH, SAMPLE_RATE, samples_to_wav};
pub use microphone::Microphone;
pub use spotter::{
    KeywordModel, KeywordSpotter, PhraseSpotter, START_SLOT, STOP_SLOT, SegmentTranscriber,
    SpeechSegmenter,
};
