//! Keyword spotting
//!
//! Classifies audio frames against an ordered set of keyword models. Slot 0
//! is the start phrase, slot 1 the stop phrase.
//!
//! [`PhraseSpotter`] uses a hybrid approach: local energy segmentation picks
//! out short bursts of speech, and each burst is transcribed and matched
//! against the registered phrases.

use std::sync::Arc;

use async_trait::async_trait;

use super::AudioFrame;
use super::frame::{FRAME_LENGTH, SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Slot of the phrase that starts a conversation
pub const START_SLOT: usize = 0;

/// Slot of the phrase that interrupts playback
pub const STOP_SLOT: usize = 1;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of a phrase (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Longest burst worth transcribing; keyword phrases are short
const MAX_SEGMENT_SAMPLES: usize = SAMPLE_RATE as usize * 3;

/// A registered keyword
///
/// The payload is opaque to everything but the spotter that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordModel {
    id: String,
    payload: Arc<[u8]>,
    slot: usize,
}

impl KeywordModel {
    /// Create a model from raw payload bytes
    #[must_use]
    pub fn new(id: impl Into<String>, payload: impl Into<Arc<[u8]>>, slot: usize) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            slot,
        }
    }

    /// Create a model whose payload is a spoken phrase
    #[must_use]
    pub fn phrase(id: impl Into<String>, phrase: &str, slot: usize) -> Self {
        Self::new(id, phrase.as_bytes(), slot)
    }

    /// Model identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Model payload
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Slot index reported when this keyword is heard
    #[must_use]
    pub const fn slot(&self) -> usize {
        self.slot
    }
}

/// Per-frame keyword classifier
#[async_trait(?Send)]
pub trait KeywordSpotter {
    /// Number of samples each frame must carry
    fn frame_length(&self) -> usize;

    /// Forget audio from a previous listening phase
    fn reset(&mut self) {}

    /// Classify one frame, returning the slot of a detected keyword
    ///
    /// # Errors
    ///
    /// Returns `Error::Spotter` when the frame cannot be classified; callers
    /// skip the frame and keep going
    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<usize>>;
}

/// Transcribes one short WAV segment
#[async_trait]
pub trait SegmentTranscriber: Send + Sync {
    /// Return the transcript of a WAV clip
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;
}

/// Energy-based speech segmenter
#[derive(Debug, Default)]
pub struct SpeechSegmenter {
    speech_buffer: Vec<f32>,
    silence_counter: usize,
}

impl SpeechSegmenter {
    /// Create an idle segmenter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed samples; returns a finished speech segment once speech is
    /// followed by enough silence
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        let energy = calculate_energy(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        if self.speech_buffer.is_empty() {
            if is_speech {
                self.speech_buffer.extend_from_slice(samples);
                self.silence_counter = 0;
                tracing::trace!(energy, "speech detected");
            }
            return None;
        }

        self.speech_buffer.extend_from_slice(samples);
        if is_speech {
            self.silence_counter = 0;
        } else {
            self.silence_counter += samples.len();
        }

        let finished = self.silence_counter > SILENCE_SAMPLES
            || self.speech_buffer.len() > MAX_SEGMENT_SAMPLES;
        if !finished {
            return None;
        }

        let segment = std::mem::take(&mut self.speech_buffer);
        let trailing_silence = std::mem::take(&mut self.silence_counter);

        if segment.len().saturating_sub(trailing_silence) > MIN_SPEECH_SAMPLES {
            tracing::debug!(samples = segment.len(), "speech segment complete");
            Some(segment)
        } else {
            tracing::trace!("segment too short - dropping");
            None
        }
    }

    /// Whether a segment is being accumulated
    #[must_use]
    pub fn is_listening(&self) -> bool {
        !self.speech_buffer.is_empty()
    }

    /// Drop any partial segment
    pub fn reset(&mut self) {
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }
}

/// Spots keyword phrases by transcribing short speech segments
pub struct PhraseSpotter {
    phrases: Vec<(usize, String)>,
    transcriber: Arc<dyn SegmentTranscriber>,
    segmenter: SpeechSegmenter,
}

impl PhraseSpotter {
    /// Create a spotter over phrase models
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a model payload is not a non-empty UTF-8 phrase
    pub fn new(models: &[KeywordModel], transcriber: Arc<dyn SegmentTranscriber>) -> Result<Self> {
        let mut phrases = models
            .iter()
            .map(|model| {
                let phrase = std::str::from_utf8(model.payload())
                    .map(normalize)
                    .map_err(|e| Error::Config(format!("keyword {}: {e}", model.id())))?;
                if phrase.is_empty() {
                    return Err(Error::Config(format!("keyword {} has no phrase", model.id())));
                }
                Ok((model.slot(), phrase))
            })
            .collect::<Result<Vec<_>>>()?;
        phrases.sort_by_key(|(slot, _)| *slot);

        tracing::debug!(phrases = ?phrases, "phrase spotter initialized");

        Ok(Self {
            phrases,
            transcriber,
            segmenter: SpeechSegmenter::new(),
        })
    }

    /// Slot of the first registered phrase found in a transcript
    #[must_use]
    pub fn match_transcript(&self, transcript: &str) -> Option<usize> {
        let normalized = normalize(transcript);
        self.phrases
            .iter()
            .find(|(_, phrase)| normalized.contains(phrase.as_str()))
            .map(|(slot, _)| *slot)
    }
}

#[async_trait(?Send)]
impl KeywordSpotter for PhraseSpotter {
    fn frame_length(&self) -> usize {
        FRAME_LENGTH
    }

    fn reset(&mut self) {
        self.segmenter.reset();
    }

    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<usize>> {
        if frame.len() != FRAME_LENGTH {
            return Err(Error::Spotter(format!(
                "expected {FRAME_LENGTH} samples, got {}",
                frame.len()
            )));
        }

        let Some(segment) = self.segmenter.push(&frame.to_f32()) else {
            return Ok(None);
        };

        let wav = samples_to_wav(&segment, SAMPLE_RATE)?;
        let transcript = self
            .transcriber
            .transcribe(&wav)
            .await
            .map_err(|e| Error::Spotter(e.to_string()))?;

        let slot = self.match_transcript(&transcript);
        tracing::debug!(transcript, ?slot, "segment classified");
        Ok(slot)
    }
}

/// Lowercase, strip punctuation and collapse whitespace
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
