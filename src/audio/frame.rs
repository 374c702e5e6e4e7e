//! Fixed-length PCM frames

use crate::{Error, Result};

/// Sample rate for capture and keyword spotting (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Frame length expected by the keyword spotter (32ms at 16kHz)
pub const FRAME_LENGTH: usize = 512;

/// One fixed-length block of signed 16-bit mono samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap raw samples in a frame
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Frame samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Little-endian linear16 bytes, as streaming STT expects them
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Samples scaled to [-1.0, 1.0]
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
    }
}

/// Convert an f32 sample in [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Convert f32 samples to WAV bytes for batch STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Spotter(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(f32_to_i16(sample))
                .map_err(|e| Error::Spotter(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| Error::Spotter(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
