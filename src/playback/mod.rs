//! Audio playback to speakers

mod player;
mod sink;

pub use player::{PlaybackOutcome, ResponsePlayer};
pub use sink::{AudioSink, ProcessLauncher, SinkLauncher};
