//! Interruptible playback of synthesized replies

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::StreamExt;

use super::sink::{AudioSink, SinkLauncher};
use crate::signal::StopSignal;
use crate::speech::Synthesizer;
use crate::Result;

/// How a playback ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Every synthesized chunk reached the sink
    Completed,
    /// The stop signal cut playback short
    Stopped,
    /// The sink closed its input before the stream ended
    SinkClosed,
}

/// Signals of the playback in progress
#[derive(Clone)]
struct ActivePlayback {
    stop: StopSignal,
    kill: StopSignal,
}

/// Streams synthesized audio into a sink, one playback at a time
pub struct ResponsePlayer {
    synthesizer: Arc<dyn Synthesizer>,
    launcher: Arc<dyn SinkLauncher>,
    active: Mutex<Option<ActivePlayback>>,
}

impl ResponsePlayer {
    /// Create a player
    #[must_use]
    pub fn new(synthesizer: Arc<dyn Synthesizer>, launcher: Arc<dyn SinkLauncher>) -> Self {
        Self {
            synthesizer,
            launcher,
            active: Mutex::new(None),
        }
    }

    /// Speak `text`, checking `stop` before every chunk
    ///
    /// The sink is torn down on every path: its input is closed and the
    /// process is waited on before this returns. Once `stop` is set no
    /// further chunk is written and the sink is killed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the sink is unavailable or fails, and
    /// `Error::Stream` if synthesis fails
    pub async fn play(&self, text: &str, stop: &StopSignal) -> Result<PlaybackOutcome> {
        if stop.is_set() {
            return Ok(PlaybackOutcome::Stopped);
        }

        let mut sink = self.launcher.launch()?;
        let kill = sink.kill_handle();
        self.set_active(Some(ActivePlayback {
            stop: stop.clone(),
            kill: kill.clone(),
        }));

        let streamed = self.stream_into(sink.as_mut(), text, stop).await;

        self.set_active(None);
        if stop.is_set() {
            kill.set();
        }
        let teardown = sink.finish().await;

        match (streamed, teardown) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), teardown) => {
                if let Err(teardown_err) = teardown {
                    tracing::warn!(error = %teardown_err, "sink teardown failed");
                }
                Err(e)
            }
        }
    }

    /// Stop the active playback, if any
    ///
    /// Safe to call from a concurrent task at any time. Sets the stop
    /// signal and kills the sink right away; the playing task then writes
    /// nothing more and tears the sink down.
    pub fn stop(&self) {
        let active = self.active.lock().ok().and_then(|guard| guard.clone());
        if let Some(active) = active {
            if active.stop.set() {
                tracing::debug!("playback stop requested");
            }
            active.kill.set();
        }
    }

    fn set_active(&self, active: Option<ActivePlayback>) {
        if let Ok(mut guard) = self.active.lock() {
            *guard = active;
        }
    }

    async fn stream_into(
        &self,
        sink: &mut dyn AudioSink,
        text: &str,
        stop: &StopSignal,
    ) -> Result<PlaybackOutcome> {
        let started = Instant::now();

        let mut chunks = tokio::select! {
            biased;
            () = stop.wait() => return Ok(PlaybackOutcome::Stopped),
            chunks = self.synthesizer.synthesize(text) => chunks?,
        };

        let mut first_byte = true;
        loop {
            let next = tokio::select! {
                biased;
                () = stop.wait() => return Ok(PlaybackOutcome::Stopped),
                next = chunks.next() => next,
            };

            let Some(chunk) = next else {
                tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "playback complete");
                return Ok(PlaybackOutcome::Completed);
            };
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }

            if stop.is_set() {
                return Ok(PlaybackOutcome::Stopped);
            }

            if first_byte {
                first_byte = false;
                tracing::info!(ttfb_ms = started.elapsed().as_millis(), "TTS time to first byte");
            }

            let accepted = tokio::select! {
                biased;
                () = stop.wait() => return Ok(PlaybackOutcome::Stopped),
                accepted = sink.write(&chunk) => accepted?,
            };

            if !accepted {
                tracing::info!("TTS playback stopped by sink");
                return Ok(PlaybackOutcome::SinkClosed);
            }
        }
    }
}
