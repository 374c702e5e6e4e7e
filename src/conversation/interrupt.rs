//! Barge-in detection while a reply is playing

use tokio_util::sync::CancellationToken;

use crate::audio::{DeviceLease, KeywordSpotter, STOP_SLOT};
use crate::playback::ResponsePlayer;
use crate::signal::StopSignal;
use crate::Result;

/// Why the watcher returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The stop phrase was heard and playback was stopped
    StopPhrase,
    /// Someone else had already set the stop signal
    AlreadyStopped,
    /// Playback ended on its own
    PlaybackFinished,
}

/// Listens for the stop phrase during one speaking phase
pub struct InterruptWatcher<'a> {
    spotter: &'a mut dyn KeywordSpotter,
}

impl<'a> InterruptWatcher<'a> {
    /// Create a watcher around the shared spotter
    #[must_use]
    pub fn new(spotter: &'a mut dyn KeywordSpotter) -> Self {
        Self { spotter }
    }

    /// Read and classify frames until the stop phrase, a set `stop`, or
    /// `finished` ends the phase
    ///
    /// The spotter is reset first so audio from an earlier phase cannot
    /// complete a phrase here. Each iteration performs one device read.
    /// Returns without reading anything when `stop` is already set.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if reading fails; spotter errors are skipped
    pub async fn watch(
        &mut self,
        lease: &mut DeviceLease<'_>,
        stop: &StopSignal,
        finished: &CancellationToken,
        player: &ResponsePlayer,
    ) -> Result<WatchOutcome> {
        self.spotter.reset();

        loop {
            if stop.is_set() {
                return Ok(WatchOutcome::AlreadyStopped);
            }

            let frame = tokio::select! {
                biased;
                () = stop.wait() => return Ok(WatchOutcome::AlreadyStopped),
                () = finished.cancelled() => return Ok(WatchOutcome::PlaybackFinished),
                frame = lease.read() => frame?,
            };

            let detected = tokio::select! {
                biased;
                () = stop.wait() => return Ok(WatchOutcome::AlreadyStopped),
                () = finished.cancelled() => return Ok(WatchOutcome::PlaybackFinished),
                detected = self.spotter.process(&frame) => detected,
            };

            match detected {
                Ok(Some(STOP_SLOT)) => {
                    tracing::info!("stop phrase detected");
                    stop.set();
                    player.stop();
                    return Ok(WatchOutcome::StopPhrase);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping frame"),
            }
        }
    }
}
