//! Wake phrase listener
//!
//! The outer loop of the process. It owns the keyword spotter for its whole
//! lifetime and opens a fresh audio device for every conversation.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioDevice, KeywordSpotter, START_SLOT};
use crate::conversation::{ConversationSession, Services, SessionState};
use crate::Result;

/// Opens the input device, called once per wake cycle
pub type DeviceOpener = Box<dyn FnMut() -> Result<AudioDevice>>;

/// Waits for the start phrase and runs one session per detection
pub struct WakeListener {
    open_device: DeviceOpener,
    spotter: Box<dyn KeywordSpotter>,
    services: Services,
    exit_phrase: String,
    state: watch::Sender<SessionState>,
}

impl WakeListener {
    /// Create a listener
    #[must_use]
    pub fn new(
        open_device: DeviceOpener,
        spotter: Box<dyn KeywordSpotter>,
        services: Services,
        exit_phrase: impl Into<String>,
    ) -> Self {
        Self {
            open_device,
            spotter,
            services,
            exit_phrase: exit_phrase.into(),
            state: watch::Sender::new(SessionState::Idle),
        }
    }

    /// Current phase, including the phase of a running session
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow phase changes while [`WakeListener::run`] holds the listener
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Listen until `shutdown` is cancelled
    ///
    /// Failed conversations are logged and listening resumes.
    ///
    /// # Errors
    ///
    /// Returns an error only when it is fatal: the device cannot be opened or
    /// read, or configuration is unusable
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let ended = self.listen(shutdown).await;
        self.state.send_replace(SessionState::Idle);
        ended
    }

    async fn listen(&mut self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            let mut device = (self.open_device)()?;

            self.state.send_replace(SessionState::AwaitingWake);
            tracing::info!("listening for wake word...");
            if !self.wait_for_wake(&mut device, shutdown).await? {
                tracing::info!("shutting down");
                return Ok(());
            }
            tracing::info!("wake word detected");

            let ended = ConversationSession::new(
                &mut device,
                self.spotter.as_mut(),
                self.services.clone(),
                &self.exit_phrase,
            )
            .with_state_observer(&self.state)
            .run(shutdown)
            .await;

            match ended {
                Ok(end) => tracing::debug!(reason = ?end, "session finished"),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::error!(error = %e, "conversation failed"),
            }
            drop(device);

            if shutdown.is_cancelled() {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }

    /// Feed frames to the spotter until the start phrase; `false` on shutdown
    async fn wait_for_wake(
        &mut self,
        device: &mut AudioDevice,
        shutdown: &CancellationToken,
    ) -> Result<bool> {
        let mut lease = device.acquire()?;
        self.spotter.reset();

        loop {
            let frame = tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(false),
                frame = lease.read() => frame?,
            };

            let detected = tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(false),
                detected = self.spotter.process(&frame) => detected,
            };

            match detected {
                Ok(Some(START_SLOT)) => return Ok(true),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "skipping frame"),
            }
        }
    }
}
