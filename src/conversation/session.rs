//! Conversation session state machine
//!
//! A session runs turns until the exit phrase is heard or shutdown is
//! requested: capture an utterance, generate a reply, then speak it while the
//! interrupt watcher listens for the stop phrase on the same device.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::capture::UtteranceCapture;
use super::history::{ConversationHistory, ConversationTurn};
use super::interrupt::{InterruptWatcher, WatchOutcome};
use super::transcript::Utterance;
use crate::audio::{AudioDevice, KeywordSpotter};
use crate::llm::ResponseGenerator;
use crate::playback::{PlaybackOutcome, ResponsePlayer, SinkLauncher};
use crate::signal::StopSignal;
use crate::speech::{Synthesizer, Transcriber};
use crate::Result;

/// Phase of the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing running
    #[default]
    Idle,
    /// Listening for the start phrase
    AwaitingWake,
    /// Streaming an utterance to the transcriber
    Capturing,
    /// Waiting on the response generator
    Generating,
    /// Playing the reply with barge-in enabled
    Speaking,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingWake => "awaiting_wake",
            Self::Capturing => "capturing",
            Self::Generating => "generating",
            Self::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Why a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The human said the exit phrase
    ExitPhrase,
    /// Shutdown was requested
    Interrupted,
}

/// External collaborators a session talks to
#[derive(Clone)]
pub struct Services {
    /// Streaming speech-to-text
    pub transcriber: Arc<dyn Transcriber>,
    /// Reply generation
    pub generator: Arc<dyn ResponseGenerator>,
    /// Text-to-speech
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Speaker output
    pub sink: Arc<dyn SinkLauncher>,
}

/// One conversation, from wake to exit
pub struct ConversationSession<'a> {
    id: Uuid,
    device: &'a mut AudioDevice,
    spotter: &'a mut dyn KeywordSpotter,
    services: Services,
    player: ResponsePlayer,
    history: ConversationHistory,
    state: SessionState,
    observer: Option<&'a watch::Sender<SessionState>>,
    exit_phrase: String,
}

impl<'a> ConversationSession<'a> {
    /// Create a session borrowing the device and spotter for its lifetime
    #[must_use]
    pub fn new(
        device: &'a mut AudioDevice,
        spotter: &'a mut dyn KeywordSpotter,
        services: Services,
        exit_phrase: &str,
    ) -> Self {
        let player = ResponsePlayer::new(services.synthesizer.clone(), services.sink.clone());

        Self {
            id: Uuid::new_v4(),
            device,
            spotter,
            services,
            player,
            history: ConversationHistory::new(),
            state: SessionState::Idle,
            observer: None,
            exit_phrase: exit_phrase.to_lowercase(),
        }
    }

    /// Publish every state change to `observer` as well
    #[must_use]
    pub fn with_state_observer(mut self, observer: &'a watch::Sender<SessionState>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Session id used in log spans
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current phase
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Turns exchanged so far
    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Run turns until the exit phrase or `shutdown`
    ///
    /// The session is back in [`SessionState::Idle`] when this returns, on
    /// every path.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the current turn. The human turn of a
    /// failed generation stays in the history.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<SessionEnd> {
        let span = tracing::info_span!("session", id = %self.id);
        let ended = self.turns(shutdown).instrument(span).await;
        self.set_state(SessionState::Idle);

        if let Ok(end) = &ended {
            tracing::info!(
                session = %self.id,
                reason = ?end,
                turns = self.history.len(),
                "conversation ended"
            );
        }
        ended
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(observer) = self.observer {
            observer.send_replace(state);
        }
    }

    async fn turns(&mut self, shutdown: &CancellationToken) -> Result<SessionEnd> {
        loop {
            self.set_state(SessionState::Capturing);
            let capture = UtteranceCapture::new(self.services.transcriber.as_ref());
            let Some(utterance) = capture.capture(self.device, shutdown).await? else {
                return Ok(SessionEnd::Interrupted);
            };

            if utterance.contains_phrase(&self.exit_phrase) {
                return Ok(SessionEnd::ExitPhrase);
            }

            self.set_state(SessionState::Generating);
            let reply = tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(SessionEnd::Interrupted),
                reply = self.respond(utterance) => reply?,
            };

            self.set_state(SessionState::Speaking);
            self.speak(&reply, shutdown).await?;

            if shutdown.is_cancelled() {
                return Ok(SessionEnd::Interrupted);
            }
        }
    }

    async fn respond(&mut self, utterance: Utterance) -> Result<String> {
        let text = utterance.into_string();
        self.history.push(ConversationTurn::human(text.clone()));

        let reply = self
            .services
            .generator
            .generate(self.history.before_last(), &text)
            .await?;
        tracing::info!(assistant = %reply, "reply generated");

        self.history.push(ConversationTurn::assistant(reply.clone()));
        Ok(reply)
    }

    /// Play `reply` and watch for the stop phrase until both are done
    async fn speak(&mut self, reply: &str, shutdown: &CancellationToken) -> Result<()> {
        let stop = StopSignal::new();
        let finished = CancellationToken::new();

        let mut lease = self.device.acquire()?;
        let mut watcher = InterruptWatcher::new(&mut *self.spotter);
        let player = &self.player;

        let playback = async {
            let outcome = player.play(reply, &stop).await;
            finished.cancel();
            outcome
        };

        let watch = async {
            let watched = watcher.watch(&mut lease, &stop, &finished, player).await;
            if watched.is_err() {
                stop.set();
            }
            watched
        };

        let forward_shutdown = async {
            tokio::select! {
                () = shutdown.cancelled() => {
                    stop.set();
                }
                () = finished.cancelled() => {}
            }
        };

        let (played, watched, ()) = tokio::join!(playback, watch, forward_shutdown);
        drop(lease);

        let watched = watched?;
        let played = played?;

        if watched == WatchOutcome::StopPhrase || played == PlaybackOutcome::Stopped {
            tracing::info!("interrupted, ready for next command");
        }
        Ok(())
    }
}
