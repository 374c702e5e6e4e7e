//! Utterance capture over a streaming transcription connection

use tokio_util::sync::CancellationToken;

use super::transcript::{TranscriptAssembler, Utterance};
use crate::audio::{AudioDevice, DeviceLease};
use crate::speech::{Transcriber, TranscriptionConnection};
use crate::{Error, Result};

/// Captures exactly one non-empty utterance per call
pub struct UtteranceCapture<'a> {
    transcriber: &'a dyn Transcriber,
}

impl<'a> UtteranceCapture<'a> {
    /// Create a capture backed by `transcriber`
    #[must_use]
    pub const fn new(transcriber: &'a dyn Transcriber) -> Self {
        Self { transcriber }
    }

    /// Stream microphone audio to the transcriber until an utterance is final
    ///
    /// Finality with blank text does not end the capture. There is no
    /// timeout; cancelling `cancel` closes the connection and returns
    /// `Ok(None)`. The device is released and the connection closed on every
    /// path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the connection fails and `Error::Device` if
    /// the device does
    pub async fn capture(
        &self,
        device: &mut AudioDevice,
        cancel: &CancellationToken,
    ) -> Result<Option<Utterance>> {
        let mut connection = self.transcriber.connect().await?;
        tracing::info!("listening...");

        let captured = match device.acquire() {
            Ok(mut lease) => pump(&mut lease, connection.as_mut(), cancel).await,
            Err(e) => Err(e),
        };

        if let Err(e) = connection.close().await {
            tracing::warn!(error = %e, "failed to close transcription connection");
        }

        if let Ok(Some(utterance)) = &captured {
            tracing::info!(human = %utterance, "utterance captured");
        }
        captured
    }
}

/// Shuttle frames out and fragments in until one utterance is final
async fn pump(
    lease: &mut DeviceLease<'_>,
    connection: &mut dyn TranscriptionConnection,
    cancel: &CancellationToken,
) -> Result<Option<Utterance>> {
    let mut assembler = TranscriptAssembler::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("capture cancelled");
                return Ok(None);
            }
            fragment = connection.recv() => {
                let fragment = fragment?.ok_or_else(|| {
                    Error::Stream("transcription stream closed before speech was final".to_string())
                })?;

                let is_final = fragment.is_final;
                assembler.add_part(fragment.text);
                if !is_final {
                    continue;
                }

                if let Some(utterance) = Utterance::finalize(&assembler.full_transcript()) {
                    assembler.reset();
                    return Ok(Some(utterance));
                }
                tracing::debug!("final fragment without speech, still listening");
            }
            frame = lease.read() => {
                connection.send(frame?).await?;
            }
        }
    }
}
