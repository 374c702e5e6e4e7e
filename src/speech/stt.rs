//! Speech-to-text (STT) processing
//!
//! Streaming transcription for utterance capture and batch transcription for
//! keyword segments, both via Deepgram.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use crate::audio::{AudioFrame, SAMPLE_RATE, SegmentTranscriber};
use crate::conversation::TranscriptFragment;
use crate::{Error, Result};

/// Deepgram live endpoint
const LIVE_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Deepgram prerecorded endpoint
const BATCH_URL: &str = "https://api.deepgram.com/v1/listen";

/// Deepgram closes idle sockets after ~10s without audio or keep-alive
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

const KEEPALIVE_JSON: &str = r#"{"type":"KeepAlive"}"#;
const CLOSE_STREAM_JSON: &str = r#"{"type":"CloseStream"}"#;

/// Frames buffered toward the socket before `send` waits
const AUDIO_CHANNEL_SIZE: usize = 64;
const FRAGMENT_CHANNEL_SIZE: usize = 64;

/// Opens streaming transcription connections
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Open one connection for one utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the connection cannot be established
    async fn connect(&self) -> Result<Box<dyn TranscriptionConnection>>;
}

/// A live transcription stream: frames in, fragments out
#[async_trait]
pub trait TranscriptionConnection: Send {
    /// Send one frame of audio
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the connection is gone
    async fn send(&mut self, frame: AudioFrame) -> Result<()>;

    /// Wait for the next fragment; `None` once the stream has closed
    ///
    /// Must be cancel-safe: it is raced against frame reads.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` on transport failure
    async fn recv(&mut self) -> Result<Option<TranscriptFragment>>;

    /// Close the connection; the only supported way to cancel it
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the close handshake fails
    async fn close(&mut self) -> Result<()>;
}

/// Query options for the live endpoint
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Model (e.g. "nova-2")
    pub model: String,
    /// BCP-47 language tag
    pub language: String,
    /// Silence in milliseconds before Deepgram marks speech final
    pub endpointing_ms: u32,
    /// Add punctuation
    pub punctuate: bool,
    /// Apply smart formatting
    pub smart_format: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            model: "nova-2".to_string(),
            language: "en-US".to_string(),
            endpointing_ms: 300,
            punctuate: true,
            smart_format: true,
        }
    }
}

impl LiveOptions {
    /// Full websocket URL including audio format parameters
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{LIVE_URL}?model={}&language={}&encoding=linear16&channels=1&sample_rate={SAMPLE_RATE}&endpointing={}&punctuate={}&smart_format={}",
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.language),
            self.endpointing_ms,
            self.punctuate,
            self.smart_format,
        )
    }
}

/// Streaming transcription via Deepgram's live websocket API
pub struct DeepgramLive {
    api_key: SecretString,
    options: LiveOptions,
}

impl DeepgramLive {
    /// Create a new live transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, options: LiveOptions) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self { api_key, options })
    }
}

#[async_trait]
impl Transcriber for DeepgramLive {
    async fn connect(&self) -> Result<Box<dyn TranscriptionConnection>> {
        let mut request = self
            .options
            .url()
            .into_client_request()
            .map_err(|e| Error::Stream(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key.expose_secret()))
            .map_err(|e| Error::Config(format!("invalid Deepgram API key: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let (socket, _) = connect_async(request).await.map_err(|e| {
            tracing::error!(error = %e, "could not open transcription socket");
            Error::Stream(format!("could not open socket: {e}"))
        })?;
        tracing::debug!(model = %self.options.model, "transcription socket open");

        let (mut writer, mut reader) = socket.split();
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_CHANNEL_SIZE);
        let (fragment_tx, fragment_rx) = mpsc::channel(FRAGMENT_CHANNEL_SIZE);

        let writer_task = tokio::spawn(async move {
            let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
            keepalive.tick().await;

            loop {
                tokio::select! {
                    audio = audio_rx.recv() => match audio {
                        Some(bytes) => writer.send(Message::binary(bytes)).await?,
                        None => break,
                    },
                    _ = keepalive.tick() => writer.send(Message::text(KEEPALIVE_JSON)).await?,
                }
            }

            writer.send(Message::text(CLOSE_STREAM_JSON)).await?;
            writer.close().await?;
            Ok::<_, Error>(())
        });

        let reader_task = tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                let fragment = match message {
                    Ok(Message::Text(text)) => match parse_live_message(text.as_str()) {
                        Ok(Some(fragment)) => Ok(fragment),
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "unparseable transcription message");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(?frame, "transcription socket closed by server");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => Err(Error::Stream(e.to_string())),
                };

                let failed = fragment.is_err();
                if fragment_tx.send(fragment).await.is_err() || failed {
                    break;
                }
            }
        });

        Ok(Box::new(LiveConnection {
            audio_tx: Some(audio_tx),
            fragments: fragment_rx,
            writer: writer_task,
            reader: reader_task,
        }))
    }
}

/// One open Deepgram live socket, driven by a writer and a reader task
struct LiveConnection {
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
    fragments: mpsc::Receiver<Result<TranscriptFragment>>,
    writer: JoinHandle<Result<()>>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl TranscriptionConnection for LiveConnection {
    async fn send(&mut self, frame: AudioFrame) -> Result<()> {
        let tx = self
            .audio_tx
            .as_ref()
            .ok_or_else(|| Error::Stream("connection already closed".to_string()))?;
        tx.send(frame.to_le_bytes())
            .await
            .map_err(|_| Error::Stream("transcription socket writer stopped".to_string()))
    }

    async fn recv(&mut self) -> Result<Option<TranscriptFragment>> {
        self.fragments.recv().await.transpose()
    }

    async fn close(&mut self) -> Result<()> {
        if self.audio_tx.take().is_none() {
            return Ok(());
        }

        let written = (&mut self.writer)
            .await
            .map_err(|e| Error::Stream(format!("socket writer panicked: {e}")))?;
        self.reader.abort();
        tracing::debug!("transcription socket closed");
        written
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

#[derive(serde::Deserialize)]
struct LiveMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<DeepgramChannel>,
    #[serde(default)]
    speech_final: bool,
}

/// Response from Deepgram prerecorded transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramChannel {
    fn into_transcript(self) -> String {
        self.alternatives
            .into_iter()
            .next()
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

/// Turn a live socket message into a fragment; non-result messages yield `None`
fn parse_live_message(text: &str) -> Result<Option<TranscriptFragment>> {
    let message: LiveMessage = serde_json::from_str(text)?;
    if message.kind != "Results" {
        tracing::trace!(kind = %message.kind, "ignoring live message");
        return Ok(None);
    }

    let transcript = message
        .channel
        .map(DeepgramChannel::into_transcript)
        .unwrap_or_default();

    Ok(Some(TranscriptFragment {
        text: transcript,
        is_final: message.speech_final,
    }))
}

/// Batch transcription of short WAV clips via Deepgram
pub struct DeepgramBatch {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl DeepgramBatch {
    /// Create a new batch transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl SegmentTranscriber for DeepgramBatch {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), "starting Deepgram transcription");

        let url = format!("{BATCH_URL}?model={}&punctuate=true", urlencoding::encode(&self.model));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Stream(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            e
        })?;

        let transcript = result
            .results
            .channels
            .into_iter()
            .next()
            .map(DeepgramChannel::into_transcript)
            .unwrap_or_default();

        tracing::debug!(transcript = %transcript, "segment transcribed");
        Ok(transcript)
    }
}
