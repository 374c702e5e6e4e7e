//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Deepgram speak endpoint
const SPEAK_URL: &str = "https://api.deepgram.com/v1/speak";

/// Stream of synthesized linear PCM chunks
pub type AudioChunks = BoxStream<'static, Result<Vec<u8>>>;

/// Synthesizes speech from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Open a synthesis request; audio arrives as it is generated
    ///
    /// Dropping the stream releases the connection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Stream` if the request fails
    async fn synthesize(&self, text: &str) -> Result<AudioChunks>;
}

/// Streaming synthesis via Deepgram Aura
pub struct DeepgramSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    sample_rate: u32,
}

impl DeepgramSpeech {
    /// Create a new TTS instance
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, model: String, sample_rate: u32) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            sample_rate,
        })
    }

    fn url(&self) -> String {
        format!(
            "{SPEAK_URL}?model={}&performance=some&encoding=linear16&sample_rate={}",
            urlencoding::encode(&self.model),
            self.sample_rate
        )
    }
}

#[async_trait]
impl Synthesizer for DeepgramSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioChunks> {
        #[derive(serde::Serialize)]
        struct SpeakRequest<'a> {
            text: &'a str,
        }

        tracing::debug!(chars = text.len(), model = %self.model, "requesting speech");

        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Token {}", self.api_key.expose_secret()))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| Error::Stream(format!("TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stream(format!("Deepgram TTS error {status}: {body}")));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| Error::Stream(format!("TTS stream failed: {e}")))
            })
            .boxed())
    }
}
