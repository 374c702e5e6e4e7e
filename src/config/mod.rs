//! Configuration management for buddy
//!
//! Every setting resolves as env > `~/.config/buddy/config.toml` > default.

mod file;

use std::path::{Path, PathBuf};

use secrecy::SecretString;

pub use file::{BuddyConfigFile, config_file_path, load_config_file, load_from};

use crate::{Error, Result};

/// Prompt used when no `system_prompt.txt` is found
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Buddy, a friendly voice assistant. \
Answer in one or two short spoken sentences without markdown or lists.";

/// Buddy configuration
#[derive(Debug)]
pub struct Config {
    /// Wake, stop and exit phrases
    pub keywords: KeywordConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// Response generation
    pub llm: LlmConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Phrases the assistant reacts to
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    /// Starts a conversation (keyword slot 0)
    pub start_phrase: String,

    /// Interrupts playback (keyword slot 1)
    pub stop_phrase: String,

    /// Ends the conversation when contained in an utterance
    pub exit_phrase: String,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Streaming STT model
    pub stt_model: String,

    /// STT language tag
    pub language: String,

    /// Endpointing silence in milliseconds
    pub endpointing_ms: u32,

    /// TTS voice model
    pub tts_model: String,

    /// TTS output sample rate
    pub tts_sample_rate: u32,

    /// Player binary receiving audio on stdin
    pub player: String,
}

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// System prompt text
    pub system_prompt: String,
}

/// API keys, never logged
#[derive(Debug)]
pub struct ApiKeys {
    /// Deepgram key for STT and TTS
    pub deepgram: SecretString,

    /// Key for the chat completions endpoint
    pub llm: SecretString,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required API key is missing or a value is
    /// malformed
    pub fn load() -> Result<Self> {
        let fc = load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a required API key is missing or a value is
    /// malformed
    pub fn resolve(fc: BuddyConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // API keys (env > toml), both required
        let deepgram = env("DEEPGRAM_API_KEY")
            .or(fc.api_keys.deepgram)
            .ok_or_else(|| Error::Config("DEEPGRAM_API_KEY is not set".to_string()))?;
        let llm_key = env("GROQ_API_KEY")
            .or_else(|| env("LLM_API_KEY"))
            .or(fc.api_keys.llm)
            .ok_or_else(|| Error::Config("GROQ_API_KEY or LLM_API_KEY is not set".to_string()))?;

        let api_keys = ApiKeys {
            deepgram: SecretString::from(deepgram),
            llm: SecretString::from(llm_key),
        };

        let keywords = KeywordConfig {
            start_phrase: env("BUDDY_START_PHRASE")
                .or(fc.keywords.start)
                .unwrap_or_else(|| "hey buddy".to_string()),
            stop_phrase: env("BUDDY_STOP_PHRASE")
                .or(fc.keywords.stop)
                .unwrap_or_else(|| "stop buddy".to_string()),
            exit_phrase: env("BUDDY_EXIT_PHRASE")
                .or(fc.keywords.exit)
                .unwrap_or_else(|| "goodbye".to_string()),
        };
        if keywords.exit_phrase.trim().is_empty() {
            return Err(Error::Config("exit phrase must not be empty".to_string()));
        }

        let voice = VoiceConfig {
            stt_model: env("BUDDY_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "nova-2".to_string()),
            language: env("BUDDY_STT_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or_else(|| "en-US".to_string()),
            endpointing_ms: parse_env(&env, "BUDDY_ENDPOINTING_MS")?
                .or(fc.voice.endpointing_ms)
                .unwrap_or(300),
            tts_model: env("BUDDY_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "aura-helios-en".to_string()),
            tts_sample_rate: parse_env(&env, "BUDDY_TTS_SAMPLE_RATE")?
                .or(fc.voice.tts_sample_rate)
                .unwrap_or(24_000),
            player: env("BUDDY_PLAYER")
                .or(fc.voice.player)
                .unwrap_or_else(|| "ffplay".to_string()),
        };

        let prompt_path = env("BUDDY_SYSTEM_PROMPT_FILE")
            .or(fc.llm.system_prompt_file)
            .map_or_else(|| PathBuf::from("system_prompt.txt"), PathBuf::from);

        let llm = LlmConfig {
            base_url: env("LLM_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            model: env("LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            temperature: parse_env(&env, "LLM_TEMPERATURE")?
                .or(fc.llm.temperature)
                .unwrap_or(0.0),
            system_prompt: load_system_prompt(&prompt_path),
        };

        Ok(Self {
            keywords,
            voice,
            llm,
            api_keys,
        })
    }
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
        })
        .transpose()
}

/// Read the system prompt, falling back to [`DEFAULT_SYSTEM_PROMPT`]
fn load_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(prompt) if !prompt.trim().is_empty() => {
            tracing::debug!(path = %path.display(), "loaded system prompt");
            prompt.trim().to_string()
        }
        Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "using default system prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}
