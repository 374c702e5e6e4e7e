//! TOML configuration file loading
//!
//! Supports `~/.config/buddy/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BuddyConfigFile {
    /// Wake, stop and exit phrases
    #[serde(default)]
    pub keywords: KeywordsFileConfig,

    /// Speech-to-text, text-to-speech and player settings
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Response generation settings
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct KeywordsFileConfig {
    /// Phrase that starts a conversation (e.g. "hey buddy")
    pub start: Option<String>,

    /// Phrase that interrupts playback (e.g. "stop buddy")
    pub stop: Option<String>,

    /// Phrase that ends the conversation (e.g. "goodbye")
    pub exit: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Streaming STT model (e.g. "nova-2")
    pub stt_model: Option<String>,

    /// STT language tag
    pub language: Option<String>,

    /// Silence in milliseconds before the STT marks speech final
    pub endpointing_ms: Option<u32>,

    /// TTS voice model (e.g. "aura-helios-en")
    pub tts_model: Option<String>,

    /// TTS output sample rate
    pub tts_sample_rate: Option<u32>,

    /// Player binary fed with audio on stdin
    pub player: Option<String>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Path to a system prompt file
    pub system_prompt_file: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub deepgram: Option<String>,
    pub llm: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BuddyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BuddyConfigFile {
    config_file_path().map_or_else(BuddyConfigFile::default, |path| load_from(&path))
}

/// Load a config file from `path`, falling back to defaults
pub fn load_from(path: &Path) -> BuddyConfigFile {
    if !path.exists() {
        return BuddyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BuddyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BuddyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/buddy/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("buddy").join("config.toml"))
}
