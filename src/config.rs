use crate::defaults;
use crate::recovery::RecoveryConfig;
use crate::session::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub chunking: ChunkingConfig,
    pub queue: QueueConfig,
    pub stt: SttConfig,
    pub translation: TranslationConfig,
    pub recovery: RecoveryConfig,
    pub session: StoreConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub poll_interval_ms: u64,
    /// RMS value mapped to 100% loudness.
    pub level_full_scale_rms: f32,
    /// Exponential smoothing factor for the level monitor, 0..=1.
    pub level_smoothing: f32,
    /// Consecutive read failures before capture is abandoned.
    pub max_consecutive_read_errors: u32,
}

/// Chunk boundary configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub base_chunk_ms: u64,
    /// Loudness percentage below which audio counts as quiet.
    pub quiet_threshold_pct: f32,
    pub max_extension_ms: u64,
    /// Partial chunks shorter than this are discarded at shutdown.
    pub min_chunk_ms: u64,
}

/// Producer/consumer queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub model: String,
    pub threads: u32,
    pub timeout_ms: u64,
}

/// Translation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    pub source_language: String,
    pub target_language: String,
    pub model: Option<String>,
    pub workers: usize,
    pub job_buffer: usize,
    /// Recent translated sentences carried as context per request.
    pub context_window: usize,
    pub timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            poll_interval_ms: defaults::CAPTURE_POLL_INTERVAL_MS,
            level_full_scale_rms: defaults::LEVEL_FULL_SCALE_RMS,
            level_smoothing: defaults::LEVEL_SMOOTHING,
            max_consecutive_read_errors: defaults::MAX_CONSECUTIVE_READ_ERRORS,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            base_chunk_ms: defaults::BASE_CHUNK_MS,
            quiet_threshold_pct: defaults::QUIET_THRESHOLD_PCT,
            max_extension_ms: defaults::MAX_EXTENSION_MS,
            min_chunk_ms: defaults::MIN_CHUNK_MS,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::CHUNK_QUEUE_CAPACITY,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            threads: 4,
            timeout_ms: defaults::TRANSCRIPTION_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: defaults::DEFAULT_SOURCE_LANGUAGE.to_string(),
            target_language: defaults::DEFAULT_TARGET_LANGUAGE.to_string(),
            model: None,
            workers: defaults::TRANSLATION_WORKERS,
            job_buffer: defaults::TRANSLATION_JOB_BUFFER,
            context_window: defaults::CONTEXT_WINDOW,
            timeout_ms: defaults::TRANSLATION_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML or out-of-range values.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.audio.sample_rate == 0 {
            anyhow::bail!("audio.sample_rate must be positive");
        }
        if !(0.0..=1.0).contains(&self.audio.level_smoothing) {
            anyhow::bail!("audio.level_smoothing must be within 0..=1");
        }
        if !(0.0..=100.0).contains(&self.chunking.quiet_threshold_pct) {
            anyhow::bail!("chunking.quiet_threshold_pct must be within 0..=100");
        }
        if self.chunking.base_chunk_ms == 0 {
            anyhow::bail!("chunking.base_chunk_ms must be positive");
        }
        if self.queue.capacity == 0 {
            anyhow::bail!("queue.capacity must be positive");
        }
        if self.translation.workers == 0 {
            anyhow::bail!("translation.workers must be positive");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - TRANSLIVE_MODEL → stt.model
    /// - TRANSLIVE_SOURCE_LANGUAGE → translation.source_language
    /// - TRANSLIVE_TARGET_LANGUAGE → translation.target_language
    /// - TRANSLIVE_AUDIO_DEVICE → audio.device
    /// - TRANSLIVE_SESSIONS_DIR → session.sessions_dir
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("TRANSLIVE_MODEL")
            && !model.is_empty()
        {
            self.stt.model = model;
        }

        if let Ok(language) = std::env::var("TRANSLIVE_SOURCE_LANGUAGE")
            && !language.is_empty()
        {
            self.translation.source_language = language;
        }

        if let Ok(language) = std::env::var("TRANSLIVE_TARGET_LANGUAGE")
            && !language.is_empty()
        {
            self.translation.target_language = language;
        }

        if let Ok(device) = std::env::var("TRANSLIVE_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(dir) = std::env::var("TRANSLIVE_SESSIONS_DIR")
            && !dir.is_empty()
        {
            self.session.sessions_dir = dir;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/translive/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("translive")
            .join("config.toml")
    }
}
