//! Configuration management for Parley
//!
//! This module provides:
//! - Configuration structs for playback, voices, synthesis and the mixer
//! - TOML serialization with per-field defaults
//! - A config manager with corrupt-file recovery
//! - Hot-reload support via file system watcher

use crate::domain::attenuation::AttenuationConfig;
use crate::domain::gate::GateLimits;
use crate::domain::mixer::DEFAULT_MAX_FLOATING;
use crate::domain::voice::VoiceSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable overriding `synthesis.api_key`
pub const ENV_AZURE_KEY: &str = "PARLEY_AZURE_KEY";
/// Environment variable overriding `synthesis.region`
pub const ENV_AZURE_REGION: &str = "PARLEY_AZURE_REGION";

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Minimum time before the same speaker may repeat the same line
    pub cooldown_ms: u64,

    /// Spoken once per session on login
    pub greeting: String,

    /// Ignore overhead text while a dialogue is open
    pub block_floating_while_dialogue: bool,

    /// Concurrent synthesis requests
    pub worker_threads: usize,

    /// Pending synthesis requests before new ones are rejected
    pub queue_capacity: usize,

    /// Memory bounds of the cooldown gate
    pub gate: GateLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 5000,
            greeting: "Welcome to the game!".to_string(),
            block_floating_while_dialogue: false,
            worker_threads: 4,
            queue_capacity: 32,
            gate: GateLimits::default(),
        }
    }
}

/// Synthesis backend credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Subscription key (empty = not configured)
    pub api_key: String,

    /// Service region such as `westeurope` (empty = not configured)
    pub region: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            region: String::new(),
            timeout_secs: 15,
        }
    }
}

impl SynthesisConfig {
    /// Both key and region are present
    pub fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty() && !self.region.trim().is_empty()
    }

    /// Apply `PARLEY_AZURE_KEY` / `PARLEY_AZURE_REGION` when set and non-empty
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(key) = non_empty_env(ENV_AZURE_KEY) {
            debug!("Using synthesis key from environment");
            self.api_key = key;
        }
        if let Some(region) = non_empty_env(ENV_AZURE_REGION) {
            debug!(%region, "Using synthesis region from environment");
            self.region = region;
        }
        self
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Mixer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Output device name (empty = use default)
    pub output_device: String,

    /// Floating streams playing at once before the oldest is dropped
    pub max_floating_streams: usize,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            output_device: String::new(),
            max_floating_streams: DEFAULT_MAX_FLOATING,
        }
    }
}

impl MixerConfig {
    pub fn output_device(&self) -> Option<&str> {
        let name = self.output_device.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Complete Parley configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub app: AppConfig,
    pub voices: VoiceSettings,
    pub attenuation: AttenuationConfig,
    pub synthesis: SynthesisConfig,
    pub mixer: MixerConfig,
}

impl ParleyConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        Self::default()
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.app.worker_threads == 0 {
            return Err(ConfigError::Invalid("app.worker_threads must be at least 1".to_string()));
        }
        if self.app.queue_capacity == 0 {
            return Err(ConfigError::Invalid("app.queue_capacity must be at least 1".to_string()));
        }
        if self.mixer.max_floating_streams == 0 {
            return Err(ConfigError::Invalid(
                "mixer.max_floating_streams must be at least 1".to_string(),
            ));
        }
        for (name, ratio) in [
            ("attenuation.min_ratio", self.attenuation.min_ratio),
            ("attenuation.max_ratio", self.attenuation.max_ratio),
        ] {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be a non-negative number")));
            }
        }
        Ok(())
    }

    /// Settings the running narrator needs, detached from the file layout
    pub fn playback_settings(&self) -> PlaybackSettings {
        PlaybackSettings {
            cooldown_ms: self.app.cooldown_ms,
            greeting: self.app.greeting.clone(),
            block_floating_while_dialogue: self.app.block_floating_while_dialogue,
            voices: self.voices.clone(),
            attenuation: self.attenuation,
        }
    }
}

/// Hot-reloadable subset of the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSettings {
    pub cooldown_ms: u64,
    pub greeting: String,
    pub block_floating_while_dialogue: bool,
    pub voices: VoiceSettings,
    pub attenuation: AttenuationConfig,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        ParleyConfig::default().playback_settings()
    }
}

/// File system watcher for hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `config_dir` for created or modified `.toml` files
    pub async fn new(config_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        fs::create_dir_all(&config_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            // No subscribers is fine
                            if tx_clone.send(path).is_err() {
                                debug!("Config change with no subscribers");
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&config_dir, notify::RecursiveMode::NonRecursive)?;

        info!(
            path = %config_dir.display(),
            "Config watcher started"
        );

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Configuration manager for the main Parley config
///
/// Manages the configuration file at `~/.config/parley/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manage `config.toml` inside `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Manage an explicit config file
    pub fn with_path(config_path: PathBuf) -> Self {
        let config_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/parley` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("parley"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns factory default.
    /// If the config file is corrupt, backs it up and returns factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> ParleyConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = ParleyConfig::factory_default();

            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match ParleyConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                ParleyConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &ParleyConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
