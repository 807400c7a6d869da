use anyhow::{anyhow, Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time;

use crate::transcription::MODEL_FILENAME;

pub const DEFAULT_CLOUD_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const APP_NAME: &str = "notescribe-rs";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Cloud,
    Local,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Cloud => "cloud",
            ProviderKind::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloud" | "openai" | "whisper-api" => Ok(ProviderKind::Cloud),
            "local" | "on-device" => Ok(ProviderKind::Local),
            other => Err(anyhow!("unsupported transcription provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub cloud: CloudConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_cloud_model")]
    pub model: String,

    #[serde(default = "default_cloud_endpoint")]
    pub endpoint: String,
}

impl CloudConfig {
    /// The stored key with every whitespace character removed.
    pub fn api_key(&self) -> String {
        self.api_key.chars().filter(|c| !c.is_whitespace()).collect()
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            model: default_cloud_model(),
            endpoint: default_cloud_endpoint(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LocalConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Explicit model file; wins over the models directory.
    #[serde(default)]
    pub model_path: Option<String>,

    #[serde(default)]
    pub model_downloaded: bool,

    #[serde(default)]
    pub models_dir: Option<PathBuf>,
}

impl LocalConfig {
    /// Path the engine would load from, whether or not it exists yet.
    pub fn candidate_model_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.model_path.as_deref() {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        self.models_dir
            .clone()
            .or_else(default_models_dir)
            .map(|dir| dir.join(MODEL_FILENAME))
    }

    /// Candidate path, but only when the file is present on disk.
    pub fn resolve_model_path(&self) -> Option<PathBuf> {
        self.candidate_model_path().filter(|path| path.is_file())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_cloud_model() -> String {
    "whisper-1".to_string()
}

fn default_cloud_endpoint() -> String {
    DEFAULT_CLOUD_ENDPOINT.to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    32
}

pub fn default_models_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("whisper_models"))
}

#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<ConfigManagerInner>,
}

struct ConfigManagerInner {
    config: RwLock<Config>,
    config_path: Option<PathBuf>,
    change_tx: watch::Sender<Config>,
    watcher_active: AtomicBool,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        let config_dir = directories::ProjectDirs::from("", "", APP_NAME)
            .context("Failed to get config directory")?
            .config_dir()
            .to_path_buf();

        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        Self::load_from(config_dir.join("config.jsonc"))
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = path.into();
        let config = if config_path.exists() {
            Self::read_config_from_disk(&config_path)?
        } else {
            let default_config = Config::default();
            Self::write_config_file(&config_path, &default_config)?;
            tracing::info!("Created default config at: {:?}", config_path);
            default_config
        };

        tracing::info!("Loaded config from: {:?}", config_path);
        Ok(Self::build(config, Some(config_path)))
    }

    /// A manager with no backing file; `save` and `start_watching` are no-ops.
    pub fn in_memory(config: Config) -> Self {
        Self::build(config, None)
    }

    fn build(config: Config, config_path: Option<PathBuf>) -> Self {
        let (change_tx, _) = watch::channel(config.clone());
        Self {
            inner: Arc::new(ConfigManagerInner {
                config: RwLock::new(config),
                config_path,
                change_tx,
                watcher_active: AtomicBool::new(false),
            }),
        }
    }

    pub fn start_watching(&self) {
        let Some(config_path) = self.inner.config_path.clone() else {
            return;
        };
        if self.inner.watcher_active.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let mut last_state = Self::file_state(&config_path);
            let mut ticker = time::interval(Duration::from_millis(500));

            loop {
                ticker.tick().await;

                let current_state = Self::file_state(&config_path);
                if current_state == last_state {
                    continue;
                }

                last_state = current_state;

                match Self::read_config_from_disk(&config_path) {
                    Ok(new_config) => {
                        let mut guard = inner.config.write().expect("config lock poisoned");
                        if *guard != new_config {
                            *guard = new_config.clone();
                            drop(guard);

                            if inner.change_tx.send(new_config).is_ok() {
                                tracing::info!("Reloaded config from: {:?}", config_path);
                            }
                        }
                    }
                    Err(err) => {
                        tracing::warn!("Failed to reload config: {err}");
                    }
                }
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.inner.change_tx.subscribe()
    }

    pub fn get(&self) -> Config {
        self.inner
            .config
            .read()
            .expect("config lock poisoned")
            .clone()
    }

    /// Applies an in-memory change and notifies subscribers. Not persisted
    /// until `save`.
    pub fn update(&self, apply: impl FnOnce(&mut Config)) {
        let updated = {
            let mut guard = self.inner.config.write().expect("config lock poisoned");
            apply(&mut guard);
            guard.clone()
        };
        self.inner.change_tx.send_replace(updated);
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = self.inner.config_path.as_deref() else {
            return Ok(());
        };

        let config = self.get();
        Self::write_config_file(path, &config)?;
        tracing::info!("Saved config to: {:?}", path);
        Ok(())
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.inner.config_path.as_deref()
    }

    fn read_config_from_disk(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {:?}", path))?;
        Self::parse_config(&content)
    }

    fn write_config_file(path: &Path, config: &Config) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file at {:?}", path))
    }

    fn parse_config(content: &str) -> Result<Config> {
        let value = parse_to_serde_value(content, &ParseOptions::default())
            .context("Failed to parse config as JSONC")?
            .ok_or_else(|| anyhow!("Config file did not contain a JSON value"))?;
        serde_json::from_value(value).context("Failed to deserialize config")
    }

    fn file_state(path: &Path) -> Option<(SystemTime, u64)> {
        let metadata = fs::metadata(path).ok()?;
        let modified = metadata.modified().ok()?;
        Some((modified, metadata.len()))
    }
}
