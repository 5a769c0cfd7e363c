use anyhow::{Context, Result};
use dirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::player::PlayerBackend;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_backend")]
    pub player_backend: String,

    #[serde(default = "default_speed")]
    pub default_speed: f32,

    /// Per-media network cache handed to the MPV engine
    #[serde(default = "default_network_caching_ms")]
    pub network_caching_ms: u64,

    /// Grace period before MPV starts playing a freshly loaded item
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,

    #[serde(default = "default_screen_height")]
    pub screen_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    #[serde(default = "default_thumbnail_width")]
    pub max_width: u32,

    #[serde(default = "default_thumbnail_timeout_ms")]
    pub timeout_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Read the config at `path`, writing defaults there when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading config from {:?}", path);
            let contents = fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            info!("Config loaded successfully");
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).context("Failed to write config file")?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn backend(&self) -> PlayerBackend {
        PlayerBackend::from(self.playback.player_backend.as_str())
    }

    pub fn set_backend(&mut self, backend: PlayerBackend) -> Result<()> {
        self.playback.player_backend = backend.as_str().to_string();
        self.save()
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join("dualplay").join("config.toml"))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player_backend: default_backend(),
            default_speed: default_speed(),
            network_caching_ms: default_network_caching_ms(),
            start_delay_ms: default_start_delay_ms(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: default_thumbnail_width(),
            timeout_ms: default_thumbnail_timeout_ms(),
        }
    }
}

// Default value functions
fn default_backend() -> String { PlayerBackend::default().as_str().to_string() }
fn default_speed() -> f32 { 1.0 }
fn default_network_caching_ms() -> u64 { 1000 }
fn default_start_delay_ms() -> u64 { 100 }
fn default_screen_width() -> u32 { 1920 }
fn default_screen_height() -> u32 { 1080 }
fn default_thumbnail_width() -> u32 { 320 }
fn default_thumbnail_timeout_ms() -> u64 { 5000 }
