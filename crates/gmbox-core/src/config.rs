use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::keymap::{self, KeyBinding};
use crate::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub music: MusicConfig,
    #[serde(default)]
    pub menu: MenuConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Key → binding table; see [`keymap::KeyBinding`] for the value forms.
    #[serde(default = "keymap::default_bindings")]
    pub keys: BTreeMap<String, KeyBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    /// Starting global volume, 0-100.
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    /// Step applied by the volume-up/volume-down keys.
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    /// Fade-out duration when stopping without starting a new track.
    #[serde(default = "default_stop_fade_secs")]
    pub stop_fade_secs: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuConfig {
    /// Button poll interval for the LCD plate, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// User-configurable paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the sound cue files.
    /// Defaults to `~/.local/share/gmbox/audio`.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            volume_step: default_volume_step(),
            stop_fade_secs: default_stop_fade_secs(),
        }
    }
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
        }
    }
}

fn default_volume() -> u8 {
    100
}

fn default_volume_step() -> u8 {
    10
}

fn default_stop_fade_secs() -> f32 {
    keymap::DEFAULT_FADE_SECS
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_audio_dir() -> PathBuf {
    platform::default_audio_dir()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            music: MusicConfig::default(),
            menu: MenuConfig::default(),
            paths: PathsConfig::default(),
            keys: keymap::default_bindings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::Keymap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.music.default_volume, 100);
        assert_eq!(config.music.volume_step, 10);
        assert_eq!(config.music.stop_fade_secs, 1.5);
        assert!(config.paths.audio_dir.ends_with("gmbox/audio"));
        assert!(!config.keys.is_empty());
    }

    #[test]
    fn test_default_keys_build_a_keymap() {
        let config = Config::default();
        let keymap = Keymap::from_bindings(&config.keys).unwrap();
        assert!(keymap.len() >= 16);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.music.volume_step, config.music.volume_step);
        assert_eq!(back.keys.len(), config.keys.len());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [music]
            default_volume = 60

            [keys]
            "1" = "drums.mp3"
            "9" = { file = "storm.ogg", volume = 80, fade = 3.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.music.default_volume, 60);
        assert_eq!(config.music.volume_step, 10);
        assert_eq!(config.keys.len(), 2);
        let keymap = Keymap::from_bindings(&config.keys).unwrap();
        match keymap.lookup(&crate::keymap::KeyId::Char('9')) {
            Some(crate::keymap::KeyAction::PlayTrack {
                volume_percent,
                fade_secs,
                ..
            }) => {
                assert_eq!(*volume_percent, 80);
                assert_eq!(*fade_secs, 3.0);
            }
            other => panic!("unexpected binding for '9': {:?}", other),
        }
    }
}
