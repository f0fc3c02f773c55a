//! Key-to-action bindings for the soundboard.
//!
//! Every physical key maps to at most one [`KeyAction`]; keys without a
//! binding are ignored by the dispatcher.  The default table mirrors the
//! numberpad layout the box ships with, and the config file can override
//! any of it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Fade duration applied when a binding does not specify its own.
pub const DEFAULT_FADE_SECS: f32 = 1.5;

/// Fade-in ceiling applied when a binding does not specify its own.
pub const DEFAULT_VOLUME_PERCENT: u8 = 100;

/// Longest fade a binding may ask for, in seconds.
pub const MAX_FADE_SECS: f32 = 3600.0;

/// A fade is usable when it converts to a [`std::time::Duration`] without
/// panicking: finite, non-negative and within [`MAX_FADE_SECS`].
pub fn fade_is_valid(fade_secs: f32) -> bool {
    fade_secs.is_finite() && (0.0..=MAX_FADE_SECS).contains(&fade_secs)
}

#[derive(Debug, thiserror::Error)]
pub enum KeymapError {
    #[error("unrecognised key name: {0:?}")]
    UnknownKey(String),
    #[error("volume percent {0} out of range 0-100")]
    VolumeOutOfRange(u8),
    #[error("fade of {0} seconds is not between 0 and {MAX_FADE_SECS}")]
    FadeOutOfRange(f32),
}

/// Identifier of a physical key on the input pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyId {
    Char(char),
    Enter,
    Backspace,
}

impl KeyId {
    /// Parse a config-file key name: a single character, or one of the
    /// named keys ("enter", "backspace").
    pub fn parse(name: &str) -> Result<Self, KeymapError> {
        match name {
            "enter" => Ok(KeyId::Enter),
            "backspace" => Ok(KeyId::Backspace),
            s => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(KeyId::Char(c)),
                    _ => Err(KeymapError::UnknownKey(s.to_string())),
                }
            }
        }
    }
}

/// What a key press does.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    PlayTrack {
        /// File name relative to the configured audio directory.
        file: String,
        /// Fade-in ceiling, 0-100.  The actual fade target is the global
        /// volume scaled by this ratio (multiplicative semantics).
        volume_percent: u8,
        fade_secs: f32,
    },
    Stop,
    TogglePause,
    VolumeUp,
    VolumeDown,
    /// Explicitly bound to nothing; the key press is swallowed.
    NoOp,
}

/// One binding as written in the config file.  A bare string is either a
/// reserved action word ("stop", "pause", "volume-up", "volume-down",
/// "none") or a track file name; the table form adds per-track volume/fade
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyBinding {
    Simple(String),
    Track {
        file: String,
        #[serde(default = "default_volume_percent")]
        volume: u8,
        #[serde(default = "default_fade_secs")]
        fade: f32,
    },
}

fn default_volume_percent() -> u8 {
    DEFAULT_VOLUME_PERCENT
}

fn default_fade_secs() -> f32 {
    DEFAULT_FADE_SECS
}

impl KeyBinding {
    fn to_action(&self) -> Result<KeyAction, KeymapError> {
        match self {
            KeyBinding::Simple(word) => Ok(match word.as_str() {
                "stop" => KeyAction::Stop,
                "pause" => KeyAction::TogglePause,
                "volume-up" => KeyAction::VolumeUp,
                "volume-down" => KeyAction::VolumeDown,
                "none" => KeyAction::NoOp,
                file => KeyAction::PlayTrack {
                    file: file.to_string(),
                    volume_percent: DEFAULT_VOLUME_PERCENT,
                    fade_secs: DEFAULT_FADE_SECS,
                },
            }),
            KeyBinding::Track { file, volume, fade } => {
                if *volume > 100 {
                    return Err(KeymapError::VolumeOutOfRange(*volume));
                }
                if !fade_is_valid(*fade) {
                    return Err(KeymapError::FadeOutOfRange(*fade));
                }
                Ok(KeyAction::PlayTrack {
                    file: file.clone(),
                    volume_percent: *volume,
                    fade_secs: *fade,
                })
            }
        }
    }
}

/// The resolved key → action table.
#[derive(Debug, Clone)]
pub struct Keymap {
    actions: HashMap<KeyId, KeyAction>,
}

impl Keymap {
    /// Build a keymap from the config-file binding table.
    pub fn from_bindings(bindings: &BTreeMap<String, KeyBinding>) -> Result<Self, KeymapError> {
        let mut actions = HashMap::new();
        for (name, binding) in bindings {
            actions.insert(KeyId::parse(name)?, binding.to_action()?);
        }
        Ok(Self { actions })
    }

    pub fn lookup(&self, key: &KeyId) -> Option<&KeyAction> {
        self.actions.get(key)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Numberpad layout the box ships with.
pub fn default_bindings() -> BTreeMap<String, KeyBinding> {
    let track = |file: &str| KeyBinding::Simple(file.to_string());
    let mut bindings = BTreeMap::new();
    bindings.insert("0".to_string(), track("battle_music_1.mp3"));
    bindings.insert(".".to_string(), track("battle_music_3.mp3"));
    bindings.insert(",".to_string(), track("battle_music_3.mp3"));
    bindings.insert("1".to_string(), track("forest_sounds_1.mp3"));
    bindings.insert("2".to_string(), track("town_sounds_1.mp3"));
    bindings.insert("3".to_string(), track("tavern_sounds_1.mp3"));
    bindings.insert("4".to_string(), track("cave_sounds_1.m4a"));
    bindings.insert("5".to_string(), track("crowded_bar_1.opus"));
    bindings.insert("6".to_string(), track("orc_grunts.m4a"));
    bindings.insert("7".to_string(), track("holst_neptune.opus"));
    bindings.insert("8".to_string(), track("holst_saturn.opus"));
    bindings.insert("9".to_string(), track("holst_mars.ogg"));
    // The fanfare cuts in fast on purpose.
    bindings.insert(
        "*".to_string(),
        KeyBinding::Track {
            file: "victory_fanfare.m4a".to_string(),
            volume: 100,
            fade: 0.2,
        },
    );
    bindings.insert("enter".to_string(), KeyBinding::Simple("stop".to_string()));
    bindings.insert(
        "backspace".to_string(),
        KeyBinding::Simple("pause".to_string()),
    );
    bindings.insert("-".to_string(), KeyBinding::Simple("volume-down".to_string()));
    bindings.insert("+".to_string(), KeyBinding::Simple("volume-up".to_string()));
    // The numpad divide key sits next to the volume keys; swallow it so a
    // stray press does nothing.
    bindings.insert("/".to_string(), KeyBinding::Simple("none".to_string()));
    bindings
}
