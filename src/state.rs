use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engine::RequestId;

pub const RATE_RANGE: RangeInclusive<f32> = 0.1..=10.0;
pub const PITCH_RANGE: RangeInclusive<f32> = 0.0..=2.0;
pub const VOLUME_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// Where the current speech session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "request", rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Pending(RequestId),
    Speaking(RequestId),
}

impl SessionStatus {
    pub fn is_speaking(&self) -> bool {
        matches!(self, Self::Speaking(_))
    }
}

/// The persisted reading configuration. Every new speech request is built
/// from a snapshot of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<String>,
    pub highlight_enabled: bool,
    pub auto_read: bool,
    #[serde(default)]
    pub shortcuts: ShortcutSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
            highlight_enabled: true,
            auto_read: true,
            shortcuts: ShortcutSettings::default(),
        }
    }
}

impl Settings {
    /// Merge a stored record over the defaults, field by field. Fields that
    /// are missing, mistyped or out of range keep their default.
    pub fn from_stored(value: &Value) -> Self {
        let mut settings = Self::default();
        let Some(fields) = value.as_object() else {
            tracing::warn!("Stored settings are not an object. Using defaults.");
            return settings;
        };

        if let Some(rate) = number_in(fields, "rate", &RATE_RANGE) {
            settings.rate = rate;
        }
        if let Some(pitch) = number_in(fields, "pitch", &PITCH_RANGE) {
            settings.pitch = pitch;
        }
        if let Some(volume) = number_in(fields, "volume", &VOLUME_RANGE) {
            settings.volume = volume;
        }

        match fields.get("voice") {
            Some(Value::String(name)) => settings.voice = normalize_voice(Some(name.clone())),
            Some(Value::Null) | None => {}
            Some(other) => tracing::warn!("Ignoring invalid stored voice: {}", other),
        }

        if let Some(enabled) = flag(fields, "highlightEnabled") {
            settings.highlight_enabled = enabled;
        }
        if let Some(auto_read) = flag(fields, "autoRead") {
            settings.auto_read = auto_read;
        }

        if let Some(raw) = fields.get("shortcuts") {
            match serde_json::from_value::<ShortcutSettings>(raw.clone()) {
                Ok(shortcuts) => settings.shortcuts = shortcuts,
                Err(e) => tracing::warn!("Ignoring invalid stored shortcuts: {}", e),
            }
        }

        settings
    }

    /// Replace every out-of-range field with its default.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !in_range(self.rate, &RATE_RANGE) {
            self.rate = defaults.rate;
        }
        if !in_range(self.pitch, &PITCH_RANGE) {
            self.pitch = defaults.pitch;
        }
        if !in_range(self.volume, &VOLUME_RANGE) {
            self.volume = defaults.volume;
        }
        self.voice = normalize_voice(self.voice);
        self
    }
}

/// The form's "default voice" option carries an empty name.
pub fn normalize_voice(voice: Option<String>) -> Option<String> {
    voice.filter(|name| !name.trim().is_empty())
}

fn in_range(value: f32, range: &RangeInclusive<f32>) -> bool {
    value.is_finite() && range.contains(&value)
}

fn number_in(fields: &Map<String, Value>, key: &str, range: &RangeInclusive<f32>) -> Option<f32> {
    let raw = fields.get(key)?;
    match raw.as_f64().map(|v| v as f32) {
        Some(value) if in_range(value, range) => Some(value),
        _ => {
            tracing::warn!("Ignoring invalid stored value for '{}': {}", key, raw);
            None
        }
    }
}

fn flag(fields: &Map<String, Value>, key: &str) -> Option<bool> {
    let raw = fields.get(key)?;
    let value = raw.as_bool();
    if value.is_none() {
        tracing::warn!("Ignoring invalid stored value for '{}': {}", key, raw);
    }
    value
}

/// Modifier keys that must be held for a shortcut or a settings double click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const ALT_SHIFT: Self = Self {
        ctrl: false,
        shift: true,
        alt: true,
        meta: false,
    };

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Accelerator prefix in the `Ctrl+Alt+Shift+Super+` form.
    pub fn accelerator_prefix(&self) -> String {
        let mut prefix = String::new();
        for (held, name) in [
            (self.ctrl, "Ctrl"),
            (self.alt, "Alt"),
            (self.shift, "Shift"),
            (self.meta, "Super"),
        ] {
            if held {
                prefix.push_str(name);
                prefix.push('+');
            }
        }
        prefix
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShortcutSettings {
    pub modifiers: Modifiers,
    pub open_settings: String,
    pub read_now: String,
    pub stop: String,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            modifiers: Modifiers::ALT_SHIFT,
            open_settings: "S".to_string(),
            read_now: "R".to_string(),
            stop: "C".to_string(),
        }
    }
}

impl ShortcutSettings {
    pub fn accelerator(&self, key: &str) -> String {
        format!("{}{}", self.modifiers.accelerator_prefix(), key.to_uppercase())
    }
}

#[cfg(feature = "desktop")]
pub use desktop::AppState;

#[cfg(feature = "desktop")]
mod desktop {
    use std::sync::{Arc, Mutex};

    use crate::persistence::SettingsStore;
    use crate::platform::Selection;
    use crate::reader::Reader;

    pub struct AppState {
        pub reader: Arc<Reader>,
        pub store: Arc<SettingsStore>,
        /// Last selection reported by the webview.
        pub selection: Arc<Mutex<Option<Selection>>>,
    }
}
