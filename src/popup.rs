//! Form model shared by the settings panel and the popup: voice options,
//! slider values and the draft settings they edit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::controller::SpeechController;
use crate::engine::Voice;
use crate::message::Message;
use crate::persistence::SettingsStore;
use crate::state::{normalize_voice, Settings, PITCH_RANGE, RATE_RANGE, VOLUME_RANGE};

pub const DEFAULT_VOICE_LABEL: &str = "Use default voice";
pub const SAVED_MESSAGE: &str = "Settings saved!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceGroup {
    /// Primary language subtag, e.g. `en`
    pub lang: String,
    pub label: String,
    pub voices: Vec<VoiceOption>,
}

/// Display name of a primary language subtag; unknown codes come back as is.
pub fn language_name(code: &str) -> &str {
    match code {
        "zh" => "Chinese",
        "en" => "English",
        "ja" => "Japanese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "ru" => "Russian",
        "pt" => "Portuguese",
        "ar" => "Arabic",
        "hi" => "Hindi",
        other => other,
    }
}

/// Group voices by primary language, groups sorted by language code and
/// voices kept in platform order.
pub fn group_voices(voices: &[Voice], selected: Option<&str>) -> Vec<VoiceGroup> {
    let mut groups: BTreeMap<&str, Vec<VoiceOption>> = BTreeMap::new();
    for voice in voices {
        let lang = voice.lang.split('-').next().unwrap_or_default();
        groups.entry(lang).or_default().push(VoiceOption {
            value: voice.name.clone(),
            label: format!("{} ({})", voice.name, voice.lang),
            selected: selected == Some(voice.name.as_str()),
        });
    }
    groups
        .into_iter()
        .map(|(lang, voices)| VoiceGroup {
            lang: lang.to_string(),
            label: language_name(lang).to_string(),
            voices,
        })
        .collect()
}

pub fn voice_summary(count: usize) -> String {
    match count {
        0 => "No available voices found".to_string(),
        1 => "Found 1 available voice".to_string(),
        n => format!("Found {} available voices", n),
    }
}

/// Slider readout, one decimal.
pub fn display_value(value: f32) -> String {
    format!("{:.1}", value)
}

/// One edit coming from a form control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum FormInput {
    Rate(f32),
    Pitch(f32),
    Volume(f32),
    Voice(String),
    HighlightEnabled(bool),
    AutoRead(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormButton {
    Save,
    ReadSelected,
    StopReading,
}

impl FormButton {
    /// Message sent to the reading surface, if the button sends one.
    pub fn message(&self) -> Option<Message> {
        match self {
            Self::Save => None,
            Self::ReadSelected => Some(Message::ReadSelection),
            Self::StopReading => Some(Message::StopReading),
        }
    }
}

/// Draft settings bound 1:1 to form controls. Edits stay in the draft until
/// saved.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsForm {
    draft: Settings,
}

impl SettingsForm {
    pub fn open(controller: &SpeechController) -> Self {
        Self {
            draft: controller.settings(),
        }
    }

    pub fn from_settings(settings: Settings) -> Self {
        Self { draft: settings }
    }

    pub fn draft(&self) -> &Settings {
        &self.draft
    }

    pub fn apply(&mut self, input: FormInput) {
        let clamp = |value: f32, range: &std::ops::RangeInclusive<f32>, fallback: f32| {
            if value.is_finite() {
                value.clamp(*range.start(), *range.end())
            } else {
                fallback
            }
        };
        match input {
            FormInput::Rate(value) => self.draft.rate = clamp(value, &RATE_RANGE, self.draft.rate),
            FormInput::Pitch(value) => self.draft.pitch = clamp(value, &PITCH_RANGE, self.draft.pitch),
            FormInput::Volume(value) => self.draft.volume = clamp(value, &VOLUME_RANGE, self.draft.volume),
            FormInput::Voice(name) => self.draft.voice = normalize_voice(Some(name)),
            FormInput::HighlightEnabled(enabled) => self.draft.highlight_enabled = enabled,
            FormInput::AutoRead(enabled) => self.draft.auto_read = enabled,
        }
    }

    /// Readouts for the rate, pitch and volume sliders.
    pub fn readouts(&self) -> [(&'static str, String); 3] {
        [
            ("rate", display_value(self.draft.rate)),
            ("pitch", display_value(self.draft.pitch)),
            ("volume", display_value(self.draft.volume)),
        ]
    }

    /// Voice select contents: the default option followed by the groups.
    pub fn voice_options(&self, voices: &[Voice]) -> (VoiceOption, Vec<VoiceGroup>) {
        let default = VoiceOption {
            value: String::new(),
            label: DEFAULT_VOICE_LABEL.to_string(),
            selected: self.draft.voice.is_none(),
        };
        (default, group_voices(voices, self.draft.voice.as_deref()))
    }

    /// Apply and persist the draft; returns the confirmation to show.
    pub fn save(&self, controller: &SpeechController, store: &SettingsStore) -> &'static str {
        controller.save_settings(store, self.draft.clone());
        SAVED_MESSAGE
    }
}
