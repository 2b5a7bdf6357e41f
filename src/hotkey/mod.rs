#[cfg(feature = "desktop")]
pub mod global;

use serde::{Deserialize, Serialize};

use crate::state::{Modifiers, ShortcutSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotkeyAction {
    OpenSettings,
    ReadNow,
    Stop,
}

/// A key press as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    #[serde(default)]
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: &str, modifiers: Modifiers) -> Self {
        Self {
            key: key.to_string(),
            modifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub clicks: u32,
    #[serde(default)]
    pub modifiers: Modifiers,
}

/// The action bound to `event`, if any.
///
/// The held modifiers must equal the configured combination exactly. Keys
/// compare case-insensitively: with Shift in the combination a layout may
/// report either case for the same physical key.
pub fn match_key(shortcuts: &ShortcutSettings, event: &KeyEvent) -> Option<HotkeyAction> {
    if shortcuts.modifiers.is_empty() || event.modifiers != shortcuts.modifiers {
        return None;
    }
    [
        (&shortcuts.open_settings, HotkeyAction::OpenSettings),
        (&shortcuts.read_now, HotkeyAction::ReadNow),
        (&shortcuts.stop, HotkeyAction::Stop),
    ]
    .into_iter()
    .find(|(key, _)| !key.is_empty() && key.eq_ignore_ascii_case(&event.key))
    .map(|(_, action)| action)
}

/// Double click while holding the shortcut modifiers opens the settings.
pub fn match_pointer(shortcuts: &ShortcutSettings, event: &PointerEvent) -> Option<HotkeyAction> {
    (event.clicks == 2 && !shortcuts.modifiers.is_empty() && event.modifiers == shortcuts.modifiers)
        .then_some(HotkeyAction::OpenSettings)
}

/// Human-readable label for an accelerator, e.g. `Alt+Shift+R` → `⌥⇧R` on macOS.
pub fn shortcut_display_label(accelerator: &str) -> String {
    if !cfg!(target_os = "macos") {
        return accelerator.to_string();
    }
    accelerator
        .split('+')
        .map(|part| match part {
            "Ctrl" => "⌃",
            "Alt" => "⌥",
            "Shift" => "⇧",
            "Super" | "Cmd" => "⌘",
            key => key,
        })
        .collect()
}
