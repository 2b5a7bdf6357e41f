use serde::Serialize;
use tauri::{AppHandle, Manager};

use crate::hotkey;
use crate::popup::{voice_summary, SettingsForm, VoiceGroup, VoiceOption};
use crate::state::{AppState, Settings};

#[derive(Debug, Serialize)]
pub struct VoicePicker {
    pub default_option: VoiceOption,
    pub groups: Vec<VoiceGroup>,
    pub summary: String,
}

#[tauri::command]
pub fn get_settings(app_handle: AppHandle) -> Result<Settings, String> {
    let state = app_handle.state::<AppState>();
    Ok(state.reader.settings())
}

/// Tauri command: persist the form and re-register the shortcuts
#[tauri::command]
pub fn save_settings(app_handle: AppHandle, settings: Settings) -> Result<Settings, String> {
    let state = app_handle.state::<AppState>();
    let previous = state.reader.settings().shortcuts;
    let saved = state.reader.save_settings(settings);

    if saved.shortcuts != previous {
        hotkey::global::register_shortcuts(&app_handle, &saved.shortcuts).map_err(|e| format!("{:#}", e))?;
    }
    Ok(saved)
}

#[tauri::command]
pub async fn get_voice_picker(app_handle: AppHandle) -> Result<VoicePicker, String> {
    let reader = app_handle.state::<AppState>().reader.clone();
    let voices = reader.controller().list_voices().await;
    let form = SettingsForm::open(reader.controller());
    let (default_option, groups) = form.voice_options(&voices);
    Ok(VoicePicker {
        default_option,
        groups,
        summary: voice_summary(voices.len()),
    })
}

#[tauri::command]
pub fn get_shortcut_labels(app_handle: AppHandle) -> Result<Vec<(String, String)>, String> {
    let state = app_handle.state::<AppState>();
    let shortcuts = state.reader.settings().shortcuts;
    Ok([
        ("open_settings", &shortcuts.open_settings),
        ("read_now", &shortcuts.read_now),
        ("stop", &shortcuts.stop),
    ]
    .into_iter()
    .map(|(action, key)| {
        (
            action.to_string(),
            hotkey::shortcut_display_label(&shortcuts.accelerator(key)),
        )
    })
    .collect())
}

#[tauri::command]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
