use anyhow::{Context, Result};
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_global_shortcut::{GlobalShortcutExt, ShortcutState};

use super::{HotkeyAction, KeyEvent};
use crate::state::{AppState, ShortcutSettings};

/// Replace every registered shortcut with the ones in `shortcuts`.
pub fn register_shortcuts(app_handle: &AppHandle, shortcuts: &ShortcutSettings) -> Result<()> {
    let manager = app_handle.global_shortcut();
    manager.unregister_all()?;

    for key in [&shortcuts.open_settings, &shortcuts.read_now, &shortcuts.stop] {
        if key.is_empty() {
            continue;
        }
        let accelerator = shortcuts.accelerator(key);
        let event = KeyEvent::new(key, shortcuts.modifiers);
        manager
            .on_shortcut(accelerator.as_str(), move |app, _shortcut, state| {
                // Only act on key press, ignore release
                if state.state == ShortcutState::Pressed {
                    handle_key(app, &event);
                }
            })
            .with_context(|| format!("Failed to register shortcut {}", accelerator))?;
        tracing::info!("Registered {}", accelerator);
    }

    Ok(())
}

/// Run the binding for `event` against the current settings.
pub fn handle_key(app_handle: &AppHandle, event: &KeyEvent) {
    let reader = app_handle.state::<AppState>().reader.clone();
    if reader.on_key(event) == Some(HotkeyAction::OpenSettings) {
        show_settings(app_handle);
    }
}

pub fn show_settings(app_handle: &AppHandle) {
    if let Some(window) = app_handle.get_webview_window("main") {
        let _ = window.show();
        let _ = window.set_focus();
    }
    let _ = app_handle.emit("open-settings", ());
}
