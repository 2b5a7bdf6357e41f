use tauri::{AppHandle, Manager};

use crate::controller::Trigger;
use crate::engine::{RequestId, Voice};
use crate::hotkey::{HotkeyAction, PointerEvent};
use crate::lock;
use crate::message::{Message, Response};
use crate::platform::Selection;
use crate::state::{AppState, SessionStatus};

/// Tauri command: the webview's selection changed (or was cleared)
#[tauri::command]
pub fn report_selection(app_handle: AppHandle, selection: Option<Selection>) -> Result<(), String> {
    let state = app_handle.state::<AppState>();
    *lock(&state.selection) = selection;
    Ok(())
}

/// Tauri command: a selection drag was released; reads it when auto-read is on
#[tauri::command]
pub fn read_selection(app_handle: AppHandle, selection: Selection) -> Result<Option<RequestId>, String> {
    let state = app_handle.state::<AppState>();
    *lock(&state.selection) = Some(selection);
    Ok(state.reader.on_selection_changed())
}

/// Tauri command: read the current selection now
#[tauri::command]
pub fn speak_selected_text(app_handle: AppHandle) -> Result<Option<RequestId>, String> {
    let state = app_handle.state::<AppState>();
    Ok(state.reader.read_now())
}

#[tauri::command]
pub fn speak_text(app_handle: AppHandle, text: String) -> Result<Option<RequestId>, String> {
    let state = app_handle.state::<AppState>();
    Ok(state.reader.controller().request_read(Trigger::Explicit, &text, None))
}

#[tauri::command]
pub fn stop_speaking(app_handle: AppHandle) -> Result<(), String> {
    let state = app_handle.state::<AppState>();
    state.reader.stop();
    Ok(())
}

#[tauri::command]
pub async fn get_voices(app_handle: AppHandle) -> Result<Vec<Voice>, String> {
    let reader = app_handle.state::<AppState>().reader.clone();
    Ok(reader.controller().list_voices().await)
}

/// Tauri command: popup → reading surface message
#[tauri::command]
pub async fn send_message(app_handle: AppHandle, message: Message) -> Result<Option<Response>, String> {
    let reader = app_handle.state::<AppState>().reader.clone();
    Ok(reader.handle_message(message).await)
}

/// Tauri command: pointer click inside the reading panel
#[tauri::command]
pub fn pointer_event(app_handle: AppHandle, event: PointerEvent) -> Result<Option<HotkeyAction>, String> {
    let state = app_handle.state::<AppState>();
    let action = state.reader.on_pointer(&event);
    if action == Some(HotkeyAction::OpenSettings) {
        crate::hotkey::global::show_settings(&app_handle);
    }
    Ok(action)
}

#[tauri::command]
pub fn get_status(app_handle: AppHandle) -> Result<SessionStatus, String> {
    let state = app_handle.state::<AppState>();
    Ok(state.reader.controller().status())
}
