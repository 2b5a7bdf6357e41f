use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tauri::{AppHandle, Emitter};
use tauri_plugin_notification::NotificationExt;

use super::{Notifier, Selection, TextSelector};
use crate::dom::TextRange;
use crate::error::HighlightError;
use crate::highlight::{HighlightToken, Highlighter};
use crate::lock;

/// Asks the webview to wrap (and later unwrap) the range being read.
pub struct WebviewHighlighter {
    app_handle: AppHandle,
    next_token: AtomicU64,
}

impl WebviewHighlighter {
    pub fn new(app_handle: AppHandle) -> Self {
        Self {
            app_handle,
            next_token: AtomicU64::new(0),
        }
    }
}

impl Highlighter for WebviewHighlighter {
    fn apply(&self, range: &TextRange) -> Result<HighlightToken, HighlightError> {
        if range.start.node != range.end.node {
            return Err(HighlightError::SpansNodes);
        }
        if range.start.offset >= range.end.offset {
            return Err(HighlightError::Empty);
        }
        let token = HighlightToken::new(self.next_token.fetch_add(1, Ordering::Relaxed) + 1);
        if let Err(e) = self.app_handle.emit(
            "highlight-apply",
            serde_json::json!({ "token": token, "range": range }),
        ) {
            tracing::debug!("Failed to emit highlight-apply: {}", e);
        }
        Ok(token)
    }

    fn remove(&self, token: HighlightToken) {
        if let Err(e) = self
            .app_handle
            .emit("highlight-remove", serde_json::json!({ "token": token }))
        {
            tracing::debug!("Failed to emit highlight-remove: {}", e);
        }
    }
}

/// Serves the selection most recently reported by the webview.
pub struct WebviewSelector {
    selection: Arc<Mutex<Option<Selection>>>,
}

impl WebviewSelector {
    pub fn new(selection: Arc<Mutex<Option<Selection>>>) -> Self {
        Self { selection }
    }
}

impl TextSelector for WebviewSelector {
    fn get_selection(&self) -> Result<Option<Selection>> {
        Ok(lock(&self.selection).clone())
    }

    fn is_supported(&self) -> bool {
        true
    }
}

/// System notification plus an in-app notice the user has to dismiss.
pub struct AppNotifier {
    app_handle: AppHandle,
}

impl AppNotifier {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl Notifier for AppNotifier {
    fn blocking_notice(&self, message: &str) {
        if let Err(e) = self
            .app_handle
            .notification()
            .builder()
            .title("Read Anything")
            .body(message)
            .show()
        {
            tracing::warn!("Failed to show notification: {}", e);
        }
        crate::hotkey::global::show_settings(&self.app_handle);
        let _ = self
            .app_handle
            .emit("permission-notice", serde_json::json!({ "message": message }));
    }
}
