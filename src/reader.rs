use std::sync::Arc;

use crate::controller::{SpeechController, Trigger};
use crate::engine::RequestId;
use crate::hotkey::{self, HotkeyAction, KeyEvent, PointerEvent};
use crate::message::{Message, Response};
use crate::persistence::SettingsStore;
use crate::platform::TextSelector;
use crate::state::Settings;

/// Routes host triggers (selection, keys, clicks, messages) to the speech
/// controller.
pub struct Reader {
    controller: Arc<SpeechController>,
    selector: Arc<dyn TextSelector>,
    store: Arc<SettingsStore>,
}

impl Reader {
    pub fn new(controller: Arc<SpeechController>, selector: Arc<dyn TextSelector>, store: Arc<SettingsStore>) -> Self {
        Self {
            controller,
            selector,
            store,
        }
    }

    pub fn controller(&self) -> &Arc<SpeechController> {
        &self.controller
    }

    /// A selection drag was released.
    pub fn on_selection_changed(&self) -> Option<RequestId> {
        self.read_selection(Trigger::Selection)
    }

    /// Read the current selection regardless of the auto-read setting.
    pub fn read_now(&self) -> Option<RequestId> {
        self.read_selection(Trigger::Explicit)
    }

    fn read_selection(&self, trigger: Trigger) -> Option<RequestId> {
        if !self.selector.is_supported() {
            tracing::warn!("Reading the selection is not supported by this host");
            return None;
        }
        match self.selector.get_selection() {
            Ok(Some(selection)) => self.controller.request_read(trigger, &selection.text, selection.range),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read the selection: {:#}", e);
                None
            }
        }
    }

    pub fn stop(&self) {
        self.controller.stop();
    }

    /// Run the shortcut bound to `event`. `OpenSettings` is returned for the
    /// host to act on.
    pub fn on_key(&self, event: &KeyEvent) -> Option<HotkeyAction> {
        let action = hotkey::match_key(&self.controller.settings().shortcuts, event)?;
        self.perform(action);
        Some(action)
    }

    pub fn on_pointer(&self, event: &PointerEvent) -> Option<HotkeyAction> {
        hotkey::match_pointer(&self.controller.settings().shortcuts, event)
    }

    pub fn perform(&self, action: HotkeyAction) {
        tracing::debug!("Hotkey action {:?}", action);
        match action {
            HotkeyAction::ReadNow => {
                self.read_now();
            }
            HotkeyAction::Stop => self.stop(),
            HotkeyAction::OpenSettings => {}
        }
    }

    pub async fn handle_message(&self, message: Message) -> Option<Response> {
        tracing::debug!("Message {:?}", message);
        match message {
            Message::ReadSelection => {
                self.read_now();
                None
            }
            Message::StopReading => {
                self.stop();
                None
            }
            Message::GetVoices => Some(Response::Voices {
                voices: self.controller.list_voices().await,
            }),
        }
    }

    pub fn settings(&self) -> Settings {
        self.controller.settings()
    }

    /// Persist `settings` and use them from now on.
    pub fn save_settings(&self, settings: Settings) -> Settings {
        self.controller.save_settings(&self.store, settings);
        self.controller.settings()
    }

    pub fn store(&self) -> &SettingsStore {
        &self.store
    }
}
