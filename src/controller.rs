//! Speech session controller: turns read triggers into at most one active
//! utterance, configured from the current settings, and keeps the reading
//! highlight in step with it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::dom::TextRange;
use crate::engine::{
    resolve_voice, EventSink, RequestId, SpeechEvent, SpeechEventKind, SpeechSynthesizer, Utterance, Voice,
};
use crate::highlight::{HighlightToken, Highlighter, HIGHLIGHT_DURATION};
use crate::lock;
use crate::persistence::SettingsStore;
use crate::platform::Notifier;
use crate::state::{SessionStatus, Settings};

/// Upper bound on waiting for the platform to enumerate its voices.
pub const VOICES_READY_TIMEOUT: Duration = Duration::from_secs(2);

pub const PERMISSION_NOTICE: &str =
    "Speech was blocked because permission to play audio was denied. Allow speech output and try again.";

/// Where a read request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A passive text selection; honored only while auto-read is on.
    Selection,
    /// A shortcut, button or message the user invoked on purpose.
    Explicit,
}

#[derive(Debug, Clone)]
struct ActiveRequest {
    id: RequestId,
    range: Option<TextRange>,
    highlight: bool,
    started: bool,
}

#[derive(Debug, Default)]
struct Session {
    latest: RequestId,
    active: Option<ActiveRequest>,
}

pub struct SpeechController {
    synth: Arc<dyn SpeechSynthesizer>,
    highlighter: Arc<dyn Highlighter>,
    notifier: Arc<dyn Notifier>,
    settings: Mutex<Settings>,
    /// Serializes issuing and stopping so the platform sees requests in id order.
    issue: Mutex<()>,
    session: Mutex<Session>,
    live_highlights: Arc<Mutex<HashSet<HighlightToken>>>,
    events: EventSink,
    status: watch::Sender<SessionStatus>,
}

/// Feeds platform lifecycle events into the controller. Spawn [`EventPump::run`]
/// on the async runtime once the controller is built.
pub struct EventPump {
    controller: Weak<SpeechController>,
    events: mpsc::UnboundedReceiver<SpeechEvent>,
}

impl EventPump {
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            let Some(controller) = self.controller.upgrade() else {
                break;
            };
            controller.handle_event(event);
        }
        tracing::debug!("Speech event pump stopped");
    }
}

impl SpeechController {
    pub fn new(
        settings: Settings,
        synth: Arc<dyn SpeechSynthesizer>,
        highlighter: Arc<dyn Highlighter>,
        notifier: Arc<dyn Notifier>,
    ) -> (Arc<Self>, EventPump) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(SessionStatus::Idle);
        let controller = Arc::new(Self {
            synth,
            highlighter,
            notifier,
            settings: Mutex::new(settings.sanitized()),
            issue: Mutex::new(()),
            session: Mutex::new(Session::default()),
            live_highlights: Arc::new(Mutex::new(HashSet::new())),
            events,
            status,
        });
        let pump = EventPump {
            controller: Arc::downgrade(&controller),
            events: receiver,
        };
        (controller, pump)
    }

    pub fn settings(&self) -> Settings {
        lock(&self.settings).clone()
    }

    /// Use `settings` for every request issued from now on.
    pub fn apply_settings(&self, settings: Settings) {
        *lock(&self.settings) = settings.sanitized();
        tracing::info!("Settings updated");
    }

    /// The explicit save action: apply, then persist.
    pub fn save_settings(&self, store: &SettingsStore, settings: Settings) {
        let settings = settings.sanitized();
        store.save(&settings);
        *lock(&self.settings) = settings;
        tracing::info!("Settings saved");
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Read `text` aloud, replacing whatever is being read.
    ///
    /// Returns the id of the issued request, or `None` when nothing was
    /// issued: a passive selection while auto-read is off, or blank text.
    pub fn request_read(&self, trigger: Trigger, text: &str, range: Option<TextRange>) -> Option<RequestId> {
        let settings = self.settings();
        if trigger == Trigger::Selection && !settings.auto_read {
            tracing::debug!("Auto-read is off, ignoring selection");
            return None;
        }
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let voice = resolve_voice(&self.synth.voices(), settings.voice.as_deref());
        let utterance = Utterance {
            text: text.to_string(),
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
            voice,
        };

        let (id, accepted) = {
            let _issue = lock(&self.issue);
            let id = {
                let mut session = lock(&self.session);
                session.latest += 1;
                session.active = Some(ActiveRequest {
                    id: session.latest,
                    range,
                    highlight: settings.highlight_enabled,
                    started: false,
                });
                self.status.send_replace(SessionStatus::Pending(session.latest));
                session.latest
            };

            self.synth.cancel();
            tracing::info!("Reading request {} ({} chars)", id, text.chars().count());
            (id, self.synth.speak(id, utterance, self.events.clone()))
        };

        if let Err(e) = accepted {
            tracing::warn!("Speech request {} was not accepted: {}", id, e);
            self.handle_event(SpeechEvent::new(id, SpeechEventKind::Error(e.kind)));
        }
        Some(id)
    }

    /// Cancel any active or queued speech. Does nothing when idle.
    pub fn stop(&self) {
        let _issue = lock(&self.issue);
        {
            let mut session = lock(&self.session);
            if let Some(active) = session.active.take() {
                session.latest += 1;
                self.status.send_replace(SessionStatus::Idle);
                tracing::info!("Stopped reading request {}", active.id);
            }
        }
        self.synth.cancel();
    }

    /// Teardown: stop reading and take every highlight down now.
    pub fn shutdown(&self) {
        self.stop();
        let tokens: Vec<HighlightToken> = lock(&self.live_highlights).drain().collect();
        for token in tokens {
            self.highlighter.remove(token);
        }
    }

    /// Voices offered by the platform. When the list is still empty, waits
    /// (bounded) for the platform to announce it.
    pub async fn list_voices(&self) -> Vec<Voice> {
        let mut changed = self.synth.voices_changed();
        let voices = self.synth.voices();
        if !voices.is_empty() {
            return voices;
        }

        tracing::debug!("Voice list empty, waiting for the platform");
        match tokio::time::timeout(VOICES_READY_TIMEOUT, changed.changed()).await {
            Ok(Ok(())) => self.synth.voices(),
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                tracing::warn!("No voices announced within {:?}", VOICES_READY_TIMEOUT);
                Vec::new()
            }
        }
    }

    /// Apply one platform lifecycle event. Events of superseded requests
    /// are discarded.
    pub fn handle_event(&self, event: SpeechEvent) {
        let active = {
            let mut session = lock(&self.session);
            if event.request != session.latest {
                tracing::debug!(
                    "Discarding {:?} of stale request {} (latest is {})",
                    event.kind,
                    event.request,
                    session.latest
                );
                return;
            }

            match event.kind {
                SpeechEventKind::Start => match session.active.as_mut() {
                    Some(active) if !active.started => {
                        active.started = true;
                        self.status.send_replace(SessionStatus::Speaking(active.id));
                        active.clone()
                    }
                    _ => return,
                },
                SpeechEventKind::End | SpeechEventKind::Error(_) => match session.active.take() {
                    Some(active) => {
                        self.status.send_replace(SessionStatus::Idle);
                        active
                    }
                    None => return,
                },
            }
        };

        match event.kind {
            SpeechEventKind::Start => {
                tracing::debug!("Request {} started speaking", active.id);
                if active.highlight {
                    if let Some(range) = active.range {
                        self.apply_highlight(&range);
                    }
                }
            }
            SpeechEventKind::End => {
                tracing::info!("Finished reading request {}", active.id);
            }
            SpeechEventKind::Error(kind) if kind.is_permission_denied() => {
                tracing::warn!("Speech request {} was not allowed", active.id);
                self.notifier.blocking_notice(PERMISSION_NOTICE);
            }
            SpeechEventKind::Error(kind) if kind.is_cancellation() => {
                tracing::debug!("Speech request {} ended: {}", active.id, kind);
            }
            SpeechEventKind::Error(kind) => {
                tracing::warn!("Speech request {} failed: {}", active.id, kind);
            }
        }
    }

    fn apply_highlight(&self, range: &TextRange) {
        let token = match self.highlighter.apply(range) {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!("Skipping highlight: {}", e);
                return;
            }
        };
        lock(&self.live_highlights).insert(token);

        let highlighter = self.highlighter.clone();
        let live = self.live_highlights.clone();
        let remove = async move {
            tokio::time::sleep(HIGHLIGHT_DURATION).await;
            if lock(&live).remove(&token) {
                highlighter.remove(token);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(remove);
            }
            Err(_) => {
                tracing::debug!("No async runtime for the highlight timer, removing it now");
                if lock(&self.live_highlights).remove(&token) {
                    self.highlighter.remove(token);
                }
            }
        }
    }

    /// Highlights still waiting for their removal timer.
    pub fn live_highlights(&self) -> usize {
        lock(&self.live_highlights).len()
    }
}
