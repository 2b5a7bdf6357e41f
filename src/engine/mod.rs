#[cfg(feature = "desktop")]
pub mod system;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::{SpeechError, SpeechErrorKind};
use crate::lock;

/// Sequence number tagging one speech request and its platform events.
pub type RequestId = u64;

/// Channel the platform uses to report utterance lifecycle events.
pub type EventSink = mpsc::UnboundedSender<SpeechEvent>;

/// A voice offered by the platform synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP 47 language tag, e.g. `en-US`
    pub lang: String,
    #[serde(default)]
    pub default: bool,
}

/// One discrete playback request handed to the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    /// `None` lets the platform pick its default voice.
    pub voice: Option<Voice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEventKind {
    Start,
    End,
    Error(SpeechErrorKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechEvent {
    pub request: RequestId,
    pub kind: SpeechEventKind,
}

impl SpeechEvent {
    pub fn new(request: RequestId, kind: SpeechEventKind) -> Self {
        Self { request, kind }
    }
}

/// Platform speech capability.
///
/// `speak` hands an utterance over and returns; progress is reported on the
/// event sink, tagged with `request`. A cancelled utterance may still report
/// a trailing `End` or `Error` afterwards.
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, request: RequestId, utterance: Utterance, events: EventSink) -> Result<(), SpeechError>;

    /// Drop the current and any queued utterance. Safe to call when idle.
    fn cancel(&self);

    /// Current snapshot of available voices; may be empty until the platform
    /// has finished enumerating them.
    fn voices(&self) -> Vec<Voice>;

    /// Signals every time the voice list changes.
    fn voices_changed(&self) -> watch::Receiver<()>;
}

/// Ties platform utterance ids to the request they belong to, turning
/// platform callbacks into [`SpeechEvent`]s.
pub struct UtteranceTracker<K> {
    pending: Mutex<HashMap<K, (RequestId, EventSink)>>,
}

impl<K> Default for UtteranceTracker<K> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash> UtteranceTracker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand an utterance over with `speak` and track the id it returns.
    ///
    /// The map stays locked while `speak` runs: a callback fired from another
    /// thread before the id is recorded waits for it. Returns `false` when
    /// the platform gave no id to track.
    pub fn submit<E>(
        &self,
        request: RequestId,
        events: &EventSink,
        speak: impl FnOnce() -> Result<Option<K>, E>,
    ) -> Result<bool, E> {
        let mut pending = lock(&self.pending);
        match speak()? {
            Some(id) => {
                pending.insert(id, (request, events.clone()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The platform began speaking `id`.
    pub fn begin(&self, id: &K) {
        if let Some((request, events)) = lock(&self.pending).get(id) {
            let _ = events.send(SpeechEvent::new(*request, SpeechEventKind::Start));
        }
    }

    /// `id` is over; `kind` is `End` or the error it stopped with.
    pub fn finish(&self, id: &K, kind: SpeechEventKind) {
        let entry = lock(&self.pending).remove(id);
        if let Some((request, events)) = entry {
            let _ = events.send(SpeechEvent::new(request, kind));
        }
    }

    /// Report every tracked utterance as canceled and forget it.
    pub fn cancel_all(&self) {
        let cancelled: Vec<_> = lock(&self.pending).drain().map(|(_, entry)| entry).collect();
        for (request, events) in cancelled {
            let _ = events.send(SpeechEvent::new(
                request,
                SpeechEventKind::Error(SpeechErrorKind::Canceled),
            ));
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact-name lookup; an unknown or unset name resolves to the platform default.
pub fn resolve_voice(voices: &[Voice], name: Option<&str>) -> Option<Voice> {
    let name = name?;
    let found = voices.iter().find(|voice| voice.name == name).cloned();
    if found.is_none() {
        tracing::debug!("Voice '{}' not available, using platform default", name);
    }
    found
}

/// Map `value` from a (min, normal, max) scale onto another, piecewise
/// linearly so that normal maps to normal.
pub fn rescale(value: f32, from: (f32, f32, f32), to: (f32, f32, f32)) -> f32 {
    let (from_min, from_normal, from_max) = from;
    let (to_min, to_normal, to_max) = to;
    let value = value.clamp(from_min, from_max);
    let scaled = if value <= from_normal {
        let span = from_normal - from_min;
        if span <= f32::EPSILON {
            to_normal
        } else {
            to_min + (to_normal - to_min) * (value - from_min) / span
        }
    } else {
        let span = from_max - from_normal;
        if span <= f32::EPSILON {
            to_normal
        } else {
            to_normal + (to_max - to_normal) * (value - from_normal) / span
        }
    };
    scaled.clamp(to_min.min(to_max), to_min.max(to_max))
}
