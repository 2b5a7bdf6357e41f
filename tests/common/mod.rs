//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use read_anything_lib::controller::{EventPump, SpeechController};
use read_anything_lib::dom::TextRange;
use read_anything_lib::engine::{EventSink, RequestId, SpeechEvent, SpeechEventKind, SpeechSynthesizer, Utterance, Voice};
use read_anything_lib::error::{HighlightError, SpeechError, SpeechErrorKind};
use read_anything_lib::highlight::{HighlightToken, Highlighter};
use read_anything_lib::platform::Notifier;
use read_anything_lib::state::Settings;
use tokio::sync::watch;

// ── Synthesizer ────────────────────────────────────────────────────

/// Records what it was asked to say. Lifecycle events are only produced
/// when a test calls [`FakeSynth::emit`].
pub struct FakeSynth {
    pub spoken: Mutex<Vec<(RequestId, Utterance)>>,
    pub cancels: Mutex<usize>,
    sink: Mutex<Option<EventSink>>,
    voices: Mutex<Vec<Voice>>,
    voices_changed: watch::Sender<()>,
    reject_with: Mutex<Option<SpeechErrorKind>>,
}

impl FakeSynth {
    pub fn new(voices: Vec<Voice>) -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
            sink: Mutex::new(None),
            voices: Mutex::new(voices),
            voices_changed: watch::channel(()).0,
            reject_with: Mutex::new(None),
        })
    }

    pub fn emit(&self, request: RequestId, kind: SpeechEventKind) {
        let sink = self.sink.lock().unwrap();
        sink.as_ref()
            .expect("nothing was spoken yet")
            .send(SpeechEvent::new(request, kind))
            .unwrap();
    }

    /// Make the next `speak` calls fail synchronously.
    pub fn reject(&self, kind: SpeechErrorKind) {
        *self.reject_with.lock().unwrap() = Some(kind);
    }

    pub fn announce_voices(&self, voices: Vec<Voice>) {
        *self.voices.lock().unwrap() = voices;
        self.voices_changed.send_replace(());
    }

    pub fn last_utterance(&self) -> Utterance {
        self.spoken.lock().unwrap().last().expect("nothing spoken").1.clone()
    }

    pub fn spoken_count(&self) -> usize {
        self.spoken.lock().unwrap().len()
    }

    pub fn cancel_count(&self) -> usize {
        *self.cancels.lock().unwrap()
    }
}

impl SpeechSynthesizer for FakeSynth {
    fn speak(&self, request: RequestId, utterance: Utterance, events: EventSink) -> Result<(), SpeechError> {
        if let Some(kind) = *self.reject_with.lock().unwrap() {
            return Err(SpeechError::new(kind, "rejected by fake"));
        }
        self.spoken.lock().unwrap().push((request, utterance));
        *self.sink.lock().unwrap() = Some(events);
        Ok(())
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().unwrap().clone()
    }

    fn voices_changed(&self) -> watch::Receiver<()> {
        self.voices_changed.subscribe()
    }
}

// ── Highlighter / notifier ─────────────────────────────────────────

#[derive(Default)]
pub struct RecordingHighlighter {
    pub applied: Mutex<Vec<TextRange>>,
    pub removed: Mutex<Vec<HighlightToken>>,
    pub fail: Mutex<bool>,
    next: Mutex<u64>,
}

impl RecordingHighlighter {
    pub fn failing() -> Self {
        Self {
            fail: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.lock().unwrap().len()
    }
}

impl Highlighter for RecordingHighlighter {
    fn apply(&self, range: &TextRange) -> Result<HighlightToken, HighlightError> {
        if *self.fail.lock().unwrap() {
            return Err(HighlightError::SpansNodes);
        }
        self.applied.lock().unwrap().push(*range);
        let mut next = self.next.lock().unwrap();
        *next += 1;
        Ok(HighlightToken::new(*next))
    }

    fn remove(&self, token: HighlightToken) {
        self.removed.lock().unwrap().push(token);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn blocking_notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

// ── Harness ────────────────────────────────────────────────────────

pub struct Harness {
    pub controller: Arc<SpeechController>,
    pub synth: Arc<FakeSynth>,
    pub highlighter: Arc<RecordingHighlighter>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Build a controller over fresh fakes and start its event pump.
pub fn harness(settings: Settings) -> Harness {
    harness_with(settings, FakeSynth::new(Vec::new()), RecordingHighlighter::default())
}

pub fn harness_with(settings: Settings, synth: Arc<FakeSynth>, highlighter: RecordingHighlighter) -> Harness {
    let highlighter = Arc::new(highlighter);
    let notifier = Arc::new(RecordingNotifier::default());
    let (controller, pump) = SpeechController::new(settings, synth.clone(), highlighter.clone(), notifier.clone());
    spawn_pump(pump);
    Harness {
        controller,
        synth,
        highlighter,
        notifier,
    }
}

fn spawn_pump(pump: EventPump) {
    tokio::spawn(pump.run());
}

/// Let the event pump deliver everything queued so far.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn voice(name: &str, lang: &str) -> Voice {
    Voice {
        name: name.to_string(),
        lang: lang.to_string(),
        default: false,
    }
}
