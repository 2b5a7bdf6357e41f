//! Integration tests for the speech session controller.
//!
//! The controller is driven through a fake synthesizer whose lifecycle
//! events are emitted by hand, so every ordering (stale callbacks, trailing
//! events after cancel, errors) can be reproduced deterministically. Time is
//! paused, which makes the highlight timer observable without waiting.

mod common;

use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{harness, harness_with, settle, voice, FakeSynth, RecordingHighlighter, RecordingNotifier};
use read_anything_lib::controller::{SpeechController, Trigger, PERMISSION_NOTICE};
use read_anything_lib::dom::{Document, TextRange};
use read_anything_lib::engine::{EventSink, RequestId, SpeechEventKind, SpeechSynthesizer, Utterance, Voice};
use read_anything_lib::error::{SpeechError, SpeechErrorKind};
use read_anything_lib::state::{SessionStatus, Settings};
use tokio::sync::watch;

fn sample_range() -> TextRange {
    let mut doc = Document::new();
    let text = doc.create_text("Hello world");
    TextRange::within(text, 0, 11)
}

// ── Request lifecycle ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reads_with_default_settings_and_highlights_for_one_second() {
    let h = harness(Settings::default());
    let range = sample_range();

    let id = h
        .controller
        .request_read(Trigger::Selection, "Hello world", Some(range))
        .expect("request issued");

    let utterance = h.synth.last_utterance();
    assert_eq!(utterance.text, "Hello world");
    assert_eq!((utterance.rate, utterance.pitch, utterance.volume), (1.0, 1.0, 1.0));
    assert_eq!(utterance.voice, None);
    assert_eq!(h.controller.status(), SessionStatus::Pending(id));

    h.synth.emit(id, SpeechEventKind::Start);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Speaking(id));
    assert_eq!(*h.highlighter.applied.lock().unwrap(), vec![range]);
    assert_eq!(h.controller.live_highlights(), 1);

    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(h.highlighter.removed_count(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.highlighter.removed_count(), 1);
    assert_eq!(h.controller.live_highlights(), 0);

    h.synth.emit(id, SpeechEventKind::End);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn selection_text_is_trimmed() {
    let h = harness(Settings::default());

    h.controller.request_read(Trigger::Selection, "  \n Hello  \t", None);

    assert_eq!(h.synth.last_utterance().text, "Hello");
}

#[tokio::test(start_paused = true)]
async fn blank_text_is_a_no_op() {
    let h = harness(Settings::default());

    assert_eq!(h.controller.request_read(Trigger::Selection, "", None), None);
    assert_eq!(h.controller.request_read(Trigger::Explicit, "   \n\t ", None), None);

    assert_eq!(h.synth.spoken_count(), 0);
    assert_eq!(h.synth.cancel_count(), 0);
    assert_eq!(h.controller.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn new_request_cancels_before_speaking() {
    let h = harness(Settings::default());

    h.controller.request_read(Trigger::Explicit, "one", None);
    assert_eq!(h.synth.cancel_count(), 1);
    assert_eq!(h.synth.spoken_count(), 1);

    h.controller.request_read(Trigger::Explicit, "two", None);
    assert_eq!(h.synth.cancel_count(), 2);
    assert_eq!(h.synth.spoken_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_events_of_a_superseded_request_are_discarded() {
    let h = harness(Settings::default());

    let a = h.controller.request_read(Trigger::Explicit, "A", Some(sample_range())).unwrap();
    let b = h.controller.request_read(Trigger::Explicit, "B", Some(sample_range())).unwrap();
    assert!(b > a);

    // Trailing callbacks for A after it was cancelled
    h.synth.emit(a, SpeechEventKind::Start);
    h.synth.emit(a, SpeechEventKind::Error(SpeechErrorKind::Interrupted));
    h.synth.emit(a, SpeechEventKind::End);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Pending(b));
    assert_eq!(h.highlighter.applied_count(), 0);

    h.synth.emit(b, SpeechEventKind::Start);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Speaking(b));
    assert_eq!(h.highlighter.applied_count(), 1);

    h.synth.emit(b, SpeechEventKind::End);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn duplicate_start_does_not_highlight_twice() {
    let h = harness(Settings::default());
    let id = h.controller.request_read(Trigger::Explicit, "Hi", Some(sample_range())).unwrap();

    h.synth.emit(id, SpeechEventKind::Start);
    h.synth.emit(id, SpeechEventKind::Start);
    settle().await;

    assert_eq!(h.highlighter.applied_count(), 1);
}

// ── Settings gates ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn auto_read_off_gates_selection_but_not_explicit_requests() {
    let settings = Settings {
        auto_read: false,
        ..Settings::default()
    };
    let h = harness(settings);

    assert_eq!(h.controller.request_read(Trigger::Selection, "Hello", None), None);
    assert_eq!(h.synth.spoken_count(), 0);

    assert!(h.controller.request_read(Trigger::Explicit, "Hello", None).is_some());
    assert_eq!(h.synth.spoken_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn highlight_disabled_skips_highlighting() {
    let settings = Settings {
        highlight_enabled: false,
        ..Settings::default()
    };
    let h = harness(settings);
    let id = h.controller.request_read(Trigger::Explicit, "Hello", Some(sample_range())).unwrap();

    h.synth.emit(id, SpeechEventKind::Start);
    settle().await;

    assert_eq!(h.highlighter.applied_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn settings_apply_to_the_next_request_only() {
    let h = harness(Settings::default());
    h.controller.request_read(Trigger::Explicit, "first", None);

    h.controller.apply_settings(Settings {
        rate: 2.5,
        pitch: 0.5,
        volume: 0.3,
        ..Settings::default()
    });
    assert_eq!(h.synth.spoken.lock().unwrap()[0].1.rate, 1.0);

    h.controller.request_read(Trigger::Explicit, "second", None);
    let utterance = h.synth.last_utterance();
    assert_eq!((utterance.rate, utterance.pitch, utterance.volume), (2.5, 0.5, 0.3));
}

#[tokio::test(start_paused = true)]
async fn out_of_range_settings_fall_back_to_defaults() {
    let h = harness(Settings {
        rate: 50.0,
        pitch: -1.0,
        volume: 3.0,
        ..Settings::default()
    });

    h.controller.request_read(Trigger::Explicit, "loud", None);

    let utterance = h.synth.last_utterance();
    assert_eq!((utterance.rate, utterance.pitch, utterance.volume), (1.0, 1.0, 1.0));
}

// ── Voices ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn configured_voice_is_used_when_available() {
    let synth = FakeSynth::new(vec![voice("Alice", "en-US"), voice("Amélie", "fr-FR")]);
    let settings = Settings {
        voice: Some("Amélie".to_string()),
        ..Settings::default()
    };
    let h = harness_with(settings, synth, RecordingHighlighter::default());

    h.controller.request_read(Trigger::Explicit, "Bonjour", None);

    assert_eq!(h.synth.last_utterance().voice, Some(voice("Amélie", "fr-FR")));
}

#[tokio::test(start_paused = true)]
async fn unknown_voice_falls_back_to_platform_default() {
    let synth = FakeSynth::new(vec![voice("Alice", "en-US")]);
    let settings = Settings {
        voice: Some("Nobody".to_string()),
        ..Settings::default()
    };
    let h = harness_with(settings, synth, RecordingHighlighter::default());

    assert!(h.controller.request_read(Trigger::Explicit, "Hello", None).is_some());

    assert_eq!(h.synth.last_utterance().voice, None);
}

#[tokio::test(start_paused = true)]
async fn list_voices_returns_the_current_list() {
    let synth = FakeSynth::new(vec![voice("Alice", "en-US")]);
    let h = harness_with(Settings::default(), synth, RecordingHighlighter::default());

    assert_eq!(h.controller.list_voices().await, vec![voice("Alice", "en-US")]);
}

#[tokio::test(start_paused = true)]
async fn list_voices_waits_for_the_platform_to_announce_them() {
    let h = harness(Settings::default());
    let synth = h.synth.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        synth.announce_voices(vec![voice("Bob", "en-GB")]);
    });

    assert_eq!(h.controller.list_voices().await, vec![voice("Bob", "en-GB")]);
}

#[tokio::test(start_paused = true)]
async fn list_voices_gives_up_with_an_empty_list() {
    let h = harness(Settings::default());
    let started = tokio::time::Instant::now();

    let voices = h.controller.list_voices().await;

    assert!(voices.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(2));
}

// ── Stop / shutdown ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stop_when_idle_changes_nothing() {
    let h = harness(Settings::default());

    h.controller.stop();
    h.controller.stop();

    assert_eq!(h.controller.status(), SessionStatus::Idle);
    assert_eq!(h.synth.spoken_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_the_trailing_events_of_the_cancelled_request() {
    let h = harness(Settings::default());
    let id = h.controller.request_read(Trigger::Explicit, "Hello", Some(sample_range())).unwrap();

    h.controller.stop();
    assert_eq!(h.controller.status(), SessionStatus::Idle);

    h.synth.emit(id, SpeechEventKind::Start);
    h.synth.emit(id, SpeechEventKind::Error(SpeechErrorKind::Canceled));
    settle().await;

    assert_eq!(h.controller.status(), SessionStatus::Idle);
    assert_eq!(h.highlighter.applied_count(), 0);
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_removes_the_highlight_immediately() {
    let h = harness(Settings::default());
    let id = h.controller.request_read(Trigger::Explicit, "Hello", Some(sample_range())).unwrap();
    h.synth.emit(id, SpeechEventKind::Start);
    settle().await;
    assert_eq!(h.controller.live_highlights(), 1);

    h.controller.shutdown();

    assert_eq!(h.highlighter.removed_count(), 1);
    assert_eq!(h.controller.live_highlights(), 0);
    assert_eq!(h.controller.status(), SessionStatus::Idle);

    // The pending timer must not remove it a second time
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.highlighter.removed_count(), 1);
}

// ── Errors ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn permission_error_shows_a_notice() {
    let h = harness(Settings::default());
    let id = h.controller.request_read(Trigger::Explicit, "Hello", None).unwrap();

    h.synth.emit(id, SpeechEventKind::Error(SpeechErrorKind::NotAllowed));
    settle().await;

    assert_eq!(*h.notifier.notices.lock().unwrap(), vec![PERMISSION_NOTICE.to_string()]);
    assert_eq!(h.controller.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn other_errors_are_only_logged() {
    let h = harness(Settings::default());

    for kind in [
        SpeechErrorKind::SynthesisFailed,
        SpeechErrorKind::Interrupted,
        SpeechErrorKind::Canceled,
        SpeechErrorKind::Network,
    ] {
        let id = h.controller.request_read(Trigger::Explicit, "Hello", None).unwrap();
        h.synth.emit(id, SpeechEventKind::Error(kind));
        settle().await;
        assert_eq!(h.controller.status(), SessionStatus::Idle);
    }

    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_speak_goes_through_the_error_path() {
    let h = harness(Settings::default());
    h.synth.reject(SpeechErrorKind::NotAllowed);

    let id = h.controller.request_read(Trigger::Explicit, "Hello", None);

    assert!(id.is_some());
    assert_eq!(h.notifier.count(), 1);
    assert_eq!(h.controller.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn highlight_failure_does_not_abort_speech() {
    let h = harness_with(Settings::default(), FakeSynth::new(Vec::new()), RecordingHighlighter::failing());
    let id = h.controller.request_read(Trigger::Explicit, "Hello", Some(sample_range())).unwrap();

    h.synth.emit(id, SpeechEventKind::Start);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Speaking(id));
    assert_eq!(h.controller.live_highlights(), 0);

    h.synth.emit(id, SpeechEventKind::End);
    settle().await;
    assert_eq!(h.controller.status(), SessionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn status_changes_are_broadcast() {
    let h = harness(Settings::default());
    let mut status = h.controller.subscribe_status();

    let id = h.controller.request_read(Trigger::Explicit, "Hello", None).unwrap();
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), SessionStatus::Pending(id));

    h.synth.emit(id, SpeechEventKind::Start);
    settle().await;
    assert_eq!(*status.borrow_and_update(), SessionStatus::Speaking(id));
}

// ── Concurrent triggers ────────────────────────────────────────────

/// Synthesizer whose first `cancel` stalls for a while, giving a second
/// trigger on another thread the chance to slip in between.
struct StallingSynth {
    speak_order: Mutex<Vec<RequestId>>,
    calls: Mutex<Vec<String>>,
    stalled: Mutex<bool>,
    cancel_entered: Mutex<Option<std_mpsc::Sender<()>>>,
    spoke: Mutex<std_mpsc::Sender<RequestId>>,
    spoke_rx: Mutex<std_mpsc::Receiver<RequestId>>,
    voices_changed: watch::Sender<()>,
}

impl StallingSynth {
    fn new(cancel_entered: std_mpsc::Sender<()>) -> Arc<Self> {
        let (spoke, spoke_rx) = std_mpsc::channel();
        Arc::new(Self {
            speak_order: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            stalled: Mutex::new(false),
            cancel_entered: Mutex::new(Some(cancel_entered)),
            spoke: Mutex::new(spoke),
            spoke_rx: Mutex::new(spoke_rx),
            voices_changed: watch::channel(()).0,
        })
    }
}

impl SpeechSynthesizer for StallingSynth {
    fn speak(&self, request: RequestId, _utterance: Utterance, _events: EventSink) -> Result<(), SpeechError> {
        self.speak_order.lock().unwrap().push(request);
        self.calls.lock().unwrap().push(format!("speak {}", request));
        let _ = self.spoke.lock().unwrap().send(request);
        Ok(())
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push("cancel".to_string());
        let first = !std::mem::replace(&mut *self.stalled.lock().unwrap(), true);
        if !first {
            return;
        }
        if let Some(entered) = self.cancel_entered.lock().unwrap().take() {
            let _ = entered.send(());
        }
        // Give the other trigger up to 300ms to reach the platform first
        let _ = self.spoke_rx.lock().unwrap().recv_timeout(Duration::from_millis(300));
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    fn voices_changed(&self) -> watch::Receiver<()> {
        self.voices_changed.subscribe()
    }
}

#[test]
fn concurrent_triggers_reach_the_platform_in_request_order() {
    let (entered_tx, entered_rx) = std_mpsc::channel();
    let synth = StallingSynth::new(entered_tx);
    let (controller, _pump) = SpeechController::new(
        Settings::default(),
        synth.clone(),
        Arc::new(RecordingHighlighter::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let first = {
        let controller = controller.clone();
        std::thread::spawn(move || controller.request_read(Trigger::Explicit, "A", None))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let b = controller.request_read(Trigger::Explicit, "B", None).unwrap();
    let a = first.join().unwrap().unwrap();

    assert!(b > a);
    assert_eq!(*synth.speak_order.lock().unwrap(), vec![a, b]);
    assert_eq!(controller.status(), SessionStatus::Pending(b));
}

#[test]
fn stop_racing_a_request_leaves_nothing_audible() {
    let (entered_tx, entered_rx) = std_mpsc::channel();
    let synth = StallingSynth::new(entered_tx);
    let (controller, _pump) = SpeechController::new(
        Settings::default(),
        synth.clone(),
        Arc::new(RecordingHighlighter::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let reader = {
        let controller = controller.clone();
        std::thread::spawn(move || controller.request_read(Trigger::Explicit, "A", None))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    controller.stop();
    reader.join().unwrap();

    // The stop came second, so its cancel is the last thing the platform sees
    assert_eq!(*synth.calls.lock().unwrap(), vec!["cancel", "speak 1", "cancel"]);
    assert_eq!(controller.status(), SessionStatus::Idle);
}
