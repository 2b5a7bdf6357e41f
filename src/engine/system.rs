use std::sync::{mpsc, Arc, RwLock};

use anyhow::Result;
use tokio::sync::watch;
use tts::{Features, Tts, UtteranceId};

use super::{
    rescale, EventSink, RequestId, SpeechEvent, SpeechEventKind, SpeechSynthesizer, Utterance, UtteranceTracker, Voice,
};
use crate::error::{SpeechError, SpeechErrorKind};

const WEB_RATE: (f32, f32, f32) = (0.1, 1.0, 10.0);
const WEB_PITCH: (f32, f32, f32) = (0.0, 1.0, 2.0);
const WEB_VOLUME: (f32, f32, f32) = (0.0, 1.0, 1.0);

enum Command {
    Speak {
        request: RequestId,
        utterance: Utterance,
        events: EventSink,
    },
    Cancel,
}

/// The operating system's speech synthesizer, driven from a dedicated thread.
pub struct SystemSynthesizer {
    commands: mpsc::Sender<Command>,
    voices: Arc<RwLock<Vec<Voice>>>,
    voices_changed: Arc<watch::Sender<()>>,
}

impl SystemSynthesizer {
    pub fn spawn() -> Result<Self> {
        let (commands, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let voices = Arc::new(RwLock::new(Vec::new()));
        let voices_changed = Arc::new(watch::channel(()).0);

        let worker_voices = voices.clone();
        let worker_changed = voices_changed.clone();
        std::thread::Builder::new()
            .name("speech-synthesizer".to_string())
            .spawn(move || {
                let tts = match Tts::default() {
                    Ok(tts) => tts,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow::anyhow!("Failed to initialize speech synthesizer: {}", e)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                let mut worker = Worker::new(tts);
                worker.publish_voices(&worker_voices, &worker_changed);
                worker.run(receiver);
            })?;

        ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("Speech synthesizer thread exited during startup"))??;
        tracing::info!("System speech synthesizer ready");

        Ok(Self {
            commands,
            voices,
            voices_changed,
        })
    }
}

impl SpeechSynthesizer for SystemSynthesizer {
    fn speak(&self, request: RequestId, utterance: Utterance, events: EventSink) -> Result<(), SpeechError> {
        self.commands
            .send(Command::Speak {
                request,
                utterance,
                events,
            })
            .map_err(|_| SpeechError::new(SpeechErrorKind::SynthesisUnavailable, "speech thread is gone"))
    }

    fn cancel(&self) {
        let _ = self.commands.send(Command::Cancel);
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.read().map(|v| v.clone()).unwrap_or_default()
    }

    fn voices_changed(&self) -> watch::Receiver<()> {
        self.voices_changed.subscribe()
    }
}

struct Worker {
    tts: Tts,
    features: Features,
    tracker: Arc<UtteranceTracker<UtteranceId>>,
}

impl Worker {
    fn new(tts: Tts) -> Self {
        let features = tts.supported_features();
        let tracker = Arc::new(UtteranceTracker::new());

        if features.utterance_callbacks {
            let on_begin = tracker.clone();
            if let Err(e) = tts.on_utterance_begin(Some(Box::new(move |id| on_begin.begin(&id)))) {
                tracing::warn!("Failed to register utterance begin callback: {}", e);
            }

            let on_end = tracker.clone();
            if let Err(e) = tts.on_utterance_end(Some(Box::new(move |id| on_end.finish(&id, SpeechEventKind::End)))) {
                tracing::warn!("Failed to register utterance end callback: {}", e);
            }

            let on_stop = tracker.clone();
            if let Err(e) = tts.on_utterance_stop(Some(Box::new(move |id| {
                on_stop.finish(&id, SpeechEventKind::Error(SpeechErrorKind::Interrupted))
            }))) {
                tracing::warn!("Failed to register utterance stop callback: {}", e);
            }
        } else {
            tracing::warn!("Speech backend reports no utterance callbacks; start and end of speech will not be observed");
        }

        Self {
            tts,
            features,
            tracker,
        }
    }

    fn publish_voices(&self, voices: &RwLock<Vec<Voice>>, changed: &watch::Sender<()>) {
        let list = match self.tts.voices() {
            Ok(list) => list
                .into_iter()
                .map(|voice| Voice {
                    name: voice.name(),
                    lang: voice.language().to_string(),
                    default: false,
                })
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to list voices: {}", e);
                Vec::new()
            }
        };
        tracing::info!("{} voices available", list.len());
        if let Ok(mut current) = voices.write() {
            *current = list;
        }
        changed.send_replace(());
    }

    fn run(&mut self, receiver: mpsc::Receiver<Command>) {
        for command in receiver {
            match command {
                Command::Speak {
                    request,
                    utterance,
                    events,
                } => self.speak(request, utterance, events),
                Command::Cancel => self.cancel(),
            }
        }
        tracing::debug!("Speech synthesizer thread stopped");
    }

    fn speak(&mut self, request: RequestId, utterance: Utterance, events: EventSink) {
        self.configure(&utterance);
        let tts = &mut self.tts;
        let tracked = if self.features.utterance_callbacks {
            self.tracker
                .submit(request, &events, || tts.speak(utterance.text, true))
        } else {
            tts.speak(utterance.text, true).map(|_| false)
        };

        match tracked {
            Ok(true) => {}
            Ok(false) => {
                // Nothing to observe this utterance by: report it as started and done
                let _ = events.send(SpeechEvent::new(request, SpeechEventKind::Start));
                let _ = events.send(SpeechEvent::new(request, SpeechEventKind::End));
            }
            Err(e) => {
                tracing::warn!("Speech backend rejected request {}: {}", request, e);
                let _ = events.send(SpeechEvent::new(request, SpeechEventKind::Error(classify(&e))));
            }
        }
    }

    fn configure(&mut self, utterance: &Utterance) {
        if self.features.rate {
            let range = (self.tts.min_rate(), self.tts.normal_rate(), self.tts.max_rate());
            if let Err(e) = self.tts.set_rate(rescale(utterance.rate, WEB_RATE, range)) {
                tracing::debug!("Failed to set rate: {}", e);
            }
        }
        if self.features.pitch {
            let range = (self.tts.min_pitch(), self.tts.normal_pitch(), self.tts.max_pitch());
            if let Err(e) = self.tts.set_pitch(rescale(utterance.pitch, WEB_PITCH, range)) {
                tracing::debug!("Failed to set pitch: {}", e);
            }
        }
        if self.features.volume {
            let range = (self.tts.min_volume(), self.tts.normal_volume(), self.tts.max_volume());
            if let Err(e) = self.tts.set_volume(rescale(utterance.volume, WEB_VOLUME, range)) {
                tracing::debug!("Failed to set volume: {}", e);
            }
        }
        if !self.features.voice {
            return;
        }
        let Some(wanted) = &utterance.voice else {
            return;
        };
        match self.tts.voices() {
            Ok(voices) => {
                if let Some(voice) = voices.iter().find(|v| v.name() == wanted.name) {
                    if let Err(e) = self.tts.set_voice(voice) {
                        tracing::debug!("Failed to select voice '{}': {}", wanted.name, e);
                    }
                }
            }
            Err(e) => tracing::debug!("Failed to list voices: {}", e),
        }
    }

    fn cancel(&mut self) {
        if self.features.stop {
            if let Err(e) = self.tts.stop() {
                tracing::debug!("Failed to stop speech: {}", e);
            }
        }
        self.tracker.cancel_all();
    }
}

fn classify(error: &tts::Error) -> SpeechErrorKind {
    match error {
        tts::Error::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => SpeechErrorKind::NotAllowed,
        tts::Error::UnsupportedFeature => SpeechErrorKind::SynthesisUnavailable,
        _ => SpeechErrorKind::SynthesisFailed,
    }
}
