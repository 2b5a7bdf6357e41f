use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a platform utterance failed, using the speech-synthesis error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechErrorKind {
    Canceled,
    Interrupted,
    AudioBusy,
    AudioHardware,
    Network,
    SynthesisUnavailable,
    SynthesisFailed,
    LanguageUnavailable,
    VoiceUnavailable,
    TextTooLong,
    InvalidArgument,
    NotAllowed,
}

impl SpeechErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Interrupted => "interrupted",
            Self::AudioBusy => "audio-busy",
            Self::AudioHardware => "audio-hardware",
            Self::Network => "network",
            Self::SynthesisUnavailable => "synthesis-unavailable",
            Self::SynthesisFailed => "synthesis-failed",
            Self::LanguageUnavailable => "language-unavailable",
            Self::VoiceUnavailable => "voice-unavailable",
            Self::TextTooLong => "text-too-long",
            Self::InvalidArgument => "invalid-argument",
            Self::NotAllowed => "not-allowed",
        }
    }

    /// The user (or the host) has not consented to speech output.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::NotAllowed)
    }

    /// Raised for an utterance that was cut short by a cancel.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::Interrupted)
    }
}

impl fmt::Display for SpeechErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("speech synthesis failed ({kind}): {message}")]
pub struct SpeechError {
    pub kind: SpeechErrorKind,
    pub message: String,
}

impl SpeechError {
    pub fn new(kind: SpeechErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Why a range could not be wrapped in a highlight marker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HighlightError {
    #[error("range spans more than one text node")]
    SpansNodes,

    #[error("range boundary is not a text node")]
    NotText,

    #[error("range node is detached from the document")]
    Detached,

    #[error("range is empty")]
    Empty,

    #[error("range {start}..{end} is out of bounds for text of length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error(transparent)]
    Dom(#[from] DomError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("unknown node {0}")]
    UnknownNode(usize),

    #[error("node {0} cannot have children")]
    NotAnElement(usize),

    #[error("inserting node {0} would create a cycle")]
    Cycle(usize),
}
