use serde::{Deserialize, Serialize};

use crate::engine::Voice;

/// Commands exchanged between the popup and the reading surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    ReadSelection,
    StopReading,
    GetVoices,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Voices { voices: Vec<Voice> },
}
