#[cfg(feature = "desktop")]
mod desktop;
#[cfg(feature = "desktop")]
pub use desktop::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::dom::TextRange;

/// Text currently selected by the user, with the range it came from when
/// the host can locate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub text: String,
    #[serde(default)]
    pub range: Option<TextRange>,
}

pub trait TextSelector: Send + Sync {
    fn get_selection(&self) -> Result<Option<Selection>>;
    fn is_supported(&self) -> bool;
}

/// Surfaces messages the user has to acknowledge.
pub trait Notifier: Send + Sync {
    fn blocking_notice(&self, message: &str);
}

/// Notifier for hosts without a UI: the notice only reaches the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn blocking_notice(&self, message: &str) {
        tracing::warn!("{}", message);
    }
}
