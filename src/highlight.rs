use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dom::TextRange;
use crate::error::HighlightError;

/// How long a highlight stays on the text being spoken.
pub const HIGHLIGHT_DURATION: Duration = Duration::from_secs(1);

/// Handle to one applied highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HighlightToken(u64);

impl HighlightToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Surface able to mark a text range as "being read".
///
/// Removal is best effort: an unknown token, or a marker the page has since
/// detached, is silently skipped.
pub trait Highlighter: Send + Sync {
    fn apply(&self, range: &TextRange) -> Result<HighlightToken, HighlightError>;
    fn remove(&self, token: HighlightToken);
}

/// Used when the host has nothing to highlight on.
pub struct NoopHighlighter;

impl Highlighter for NoopHighlighter {
    fn apply(&self, _range: &TextRange) -> Result<HighlightToken, HighlightError> {
        Ok(HighlightToken::new(0))
    }

    fn remove(&self, _token: HighlightToken) {}
}
