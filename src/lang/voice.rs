//! Device voice metadata and the first-match voice selection heuristic.

use super::detect::Language;

// ---------------------------------------------------------------------------
// VoiceDescriptor
// ---------------------------------------------------------------------------

/// Snapshot of one voice offered by the local speech driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceDescriptor {
    /// Identifier passed back to the driver to select this voice.
    pub id: String,
    /// Human-readable name (may include the locale).
    pub display_name: String,
}

impl VoiceDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// `true` when the lower-cased name or id contains any of the language's
    /// voice markers.
    fn matches(&self, language: Language) -> bool {
        let name = self.display_name.to_lowercase();
        let id = self.id.to_lowercase();
        language
            .voice_markers()
            .iter()
            .any(|marker| name.contains(marker) || id.contains(marker))
    }
}

impl std::fmt::Display for VoiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.display_name, self.id)
    }
}

// ---------------------------------------------------------------------------
// select_voice
// ---------------------------------------------------------------------------

/// Pick the first voice in `voices` whose name or id carries a marker for
/// `language`.
///
/// Returns `None` when nothing matches; the caller then keeps the driver's
/// current default voice.  List order decides ties, so the result is
/// deterministic for a fixed snapshot.
pub fn select_voice(language: Language, voices: &[VoiceDescriptor]) -> Option<&VoiceDescriptor> {
    voices.iter().find(|voice| voice.matches(language))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
