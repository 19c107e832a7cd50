//! Plain data carried by the speech engine: configuration snapshot,
//! availability flags, per-call request, session states and outcomes.

use crate::lang::{detect_language, Language};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Rate and volume applied to every synthesis attempt.
///
/// Volume is clamped into `[0.0, 1.0]` whenever it is written, so readers
/// never need to re-check it.  Rate is stored exactly as given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    rate: i32,
    volume: f32,
}

impl EngineConfig {
    pub fn new(rate: i32, volume: f32) -> Self {
        Self {
            rate,
            volume: clamp_volume(volume),
        }
    }

    /// Words per minute.
    pub fn rate(&self) -> i32 {
        self.rate
    }

    /// Output level in `[0.0, 1.0]`.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_rate(&mut self, rate: i32) {
        self.rate = rate;
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(200, 0.9)
    }
}

/// NaN collapses to silence rather than leaking through the clamp.
fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// EngineAvailability
// ---------------------------------------------------------------------------

/// Which backends the engine may route to.
///
/// Computed at construction.  `offline_ready` can later drop to `false` if
/// the local driver fails unrecoverably; neither flag is ever raised again
/// without building a new engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineAvailability {
    pub offline_ready: bool,
    pub online_ready: bool,
}

impl EngineAvailability {
    /// `true` when at least one backend can be attempted.
    pub fn any(&self) -> bool {
        self.offline_ready || self.online_ready
    }
}

// ---------------------------------------------------------------------------
// SpeechRequest
// ---------------------------------------------------------------------------

/// One call to the engine's speak operation, frozen at call start.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub rate: i32,
    pub volume: f32,
    pub force_online: bool,
}

impl SpeechRequest {
    /// Build a request from the caller's text and the current config
    /// snapshot.  Returns `None` when `text` is empty after trimming.
    pub fn new(text: &str, config: EngineConfig, force_online: bool) -> Option<Self> {
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            text: text.to_string(),
            rate: config.rate(),
            volume: config.volume(),
            force_online,
        })
    }

    pub fn language(&self) -> Language {
        detect_language(&self.text)
    }

    /// The rate/volume pair backends receive.
    pub fn settings(&self) -> EngineConfig {
        EngineConfig::new(self.rate, self.volume)
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of one playback session.
///
/// ```text
/// Idle ──speak──▶ Running ──backend ok──────────▶ Completed
///                         ──all backends failed─▶ Failed
///                         ──stop──▶ Stopping ──backend returns──▶ Completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
    Completed,
    Failed,
}

impl SessionState {
    /// `true` once the session has released its resources.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Running => "Running",
            SessionState::Stopping => "Stopping",
            SessionState::Completed => "Completed",
            SessionState::Failed => "Failed",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Idle
    }
}

// ---------------------------------------------------------------------------
// SpeakOutcome
// ---------------------------------------------------------------------------

/// Detailed result of a speak call.  Collaborators that only need a yes/no
/// answer use [`SpeakOutcome::is_success`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// A backend confirmed playback finished.
    Completed,
    /// Every attempted backend failed.
    Failed,
    /// `stop()` was observed before playback finished.
    Cancelled,
    /// Another session was already running; nothing was started.
    Busy,
    /// The text was empty after trimming; no backend was touched.
    InvalidInput,
}

impl SpeakOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SpeakOutcome::Completed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_clamped_on_construction() {
        assert_eq!(EngineConfig::new(200, 2.0).volume(), 1.0);
        assert_eq!(EngineConfig::new(200, -0.5).volume(), 0.0);
        assert_eq!(EngineConfig::new(200, f32::NAN).volume(), 0.0);
    }

    #[test]
    fn volume_clamped_on_write() {
        let mut cfg = EngineConfig::default();
        cfg.set_volume(7.5);
        assert_eq!(cfg.volume(), 1.0);
        cfg.set_volume(0.25);
        assert_eq!(cfg.volume(), 0.25);
    }

    #[test]
    fn rate_is_stored_verbatim() {
        let mut cfg = EngineConfig::new(-100, 0.5);
        assert_eq!(cfg.rate(), -100);
        cfg.set_rate(10_000);
        assert_eq!(cfg.rate(), 10_000);
    }

    #[test]
    fn defaults_match_constructor_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.rate(), 200);
        assert!((cfg.volume() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn blank_text_has_no_request() {
        assert!(SpeechRequest::new("", EngineConfig::default(), false).is_none());
        assert!(SpeechRequest::new("   \n\t", EngineConfig::default(), true).is_none());
    }

    #[test]
    fn request_keeps_original_text_and_snapshot() {
        let req = SpeechRequest::new("  你好  ", EngineConfig::new(150, 0.4), true).unwrap();
        assert_eq!(req.text, "  你好  ");
        assert_eq!(req.rate, 150);
        assert!((req.volume - 0.4).abs() < f32::EPSILON);
        assert!(req.force_online);
        assert_eq!(req.language(), Language::Zh);
    }

    #[test]
    fn session_state_predicates() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn only_completed_is_success() {
        assert!(SpeakOutcome::Completed.is_success());
        assert!(!SpeakOutcome::Failed.is_success());
        assert!(!SpeakOutcome::Cancelled.is_success());
        assert!(!SpeakOutcome::Busy.is_success());
        assert!(!SpeakOutcome::InvalidInput.is_success());
    }

    #[test]
    fn availability_any() {
        let none = EngineAvailability {
            offline_ready: false,
            online_ready: false,
        };
        assert!(!none.any());
        let online = EngineAvailability {
            offline_ready: false,
            online_ready: true,
        };
        assert!(online.any());
    }
}
