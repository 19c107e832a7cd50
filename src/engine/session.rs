//! Cancellation token and the per-call playback session.
//!
//! A [`PlaybackSession`] is created for every accepted speak call.  The
//! engine keeps the only strong reference that outlives the call; callers
//! never own a session, they only reach its [`CancelToken`] through
//! `SpeechEngine::stop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::SpeechBackend;
use super::state::SessionState;

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Shared cancellation flag.
///
/// Cheap to clone; every clone observes the same flag.  Once set it stays
/// set for the lifetime of the session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// PlaybackSession
// ---------------------------------------------------------------------------

/// One in-flight synthesis + playback operation.
pub struct PlaybackSession {
    id: u64,
    cancel: CancelToken,
    state: Mutex<SessionState>,
    /// Backend currently executing an attempt, so `stop` can halt it.
    active: Mutex<Option<Arc<dyn SpeechBackend>>>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    /// Create a session that is already `Running` with a fresh token.
    pub fn start(id: u64) -> Self {
        Self {
            id,
            cancel: CancelToken::new(),
            state: Mutex::new(SessionState::Running),
            active: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Record `backend` as the one to halt on stop.
    pub(crate) fn begin_attempt(&self, backend: Arc<dyn SpeechBackend>) {
        *lock(&self.active) = Some(backend);
    }

    pub(crate) fn end_attempt(&self) {
        lock(&self.active).take();
    }

    /// Set the cancellation flag, move `Running → Stopping` and halt the
    /// active backend.  No effect on a session that is not running.
    ///
    /// Returns `true` if this call initiated the stop.
    pub fn request_stop(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if *state != SessionState::Running {
                return false;
            }
            self.cancel.cancel();
            *state = SessionState::Stopping;
        }

        // Halt outside the state lock; backends may block briefly.
        let active = lock(&self.active).clone();
        if let Some(backend) = active {
            log::debug!("session {}: halting {} backend", self.id, backend.name());
            backend.halt();
        }
        true
    }

    /// Move into the terminal state once every backend call has returned.
    ///
    /// A stopped session always ends `Completed`, as does a successful one.
    /// Calling this on an already terminal session leaves it unchanged.
    pub(crate) fn finish(&self, success: bool) -> SessionState {
        let mut state = lock(&self.state);
        if state.is_terminal() {
            return *state;
        }
        *state = if success || *state == SessionState::Stopping || self.cancel.is_cancelled() {
            SessionState::Completed
        } else {
            SessionState::Failed
        };
        *state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::MockBackend;

    #[test]
    fn token_clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn new_session_is_running_and_not_cancelled() {
        let session = PlaybackSession::start(1);
        assert_eq!(session.state(), SessionState::Running);
        assert!(!session.is_cancelled());
        assert_eq!(session.id(), 1);
    }

    #[test]
    fn stop_moves_to_stopping_and_halts_active_backend() {
        let session = PlaybackSession::start(1);
        let backend = Arc::new(MockBackend::succeeding("offline"));
        session.begin_attempt(backend.clone());

        assert!(session.request_stop());
        assert_eq!(session.state(), SessionState::Stopping);
        assert!(session.is_cancelled());
        assert_eq!(backend.halt_count(), 1);
    }

    #[test]
    fn second_stop_is_a_no_op() {
        let session = PlaybackSession::start(1);
        let backend = Arc::new(MockBackend::succeeding("offline"));
        session.begin_attempt(backend.clone());

        assert!(session.request_stop());
        assert!(!session.request_stop());
        assert_eq!(backend.halt_count(), 1);
    }

    #[test]
    fn stop_without_active_backend_still_cancels() {
        let session = PlaybackSession::start(1);
        assert!(session.request_stop());
        assert!(session.is_cancelled());
    }

    #[test]
    fn stopped_session_finishes_completed() {
        let session = PlaybackSession::start(1);
        session.request_stop();
        assert_eq!(session.finish(false), SessionState::Completed);
    }

    #[test]
    fn failed_session_finishes_failed() {
        let session = PlaybackSession::start(1);
        assert_eq!(session.finish(false), SessionState::Failed);
    }

    #[test]
    fn finish_is_sticky() {
        let session = PlaybackSession::start(1);
        assert_eq!(session.finish(true), SessionState::Completed);
        assert_eq!(session.finish(false), SessionState::Completed);
        assert!(!session.request_stop());
    }

    #[test]
    fn end_attempt_clears_active_backend() {
        let session = PlaybackSession::start(1);
        let backend = Arc::new(MockBackend::succeeding("online"));
        session.begin_attempt(backend.clone());
        session.end_attempt();
        session.request_stop();
        assert_eq!(backend.halt_count(), 0);
    }
}
