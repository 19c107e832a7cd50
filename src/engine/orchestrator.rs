//! Speech engine orchestrator: validation, single-session admission,
//! offline → online fallback and the stop protocol.
//!
//! # Speak flow
//!
//! ```text
//! speak(text, force_online)
//!   ├─ blank text                        → InvalidInput (nothing touched)
//!   ├─ another session Running           → Busy
//!   └─ spawn_blocking(run_session)       [Running]
//!         ├─ force_online / offline down → online            → Completed | Failed
//!         └─ offline ok                  → Completed
//!            offline failed              → online            → Completed | Failed
//!
//! stop()  → cancel flag + halt active backend   [Stopping → Completed]
//! ```
//!
//! The backend attempts run on a blocking thread so the caller's task (a UI
//! event loop or an interactive shell) stays free to call [`SpeechEngine::stop`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::offline::OfflineBackend;
use crate::online::OnlineBackend;

use super::backend::SpeechBackend;
use super::session::{lock, PlaybackSession};
use super::state::{EngineAvailability, EngineConfig, SessionState, SpeakOutcome, SpeechRequest};

// ---------------------------------------------------------------------------
// SpeechEngine
// ---------------------------------------------------------------------------

/// Bilingual speech engine preferring the local voice and falling back to
/// remote synthesis.
///
/// Cheap to clone; clones share the same sessions, config and backends.
///
/// ```rust,no_run
/// use bilingual_tts::engine::SpeechEngine;
///
/// # async fn example() {
/// let engine = SpeechEngine::new(200, 0.9);
///
/// let stopper = engine.clone();
/// tokio::spawn(async move {
///     tokio::time::sleep(std::time::Duration::from_secs(2)).await;
///     stopper.stop();
/// });
///
/// let ok = engine.speak("你好，欢迎使用文字转语音程序！", false).await;
/// println!("spoken: {ok}");
/// # }
/// ```
#[derive(Clone)]
pub struct SpeechEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    offline: Arc<dyn SpeechBackend>,
    online: Arc<dyn SpeechBackend>,
    config: Mutex<EngineConfig>,
    offline_ready: AtomicBool,
    online_ready: AtomicBool,
    /// Admission flag: set while a session is Running or Stopping.
    running: AtomicBool,
    /// Current or most recent session.
    session: Mutex<Option<Arc<PlaybackSession>>>,
    next_session_id: AtomicU64,
}

impl std::fmt::Debug for SpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechEngine")
            .field("config", &self.config())
            .field("availability", &self.availability())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SpeechEngine {
    /// Build an engine with default backend settings and the given initial
    /// rate and volume.  Never fails: unavailable backends are recorded in
    /// [`availability`](Self::availability).
    ///
    /// On macOS the local voice runs in a copy of the current executable,
    /// so `main` must begin with
    /// [`run_if_worker`](crate::offline::worker::run_if_worker).  Hosts that
    /// cannot do that set `offline.isolation = "direct"` and use
    /// [`from_config`](Self::from_config).
    pub fn new(rate: i32, volume: f32) -> Self {
        let mut config = AppConfig::default();
        config.speech.rate = rate;
        config.speech.volume = volume;
        Self::from_config(&config)
    }

    /// Build an engine from application settings, probing both backends.
    ///
    /// When the offline isolation resolves to a separate process, the
    /// current executable is re-run as the worker; see
    /// [`run_if_worker`](crate::offline::worker::run_if_worker).
    pub fn from_config(config: &AppConfig) -> Self {
        let offline: Arc<dyn SpeechBackend> = Arc::new(OfflineBackend::from_config(&config.offline));
        let online: Arc<dyn SpeechBackend> = Arc::new(OnlineBackend::from_config(&config.online));
        Self::with_backends(
            offline,
            online,
            EngineConfig::new(config.speech.rate, config.speech.volume),
        )
    }

    /// Build an engine around explicit backends.
    pub fn with_backends(
        offline: Arc<dyn SpeechBackend>,
        online: Arc<dyn SpeechBackend>,
        config: EngineConfig,
    ) -> Self {
        let offline_ready = offline.is_available();
        let online_ready = online.is_available();
        log::info!(
            "speech engine ready (offline: {offline_ready}, online: {online_ready}, rate: {}, volume: {:.2})",
            config.rate(),
            config.volume()
        );

        if offline_ready {
            offline.apply_settings(config);
        }

        Self {
            inner: Arc::new(EngineInner {
                offline,
                online,
                config: Mutex::new(config),
                offline_ready: AtomicBool::new(offline_ready),
                online_ready: AtomicBool::new(online_ready),
                running: AtomicBool::new(false),
                session: Mutex::new(None),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn availability(&self) -> EngineAvailability {
        EngineAvailability {
            offline_ready: self.inner.offline_ready.load(Ordering::SeqCst),
            online_ready: self.inner.online_ready.load(Ordering::SeqCst),
        }
    }

    /// Snapshot of the current rate and volume.
    pub fn config(&self) -> EngineConfig {
        *lock(&self.inner.config)
    }

    /// State of the current or most recent session; `Idle` before the first.
    pub fn state(&self) -> SessionState {
        lock(&self.inner.session)
            .as_ref()
            .map_or(SessionState::Idle, |session| session.state())
    }

    pub fn is_busy(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Update rate and volume.  Volume is clamped on write.  The live offline
    /// driver picks the change up immediately; an online attempt already in
    /// flight keeps the values it started with.
    pub fn configure(&self, rate: i32, volume: f32) {
        let snapshot = {
            let mut config = lock(&self.inner.config);
            config.set_rate(rate);
            config.set_volume(volume);
            *config
        };
        self.publish(snapshot);
    }

    pub fn set_rate(&self, rate: i32) {
        let snapshot = {
            let mut config = lock(&self.inner.config);
            config.set_rate(rate);
            *config
        };
        self.publish(snapshot);
    }

    pub fn set_volume(&self, volume: f32) {
        let snapshot = {
            let mut config = lock(&self.inner.config);
            config.set_volume(volume);
            *config
        };
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: EngineConfig) {
        log::debug!(
            "engine: rate = {}, volume = {:.2}",
            snapshot.rate(),
            snapshot.volume()
        );
        if self.inner.offline_ready.load(Ordering::SeqCst) {
            self.inner.offline.apply_settings(snapshot);
        }
    }

    // -----------------------------------------------------------------------
    // Speak / stop
    // -----------------------------------------------------------------------

    /// Speak `text`, returning `true` only if a backend confirmed playback.
    pub async fn speak(&self, text: &str, force_online: bool) -> bool {
        self.speak_with_outcome(text, force_online).await.is_success()
    }

    /// Like [`speak`](Self::speak) but reports why a call did not succeed.
    pub async fn speak_with_outcome(&self, text: &str, force_online: bool) -> SpeakOutcome {
        let (request, guard) = match self.admit(text, force_online) {
            Ok(admitted) => admitted,
            Err(outcome) => return outcome,
        };

        let engine = self.clone();
        let joined =
            tokio::task::spawn_blocking(move || engine.run_session(&guard, &request)).await;

        match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("speech task aborted: {e}");
                SpeakOutcome::Failed
            }
        }
    }

    /// Run the whole speak call on the current thread.
    ///
    /// For synchronous collaborators that already own a background thread;
    /// `stop` may be called from any other thread meanwhile.
    pub fn speak_blocking(&self, text: &str, force_online: bool) -> SpeakOutcome {
        match self.admit(text, force_online) {
            Ok((request, guard)) => self.run_session(&guard, &request),
            Err(outcome) => outcome,
        }
    }

    /// Request the running session, if any, to stop.
    ///
    /// Sets the cancellation flag and halts whichever backend is active.
    /// Returns immediately; the session reaches `Completed` once the backend
    /// call returns.  Calling it with nothing running is a no-op.
    pub fn stop(&self) -> bool {
        let session = lock(&self.inner.session).clone();
        match session {
            Some(session) if session.request_stop() => {
                log::info!("session {}: stop requested", session.id());
            }
            _ => log::debug!("stop: no running session"),
        }
        true
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Validate the request and claim the single running slot.
    fn admit(
        &self,
        text: &str,
        force_online: bool,
    ) -> Result<(SpeechRequest, SessionGuard), SpeakOutcome> {
        let Some(request) = SpeechRequest::new(text, self.config(), force_online) else {
            log::warn!("speak: input text is empty");
            return Err(SpeakOutcome::InvalidInput);
        };

        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::warn!("speak: rejected, another session is running");
            return Err(SpeakOutcome::Busy);
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(PlaybackSession::start(id));
        *lock(&self.inner.session) = Some(Arc::clone(&session));

        Ok((
            request,
            SessionGuard {
                inner: Arc::clone(&self.inner),
                session,
            },
        ))
    }

    /// Apply the fallback policy for one admitted request.
    fn run_session(&self, guard: &SessionGuard, request: &SpeechRequest) -> SpeakOutcome {
        let session = &guard.session;
        log::info!(
            "session {}: speaking {} chars ({})",
            session.id(),
            request.text.chars().count(),
            request.language()
        );

        let offline_ready = self.inner.offline_ready.load(Ordering::SeqCst);
        let success = if request.force_online || !offline_ready {
            self.attempt(session, &self.inner.online, request)
        } else if self.attempt(session, &self.inner.offline, request) {
            true
        } else {
            if !self.inner.offline.is_available()
                && self.inner.offline_ready.swap(false, Ordering::SeqCst)
            {
                log::warn!("offline backend became unavailable; future requests go online");
            }
            log::info!("session {}: offline attempt failed, trying online", session.id());
            self.attempt(session, &self.inner.online, request)
        };

        let cancelled = session.is_cancelled();
        let final_state = session.finish(success);
        log::info!("session {}: {}", session.id(), final_state.label());

        if success {
            SpeakOutcome::Completed
        } else if cancelled {
            SpeakOutcome::Cancelled
        } else {
            SpeakOutcome::Failed
        }
    }

    fn attempt(
        &self,
        session: &PlaybackSession,
        backend: &Arc<dyn SpeechBackend>,
        request: &SpeechRequest,
    ) -> bool {
        session.begin_attempt(Arc::clone(backend));
        let ok = backend.speak(&request.text, request.settings(), session.cancel_token());
        session.end_attempt();
        log::debug!("session {}: {} backend returned {ok}", session.id(), backend.name());
        ok
    }
}

// ---------------------------------------------------------------------------
// SessionGuard
// ---------------------------------------------------------------------------

/// Releases the running slot exactly once, whether the session finished,
/// was stopped, or its thread panicked.
struct SessionGuard {
    inner: Arc<EngineInner>,
    session: Arc<PlaybackSession>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.end_attempt();
        if !self.session.state().is_terminal() {
            self.session.finish(false);
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
