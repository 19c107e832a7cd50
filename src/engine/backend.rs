//! The seam between the orchestrator and the two synthesis strategies.

use super::session::CancelToken;
use super::state::EngineConfig;

// ---------------------------------------------------------------------------
// SpeechBackend trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface implemented by the offline and online
/// adapters.
///
/// # Contract
///
/// - `speak` blocks until playback has finished and returns `true` only when
///   it is confirmed complete.  Every failure, including an observed
///   cancellation, is logged by the adapter and reported as `false`.
/// - `halt` may be called from any thread while `speak` is running and must
///   not block for long.
pub trait SpeechBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this backend can currently be attempted.
    fn is_available(&self) -> bool;

    /// Synthesise and play `text` with `settings`.
    fn speak(&self, text: &str, settings: EngineConfig, cancel: &CancelToken) -> bool;

    /// Stop output of an in-flight `speak` as promptly as possible.
    fn halt(&self);

    /// Push new rate/volume to a live driver handle, if the backend keeps one.
    fn apply_settings(&self, _settings: EngineConfig) {}
}

// Compile-time assertion: Box<dyn SpeechBackend> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechBackend>) {}
};

// ---------------------------------------------------------------------------
// MockBackend  (test only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockBackend;

#[cfg(test)]
mod mock {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use super::*;

    /// Scriptable backend used by the engine and session tests.
    pub struct MockBackend {
        name: &'static str,
        available: AtomicBool,
        succeed: bool,
        duration: Duration,
        unavailable_after_failure: bool,
        calls: AtomicUsize,
        halts: AtomicUsize,
        in_flight: AtomicBool,
        texts: Mutex<Vec<String>>,
        last_settings: Mutex<Option<EngineConfig>>,
        applied: Mutex<Option<EngineConfig>>,
    }

    impl MockBackend {
        fn build(name: &'static str, succeed: bool) -> Self {
            Self {
                name,
                available: AtomicBool::new(true),
                succeed,
                duration: Duration::ZERO,
                unavailable_after_failure: false,
                calls: AtomicUsize::new(0),
                halts: AtomicUsize::new(0),
                in_flight: AtomicBool::new(false),
                texts: Mutex::new(Vec::new()),
                last_settings: Mutex::new(None),
                applied: Mutex::new(None),
            }
        }

        pub fn succeeding(name: &'static str) -> Self {
            Self::build(name, true)
        }

        pub fn failing(name: &'static str) -> Self {
            Self::build(name, false)
        }

        pub fn unavailable(name: &'static str) -> Self {
            let mock = Self::build(name, false);
            mock.available.store(false, Ordering::SeqCst);
            mock
        }

        /// Make each `speak` take `duration` (interruptible by cancellation).
        pub fn taking(mut self, duration: Duration) -> Self {
            self.duration = duration;
            self
        }

        /// Report unavailable after the first failed `speak`.
        pub fn breaking_on_failure(mut self) -> Self {
            self.unavailable_after_failure = true;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn halt_count(&self) -> usize {
            self.halts.load(Ordering::SeqCst)
        }

        pub fn is_in_flight(&self) -> bool {
            self.in_flight.load(Ordering::SeqCst)
        }

        pub fn texts(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }

        pub fn last_settings(&self) -> Option<EngineConfig> {
            *self.last_settings.lock().unwrap()
        }

        pub fn applied_settings(&self) -> Option<EngineConfig> {
            *self.applied.lock().unwrap()
        }
    }

    impl SpeechBackend for MockBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        fn speak(&self, text: &str, settings: EngineConfig, cancel: &CancelToken) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.lock().unwrap().push(text.to_string());
            *self.last_settings.lock().unwrap() = Some(settings);

            if cancel.is_cancelled() {
                return false;
            }

            self.in_flight.store(true, Ordering::SeqCst);
            let started = Instant::now();
            while started.elapsed() < self.duration {
                if cancel.is_cancelled() {
                    self.in_flight.store(false, Ordering::SeqCst);
                    return false;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            self.in_flight.store(false, Ordering::SeqCst);

            if !self.succeed && self.unavailable_after_failure {
                self.available.store(false, Ordering::SeqCst);
            }
            self.succeed
        }

        fn halt(&self) {
            self.halts.fetch_add(1, Ordering::SeqCst);
        }

        fn apply_settings(&self, settings: EngineConfig) {
            *self.applied.lock().unwrap() = Some(settings);
        }
    }
}
