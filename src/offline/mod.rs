//! Offline backend: local device voice.
//!
//! # Architecture
//!
//! ```text
//! OfflineBackend::speak(text)
//!   ├─ detect_language(text) ──▶ select_voice(voices snapshot)
//!   ├─ SynthesisJob { text, rate, volume, voice }
//!   └─ IsolationPolicy::run(job, cancel)
//!         ├─ DirectCall      → LocalDriver::say_and_wait  + watchdog thread
//!         └─ IsolatedProcess → worker process             + parent watchdog
//! ```
//!
//! Construction never fails.  When no driver can be found the adapter is
//! unavailable and every `speak` returns `false` without side effects.

pub mod driver;
pub mod isolation;
pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::OfflineConfig;
use crate::engine::{CancelToken, EngineConfig, SpeechBackend};
use crate::lang::{detect_language, select_voice, VoiceDescriptor};

// ── Public re-exports ──────────────────────────────────────────────────────

pub use driver::{DriverError, LocalDriver, SpeechProgram, SystemDriver};
pub use isolation::{
    policy_for, DirectCall, IsolatedProcess, IsolationPolicy, SynthesisJob, WatchdogLimits,
    WORKER_SUBCOMMAND,
};

// ---------------------------------------------------------------------------
// OfflineError
// ---------------------------------------------------------------------------

/// Failures of the offline path.  Never leaves the adapter; `speak` turns
/// them into `false` plus a log entry.
#[derive(Debug, Error)]
pub enum OfflineError {
    #[error("offline driver unavailable")]
    Unavailable,

    #[error("cancelled")]
    Cancelled,

    #[error("offline playback exceeded {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("failed to start speech worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to wait for speech worker: {0}")]
    Wait(#[source] std::io::Error),

    #[error("speech worker exited with {0}")]
    WorkerFailed(std::process::ExitStatus),
}

impl OfflineError {
    /// Whether this failure means the driver will never work again.
    fn is_unrecoverable(&self) -> bool {
        match self {
            OfflineError::Driver(e) => e.is_unrecoverable(),
            OfflineError::Spawn(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// OfflineBackend
// ---------------------------------------------------------------------------

/// Offline adapter: owns the local driver handle, its voice snapshot and
/// the isolation strategy.
pub struct OfflineBackend {
    driver: Option<Arc<dyn LocalDriver>>,
    voices: Vec<VoiceDescriptor>,
    policy: Option<Box<dyn IsolationPolicy>>,
    available: AtomicBool,
}

impl std::fmt::Debug for OfflineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineBackend")
            .field("available", &self.is_available())
            .field("voices", &self.voices.len())
            .field("policy", &self.policy_name())
            .finish_non_exhaustive()
    }
}

impl OfflineBackend {
    /// Probe the platform driver and pick the isolation strategy.
    ///
    /// With process isolation the worker is the current executable, so the
    /// host's `main` must start with [`worker::run_if_worker`].
    pub fn from_config(config: &OfflineConfig) -> Self {
        if !config.enabled {
            log::info!("offline backend disabled by configuration");
            return Self::unavailable();
        }

        let system = match SystemDriver::probe(config.program.as_deref()) {
            Ok(driver) => driver,
            Err(e) => {
                log::warn!("offline speech driver unavailable: {e}");
                return Self::unavailable();
            }
        };
        log::info!(
            "offline driver: `{}` ({:?} dialect)",
            system.executable(),
            system.program()
        );

        let executable = system.executable().to_string();
        let driver: Arc<dyn LocalDriver> = Arc::new(system);
        match policy_for(config, Arc::clone(&driver), Some(executable.as_str())) {
            Ok(policy) => Self::with_driver(driver, policy),
            Err(e) => {
                log::warn!("offline isolation setup failed: {e}");
                Self::unavailable()
            }
        }
    }

    /// Wrap an already acquired driver.  Reads the voice snapshot once.
    pub fn with_driver(driver: Arc<dyn LocalDriver>, policy: Box<dyn IsolationPolicy>) -> Self {
        let voices = driver.voices().unwrap_or_else(|e| {
            log::warn!("could not list offline voices: {e}");
            Vec::new()
        });
        log::info!(
            "offline backend: {} voices, {} isolation",
            voices.len(),
            policy.name()
        );
        Self {
            driver: Some(driver),
            voices,
            policy: Some(policy),
            available: AtomicBool::new(true),
        }
    }

    /// An adapter with no driver; every call fails.
    pub fn unavailable() -> Self {
        Self {
            driver: None,
            voices: Vec::new(),
            policy: None,
            available: AtomicBool::new(false),
        }
    }

    /// Voice snapshot taken at construction.
    pub fn voices(&self) -> &[VoiceDescriptor] {
        &self.voices
    }

    pub fn policy_name(&self) -> Option<&'static str> {
        self.policy.as_ref().map(|p| p.name())
    }

    fn try_speak(
        &self,
        text: &str,
        settings: EngineConfig,
        cancel: &CancelToken,
    ) -> Result<(), OfflineError> {
        let Some(policy) = self.policy.as_ref().filter(|_| self.is_available()) else {
            return Err(OfflineError::Unavailable);
        };
        if cancel.is_cancelled() {
            return Err(OfflineError::Cancelled);
        }

        let language = detect_language(text);
        let voice = select_voice(language, &self.voices).map(|v| v.id.clone());
        log::debug!(
            "offline: language {language}, voice {}",
            voice.as_deref().unwrap_or("<default>")
        );

        let job = SynthesisJob {
            text: text.to_string(),
            rate: settings.rate(),
            volume: settings.volume(),
            voice,
        };
        policy.run(&job, cancel)
    }
}

impl SpeechBackend for OfflineBackend {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn speak(&self, text: &str, settings: EngineConfig, cancel: &CancelToken) -> bool {
        match self.try_speak(text, settings, cancel) {
            Ok(()) => true,
            Err(OfflineError::Cancelled) => {
                log::info!("offline speech cancelled");
                false
            }
            Err(e) => {
                if e.is_unrecoverable() {
                    self.available.store(false, Ordering::SeqCst);
                }
                log::warn!("offline speech failed: {e}");
                false
            }
        }
    }

    fn halt(&self) {
        if let Some(driver) = &self.driver {
            driver.stop();
        }
    }

    fn apply_settings(&self, settings: EngineConfig) {
        if let Some(driver) = &self.driver {
            driver.set_rate(settings.rate());
            driver.set_volume(settings.volume());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
