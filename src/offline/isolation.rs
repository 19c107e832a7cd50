//! Execution placement for the local driver.
//!
//! Some platform drivers run an event loop that cannot be re-entered from a
//! second thread of the same process.  [`IsolationPolicy`] decides where a
//! [`SynthesisJob`] runs:
//!
//! - [`DirectCall`] calls the shared driver on the current thread while a
//!   watchdog thread polls the cancel flag and the time ceiling.
//! - [`IsolatedProcess`] starts a fresh worker process per job and polls
//!   the same two conditions from the parent, killing the worker on either.
//!
//! Both strategies enforce the same hard ceiling (30 s by default).

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{IsolationMode, OfflineConfig};
use crate::engine::CancelToken;

use super::driver::LocalDriver;
use super::OfflineError;

/// Hidden subcommand that runs one job inside the isolated worker process.
pub const WORKER_SUBCOMMAND: &str = "__speak-worker";

// ---------------------------------------------------------------------------
// SynthesisJob
// ---------------------------------------------------------------------------

/// Everything the driver needs for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisJob {
    pub text: String,
    pub rate: i32,
    pub volume: f32,
    /// Voice id from the selector; `None` keeps the driver default.
    pub voice: Option<String>,
}

impl SynthesisJob {
    /// Command-line form understood by the worker subcommand.
    pub fn worker_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--rate".into(),
            self.rate.to_string().into(),
            "--volume".into(),
            self.volume.to_string().into(),
        ];
        if let Some(voice) = &self.voice {
            args.push("--voice".into());
            args.push(voice.into());
        }
        args.push("--".into());
        args.push(self.text.clone().into());
        args
    }
}

// ---------------------------------------------------------------------------
// WatchdogLimits
// ---------------------------------------------------------------------------

/// Timing shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogLimits {
    /// Force-stop after this long.
    pub ceiling: Duration,
    /// Interval between cancel-flag checks.
    pub poll: Duration,
}

impl WatchdogLimits {
    pub fn from_config(config: &OfflineConfig) -> Self {
        Self {
            ceiling: Duration::from_secs(config.watchdog_secs),
            poll: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

impl Default for WatchdogLimits {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(30),
            poll: Duration::from_millis(100),
        }
    }
}

// ---------------------------------------------------------------------------
// IsolationPolicy trait
// ---------------------------------------------------------------------------

/// Strategy that executes a [`SynthesisJob`] and honours `cancel`.
pub trait IsolationPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run `job` to completion, cancellation or the ceiling.
    fn run(&self, job: &SynthesisJob, cancel: &CancelToken) -> Result<(), OfflineError>;
}

/// Pick the strategy for `config`, resolving `Auto` against the host.
///
/// `program` is the speech executable the parent already resolved; the
/// worker is told to use it so it does not probe again.
pub fn policy_for(
    config: &OfflineConfig,
    driver: Arc<dyn LocalDriver>,
    program: Option<&str>,
) -> Result<Box<dyn IsolationPolicy>, OfflineError> {
    let limits = WatchdogLimits::from_config(config);
    Ok(match config.isolation.resolve() {
        IsolationMode::Process => Box::new(IsolatedProcess::current_exe(program, limits)?),
        _ => Box::new(DirectCall::new(driver, limits)),
    })
}

// ---------------------------------------------------------------------------
// DirectCall
// ---------------------------------------------------------------------------

/// Runs the driver in-process with a watchdog thread alongside.
pub struct DirectCall {
    driver: Arc<dyn LocalDriver>,
    limits: WatchdogLimits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Finished,
    Cancelled,
    TimedOut,
}

impl DirectCall {
    pub fn new(driver: Arc<dyn LocalDriver>, limits: WatchdogLimits) -> Self {
        Self { driver, limits }
    }

    /// Poll until the driver returns.  Once cancelled or timed out, `stop`
    /// is repeated on every tick: a driver that clears its stop flag when
    /// the utterance starts would otherwise miss an early stop.
    fn watch(&self, cancel: &CancelToken, finished: &AtomicBool) -> Verdict {
        let started = Instant::now();
        let mut verdict = Verdict::Finished;
        while !finished.load(Ordering::SeqCst) {
            if verdict == Verdict::Finished {
                if cancel.is_cancelled() {
                    verdict = Verdict::Cancelled;
                } else if started.elapsed() >= self.limits.ceiling {
                    verdict = Verdict::TimedOut;
                }
            }
            if verdict != Verdict::Finished {
                self.driver.stop();
            }
            std::thread::sleep(self.limits.poll);
        }
        verdict
    }
}

impl IsolationPolicy for DirectCall {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn run(&self, job: &SynthesisJob, cancel: &CancelToken) -> Result<(), OfflineError> {
        if cancel.is_cancelled() {
            return Err(OfflineError::Cancelled);
        }

        self.driver.set_rate(job.rate);
        self.driver.set_volume(job.volume);
        if let Some(voice) = &job.voice {
            self.driver.set_voice(voice);
        }

        let finished = AtomicBool::new(false);
        let (result, verdict) = std::thread::scope(|scope| {
            let watchdog = scope.spawn(|| self.watch(cancel, &finished));
            let result = self.driver.say_and_wait(&job.text);
            finished.store(true, Ordering::SeqCst);
            let verdict = watchdog.join().unwrap_or(Verdict::Finished);
            (result, verdict)
        });

        match verdict {
            Verdict::Cancelled => Err(OfflineError::Cancelled),
            Verdict::TimedOut => Err(OfflineError::Timeout(self.limits.ceiling)),
            Verdict::Finished => result.map_err(OfflineError::from),
        }
    }
}

// ---------------------------------------------------------------------------
// IsolatedProcess
// ---------------------------------------------------------------------------

/// Runs each job in its own worker process.
///
/// The worker command line is `program leading_args.. job.worker_args()..`.
/// Exit status 0 means playback completed.
#[derive(Debug, Clone)]
pub struct IsolatedProcess {
    program: PathBuf,
    leading_args: Vec<OsString>,
    limits: WatchdogLimits,
}

impl IsolatedProcess {
    pub fn new(
        program: impl Into<PathBuf>,
        leading_args: Vec<OsString>,
        limits: WatchdogLimits,
    ) -> Self {
        Self {
            program: program.into(),
            leading_args,
            limits,
        }
    }

    /// Re-run the current executable's worker subcommand.
    ///
    /// The host binary must call [`super::worker::run_if_worker`] at the top
    /// of `main`, before any other startup work, and return its exit code
    /// when it yields one.
    pub fn current_exe(
        speech_program: Option<&str>,
        limits: WatchdogLimits,
    ) -> Result<Self, OfflineError> {
        let exe = std::env::current_exe().map_err(OfflineError::Spawn)?;
        let mut leading: Vec<OsString> = vec![WORKER_SUBCOMMAND.into()];
        if let Some(program) = speech_program {
            leading.push("--program".into());
            leading.push(program.into());
        }
        Ok(Self::new(exe, leading, limits))
    }

    fn spawn(&self, job: &SynthesisJob) -> Result<WorkerGuard, OfflineError> {
        let child = Command::new(&self.program)
            .args(&self.leading_args)
            .args(job.worker_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(OfflineError::Spawn)?;
        Ok(WorkerGuard { child: Some(child) })
    }
}

impl IsolationPolicy for IsolatedProcess {
    fn name(&self) -> &'static str {
        "process"
    }

    fn run(&self, job: &SynthesisJob, cancel: &CancelToken) -> Result<(), OfflineError> {
        if cancel.is_cancelled() {
            return Err(OfflineError::Cancelled);
        }

        let mut worker = self.spawn(job)?;
        let started = Instant::now();
        loop {
            if let Some(status) = worker.try_wait()? {
                return if status.success() {
                    Ok(())
                } else {
                    Err(OfflineError::WorkerFailed(status))
                };
            }
            if cancel.is_cancelled() {
                worker.terminate();
                return Err(OfflineError::Cancelled);
            }
            if started.elapsed() >= self.limits.ceiling {
                worker.terminate();
                return Err(OfflineError::Timeout(self.limits.ceiling));
            }
            std::thread::sleep(self.limits.poll);
        }
    }
}

/// Owns a worker process until it has been reaped.
struct WorkerGuard {
    child: Option<Child>,
}

impl WorkerGuard {
    fn try_wait(&mut self) -> Result<Option<ExitStatus>, OfflineError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(None);
        };
        let status = child.try_wait().map_err(OfflineError::Wait)?;
        if status.is_some() {
            self.child = None;
        }
        Ok(status)
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                log::debug!("worker {}: kill failed: {e}", child.id());
            }
            let _ = child.wait();
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
