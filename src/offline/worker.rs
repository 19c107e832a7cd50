//! Entry point of the isolated speech worker process.
//!
//! The parent ([`super::IsolatedProcess`]) re-runs the current executable
//! with the hidden worker subcommand.  The worker speaks exactly one job on
//! its own driver and reports the outcome through its exit code.  The parent
//! owns the watchdog; the worker never needs to know about cancellation.
//!
//! Any executable that builds a [`crate::SpeechEngine`] with process
//! isolation must start `main` like this:
//!
//! ```no_run
//! fn main() -> std::process::ExitCode {
//!     if let Some(code) = bilingual_tts::offline::worker::run_if_worker() {
//!         return code;
//!     }
//!     // regular startup
//!     std::process::ExitCode::SUCCESS
//! }
//! ```

use std::ffi::OsString;
use std::process::ExitCode;

use clap::{Args, Parser};

use super::driver::{DriverError, LocalDriver, SystemDriver};
use super::isolation::WORKER_SUBCOMMAND;

/// Command line of the worker subcommand.
#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Speech program to drive instead of the platform default.
    #[arg(long)]
    pub program: Option<String>,

    #[arg(long, default_value_t = 200)]
    pub rate: i32,

    #[arg(long, default_value_t = 0.9)]
    pub volume: f32,

    /// Voice id as reported by the driver's voice listing.
    #[arg(long)]
    pub voice: Option<String>,

    /// Text to speak.
    #[arg(allow_hyphen_values = true)]
    pub text: String,
}

#[derive(Debug, Parser)]
#[command(name = WORKER_SUBCOMMAND, no_binary_name = true)]
struct WorkerCli {
    #[command(flatten)]
    args: WorkerArgs,
}

/// Parse `argv` as a worker invocation.
///
/// Returns `None` unless the first argument after the binary name is
/// [`WORKER_SUBCOMMAND`].
pub fn worker_args_from<I, T>(argv: I) -> Option<Result<WorkerArgs, clap::Error>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut argv = argv.into_iter().map(Into::into).skip(1).peekable();
    if argv.peek().map_or(true, |first| first != WORKER_SUBCOMMAND) {
        return None;
    }
    argv.next();
    Some(WorkerCli::try_parse_from(argv).map(|cli| cli.args))
}

/// Run the worker when this process was started as one.
///
/// Returns `None` for a regular start; the caller carries on with its own
/// startup.  Otherwise speaks the job and returns the exit code for the
/// parent.  Installs `env_logger` at `warn` unless a logger already exists.
pub fn run_if_worker() -> Option<ExitCode> {
    let parsed = worker_args_from(std::env::args_os())?;
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();

    Some(match parsed {
        Ok(args) => exit_code(&args),
        Err(e) => {
            let _ = e.print();
            ExitCode::from(2)
        }
    })
}

/// Driver for one job.  A program named by the parent was already probed
/// there and is used as is.
fn driver_for(args: &WorkerArgs) -> Result<SystemDriver, DriverError> {
    match &args.program {
        Some(program) => Ok(SystemDriver::new(program.as_str())),
        None => SystemDriver::probe(None),
    }
}

/// Speak one job.  Returns `true` when playback ran to completion.
pub fn run(args: &WorkerArgs) -> bool {
    let driver = match driver_for(args) {
        Ok(driver) => driver,
        Err(e) => {
            log::error!("speech worker: {e}");
            return false;
        }
    };

    driver.set_rate(args.rate);
    driver.set_volume(args.volume);
    if let Some(voice) = &args.voice {
        driver.set_voice(voice);
    }

    match driver.say_and_wait(&args.text) {
        Ok(()) => true,
        Err(e) => {
            log::error!("speech worker: {e}");
            false
        }
    }
}

/// [`run`] mapped to the process exit code the parent inspects.
pub fn exit_code(args: &WorkerArgs) -> ExitCode {
    if run(args) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::SynthesisJob;

    fn parse(args: Vec<OsString>) -> WorkerArgs {
        WorkerCli::try_parse_from(args).unwrap().args
    }

    #[test]
    fn parses_what_the_parent_sends() {
        let job = SynthesisJob {
            text: "你好，世界".into(),
            rate: 150,
            volume: 0.4,
            voice: Some("cmn".into()),
        };
        let args = parse(job.worker_args());
        assert_eq!(args.text, "你好，世界");
        assert_eq!(args.rate, 150);
        assert!((args.volume - 0.4).abs() < f32::EPSILON);
        assert_eq!(args.voice.as_deref(), Some("cmn"));
        assert!(args.program.is_none());
    }

    #[test]
    fn text_starting_with_dash_survives() {
        let job = SynthesisJob {
            text: "-5 degrees".into(),
            rate: 200,
            volume: 1.0,
            voice: None,
        };
        let args = parse(job.worker_args());
        assert_eq!(args.text, "-5 degrees");
        assert!(args.voice.is_none());
    }

    #[test]
    fn worker_invocation_is_recognised() {
        let args = worker_args_from([
            "bilingual-tts",
            WORKER_SUBCOMMAND,
            "--program",
            "espeak",
            "--rate",
            "180",
            "--",
            "你好",
        ])
        .expect("worker invocation")
        .unwrap();
        assert_eq!(args.program.as_deref(), Some("espeak"));
        assert_eq!(args.rate, 180);
        assert_eq!(args.text, "你好");
    }

    #[test]
    fn regular_invocations_are_left_alone() {
        assert!(worker_args_from(["bilingual-tts", "hello", "world"]).is_none());
        assert!(worker_args_from(["bilingual-tts", "--demo"]).is_none());
        assert!(worker_args_from(["my-gui-app"]).is_none());
        assert!(worker_args_from(Vec::<String>::new()).is_none());
        // Only the first argument selects the worker.
        assert!(worker_args_from(["bilingual-tts", "say", WORKER_SUBCOMMAND]).is_none());
    }

    #[test]
    fn malformed_worker_invocation_is_an_error() {
        let parsed = worker_args_from(["app", WORKER_SUBCOMMAND, "--rate", "fast", "hi"]);
        assert!(matches!(parsed, Some(Err(_))));
    }

    #[test]
    fn named_program_is_not_probed_again() {
        let args = WorkerArgs {
            program: Some("/opt/definitely-missing/say".into()),
            rate: 200,
            volume: 0.9,
            voice: None,
            text: "hello".into(),
        };
        // Probing would run the voice listing and fail on a missing program.
        let driver = driver_for(&args).unwrap();
        assert_eq!(driver.executable(), "/opt/definitely-missing/say");
        assert_eq!(driver.program(), crate::offline::SpeechProgram::Say);
    }

    #[test]
    fn missing_program_fails() {
        let args = WorkerArgs {
            program: Some("definitely-not-a-speech-program-xyz".into()),
            rate: 200,
            volume: 0.9,
            voice: None,
            text: "hello".into(),
        };
        assert!(!run(&args));
    }
}
