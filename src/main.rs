//! Application entry point: bilingual text-to-speech CLI.
//!
//! # Startup sequence
//!
//! 1. A worker invocation short-circuits everything else and speaks
//!    exactly one job ([`worker::run_if_worker`]).
//! 2. Parse the command line and initialise logging (`warn`, or `info` with
//!    `--verbose`).
//! 3. Load [`AppConfig`] and apply command-line overrides.
//! 4. Probe the offline and online backends and build the [`SpeechEngine`].
//! 5. Create the [`tokio`] runtime (multi-thread, 2 workers) and install the
//!    Ctrl-C handler that stops the running session.
//! 6. Run one of: voice listing, demo script, interactive shell, single shot.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use bilingual_tts::config::AppConfig;
use bilingual_tts::engine::{EngineConfig, SpeakOutcome, SpeechEngine};
use bilingual_tts::lang::VoiceDescriptor;
use bilingual_tts::offline::worker;
use bilingual_tts::offline::OfflineBackend;
use bilingual_tts::online::OnlineBackend;
use bilingual_tts::shell::{self, ShellCommand, DEMO, HELP};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Speak Chinese or English text with the local voice, falling back to
/// online synthesis.
#[derive(Debug, Parser)]
#[command(name = "bilingual-tts", version)]
struct Cli {
    /// Text to speak.  Words are joined with single spaces.
    text: Vec<String>,

    /// Speaking rate in words per minute.
    #[arg(short, long, allow_negative_numbers = true)]
    rate: Option<i32>,

    /// Volume between 0.0 and 1.0; out-of-range values are clamped.
    #[arg(long, allow_negative_numbers = true)]
    volume: Option<f32>,

    /// Skip the local voice and synthesise online.
    #[arg(long)]
    online: bool,

    /// Read lines from stdin and speak each one.
    #[arg(short, long)]
    interactive: bool,

    /// Log backend decisions at info level.
    #[arg(short, long)]
    verbose: bool,

    /// Print the local voices and exit.
    #[arg(long)]
    list_voices: bool,

    /// Speak the bundled sample sentences.
    #[arg(long)]
    demo: bool,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(rate) = self.rate {
            config.speech.rate = rate;
        }
        if let Some(volume) = self.volume {
            config.speech.volume = volume.clamp(0.0, 1.0);
        }
        if self.online {
            config.speech.force_online = true;
        }
    }

    fn text(&self) -> String {
        self.text.join(" ")
    }

    fn wants_speech(&self) -> bool {
        self.interactive || self.demo || !self.text.is_empty()
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    if let Some(code) = worker::run_if_worker() {
        return code;
    }

    let cli = Cli::parse();

    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let mut config = load_config(cli)?;
    cli.apply_overrides(&mut config);

    if cli.save_config {
        match &cli.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        println!("settings saved");
    }

    let offline = Arc::new(OfflineBackend::from_config(&config.offline));
    if cli.list_voices {
        print_voices(offline.voices());
        return Ok(true);
    }
    if !cli.wants_speech() {
        if cli.save_config {
            return Ok(true);
        }
        eprintln!("nothing to speak; pass TEXT, --interactive or --demo (see --help)");
        return Ok(false);
    }

    let voices = offline.voices().to_vec();
    let online = Arc::new(OnlineBackend::from_config(&config.online));
    let engine = SpeechEngine::with_backends(
        offline,
        online,
        EngineConfig::new(config.speech.rate, config.speech.volume),
    );
    if !engine.availability().any() {
        log::warn!("no speech backend is available; every request will fail");
    }

    // Tokio runtime (2 workers; speech itself runs on the blocking pool)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let force_online = config.speech.force_online;
    rt.block_on(async {
        spawn_interrupt_handler(engine.clone());

        if cli.demo {
            Ok(run_demo(&engine, force_online).await)
        } else if cli.interactive {
            run_interactive(&engine, &voices, force_online).await
        } else {
            let outcome = engine.speak_with_outcome(&cli.text(), force_online).await;
            Ok(report(outcome))
        }
    })
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })),
    }
}

/// Ctrl-C stops the running session, or exits when nothing is speaking.
fn spawn_interrupt_handler(engine: SpeechEngine) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if engine.is_busy() {
                engine.stop();
            } else {
                std::process::exit(130);
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn run_demo(engine: &SpeechEngine, force_online: bool) -> bool {
    let base = engine.config();
    let mut all_spoken = true;

    for (i, item) in DEMO.iter().enumerate() {
        println!("{}. {}: {}", i + 1, item.title, item.text);
        engine.configure(
            item.rate.unwrap_or(base.rate()),
            item.volume.unwrap_or(base.volume()),
        );

        let outcome = engine
            .speak_with_outcome(item.text, force_online || item.force_online)
            .await;
        all_spoken &= report(outcome);
        if outcome == SpeakOutcome::Cancelled {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    engine.configure(base.rate(), base.volume());
    all_spoken
}

async fn run_interactive(
    engine: &SpeechEngine,
    voices: &[VoiceDescriptor],
    mut force_online: bool,
) -> Result<bool> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match shell::parse_line(&line) {
            ShellCommand::Empty => {}
            ShellCommand::Quit => break,
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Status => print_status(engine, force_online),
            ShellCommand::Voices => print_voices(voices),
            ShellCommand::Rate(rate) => {
                engine.set_rate(rate);
                println!("rate {}", engine.config().rate());
            }
            ShellCommand::Volume(volume) => {
                engine.set_volume(volume);
                println!("volume {:.2}", engine.config().volume());
            }
            ShellCommand::ForceOnline(on) => {
                force_online = on;
                println!("{}", if on { "online only" } else { "local voice first" });
            }
            ShellCommand::Speak(text) => {
                report(engine.speak_with_outcome(&text, force_online).await);
            }
            ShellCommand::Invalid(message) => eprintln!("{message}"),
        }
    }

    Ok(true)
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

/// Print a one-line verdict for failures; returns whether speech completed.
fn report(outcome: SpeakOutcome) -> bool {
    match outcome {
        SpeakOutcome::Completed => {}
        SpeakOutcome::Cancelled => eprintln!("stopped"),
        SpeakOutcome::Busy => eprintln!("still speaking; try again later"),
        SpeakOutcome::InvalidInput => eprintln!("nothing to speak"),
        SpeakOutcome::Failed => eprintln!("speech failed: no backend could speak the text"),
    }
    outcome.is_success()
}

fn print_voices(voices: &[VoiceDescriptor]) {
    if voices.is_empty() {
        println!("no local voices found");
        return;
    }
    for voice in voices {
        println!("{voice}");
    }
}

fn print_status(engine: &SpeechEngine, force_online: bool) {
    let availability = engine.availability();
    let config = engine.config();
    println!(
        "offline: {}  online: {}  route: {}",
        if availability.offline_ready { "ready" } else { "unavailable" },
        if availability.online_ready { "ready" } else { "unavailable" },
        if force_online { "online only" } else { "local first" },
    );
    println!(
        "rate: {}  volume: {:.2}  last session: {}",
        config.rate(),
        config.volume(),
        engine.state().label()
    );
}
