//! Online backend: remote synthesis plus local playback.
//!
//! Each attempt owns exactly one temporary MP3 file:
//!
//! ```text
//! create temp ─▶ synthesize into it ─▶ play ─▶ poll until idle ─▶ delete
//!                      │ error              │ error / cancel         ▲
//!                      └────────────────────┴────────────────────────┘
//! ```
//!
//! The file is removed on every exit path.  A failed removal is logged and
//! otherwise ignored.

pub mod player;
pub mod synth;

use std::time::Duration;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::OnlineConfig;
use crate::engine::{CancelToken, EngineConfig, SpeechBackend};
use crate::lang::{detect_language, Language};

pub use player::{AudioPlayer, RodioPlayer};
pub use synth::{split_text, RemoteSynthesizer, TranslateTts};

/// Name prefix of the per-attempt temporary audio file.
pub const TEMP_PREFIX: &str = "bilingual-tts-";

// ---------------------------------------------------------------------------
// OnlineError
// ---------------------------------------------------------------------------

/// Failures of the online path.
#[derive(Debug, Error)]
pub enum OnlineError {
    #[error("online speech unavailable")]
    Unavailable,

    #[error("cancelled")]
    Cancelled,

    #[error("TTS request timed out")]
    Timeout,

    #[error("TTS request failed: {0}")]
    Request(String),

    #[error("TTS service answered HTTP {0}")]
    Status(u16),

    #[error("TTS service returned no audio")]
    EmptyAudio,

    #[error("temporary audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("audio player: {0}")]
    Player(String),
}

impl From<reqwest::Error> for OnlineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OnlineError::Timeout
        } else {
            OnlineError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// OnlineBackend
// ---------------------------------------------------------------------------

/// Online adapter: a [`RemoteSynthesizer`] feeding an [`AudioPlayer`].
///
/// Reads no engine settings; the remote service has no rate control beyond
/// its slow mode and player volume is not exposed.
pub struct OnlineBackend {
    synth: Box<dyn RemoteSynthesizer>,
    player: Box<dyn AudioPlayer>,
    enabled: bool,
}

impl OnlineBackend {
    pub fn from_config(config: &OnlineConfig) -> Self {
        Self::with_parts(
            Box::new(TranslateTts::from_config(config)),
            Box::new(RodioPlayer::new(Duration::from_millis(
                config.poll_interval_ms.max(1),
            ))),
            config.enabled,
        )
    }

    pub fn with_parts(
        synth: Box<dyn RemoteSynthesizer>,
        player: Box<dyn AudioPlayer>,
        enabled: bool,
    ) -> Self {
        Self {
            synth,
            player,
            enabled,
        }
    }

    fn try_speak(&self, text: &str, cancel: &CancelToken) -> Result<(), OnlineError> {
        if !self.enabled {
            return Err(OnlineError::Unavailable);
        }
        if cancel.is_cancelled() {
            return Err(OnlineError::Cancelled);
        }

        let language = detect_language(text);
        log::debug!("online: language {language} ({})", language.remote_code());

        let mut audio = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".mp3")
            .tempfile()?;

        let result = self.synthesize_and_play(text, language, &mut audio, cancel);
        remove_temp(audio);
        result
    }

    fn synthesize_and_play(
        &self,
        text: &str,
        language: Language,
        audio: &mut NamedTempFile,
        cancel: &CancelToken,
    ) -> Result<(), OnlineError> {
        self.synth
            .synthesize(text, language, audio.as_file_mut(), cancel)?;

        if cancel.is_cancelled() {
            return Err(OnlineError::Cancelled);
        }
        self.player.play(audio.path(), cancel)
    }
}

fn remove_temp(audio: NamedTempFile) {
    let path = audio.path().to_path_buf();
    if let Err(e) = audio.close() {
        log::warn!("could not remove {}: {e}", path.display());
    }
}

impl SpeechBackend for OnlineBackend {
    fn name(&self) -> &'static str {
        "online"
    }

    fn is_available(&self) -> bool {
        self.enabled && self.player.is_available()
    }

    fn speak(&self, text: &str, _settings: EngineConfig, cancel: &CancelToken) -> bool {
        match self.try_speak(text, cancel) {
            Ok(()) => true,
            Err(OnlineError::Cancelled) => {
                log::info!("online speech cancelled");
                false
            }
            Err(e) => {
                log::warn!("online speech failed: {e}");
                false
            }
        }
    }

    fn halt(&self) {
        self.player.halt();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use super::*;

    struct FakeSynth {
        fail: bool,
        languages: Arc<Mutex<Vec<Language>>>,
    }

    impl FakeSynth {
        fn ok() -> Self {
            Self {
                fail: false,
                languages: Arc::default(),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                languages: Arc::default(),
            }
        }
    }

    impl RemoteSynthesizer for FakeSynth {
        fn synthesize(
            &self,
            _text: &str,
            language: Language,
            out: &mut dyn Write,
            _cancel: &CancelToken,
        ) -> Result<(), OnlineError> {
            self.languages.lock().unwrap().push(language);
            out.write_all(b"ID3 fake mp3")?;
            if self.fail {
                Err(OnlineError::Status(503))
            } else {
                Ok(())
            }
        }
    }

    /// Records what it was asked to play and whether the file existed then.
    #[derive(Default)]
    struct FakePlayer {
        fail: bool,
        /// Cancel this token while "playing".
        cancel_during_play: bool,
        played: Arc<Mutex<Vec<(PathBuf, bool)>>>,
        halts: Arc<Mutex<usize>>,
    }

    impl AudioPlayer for FakePlayer {
        fn is_available(&self) -> bool {
            true
        }

        fn play(&self, path: &Path, cancel: &CancelToken) -> Result<(), OnlineError> {
            let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            self.played
                .lock()
                .unwrap()
                .push((path.to_path_buf(), size > 0));
            if self.cancel_during_play {
                cancel.cancel();
                return Err(OnlineError::Cancelled);
            }
            if self.fail {
                return Err(OnlineError::Player("no device".into()));
            }
            Ok(())
        }

        fn halt(&self) {
            *self.halts.lock().unwrap() += 1;
        }
    }

    fn backend(synth: FakeSynth, player: FakePlayer) -> OnlineBackend {
        OnlineBackend::with_parts(Box::new(synth), Box::new(player), true)
    }

    #[test]
    fn plays_synthesized_file_then_deletes_it() {
        let player = FakePlayer::default();
        let played = Arc::clone(&player.played);
        let backend = backend(FakeSynth::ok(), player);

        assert!(backend.speak("hello", EngineConfig::default(), &CancelToken::new()));

        let played = played.lock().unwrap();
        assert_eq!(played.len(), 1);
        let (path, had_audio) = &played[0];
        assert!(had_audio, "player saw an empty file");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_PREFIX));
        assert!(!path.exists(), "temp file left behind");
    }

    #[test]
    fn synthesis_failure_skips_playback() {
        let player = FakePlayer::default();
        let played = Arc::clone(&player.played);
        let backend = backend(FakeSynth::failing(), player);

        assert!(!backend.speak("hello", EngineConfig::default(), &CancelToken::new()));
        assert!(played.lock().unwrap().is_empty());
    }

    #[test]
    fn player_failure_still_deletes_file() {
        let player = FakePlayer {
            fail: true,
            ..FakePlayer::default()
        };
        let played = Arc::clone(&player.played);
        let backend = backend(FakeSynth::ok(), player);

        assert!(!backend.speak("hello", EngineConfig::default(), &CancelToken::new()));
        let played = played.lock().unwrap();
        assert!(!played[0].0.exists());
    }

    #[test]
    fn cancel_during_playback_returns_false_and_cleans_up() {
        let player = FakePlayer {
            cancel_during_play: true,
            ..FakePlayer::default()
        };
        let played = Arc::clone(&player.played);
        let backend = backend(FakeSynth::ok(), player);
        let cancel = CancelToken::new();

        assert!(!backend.speak("hello", EngineConfig::default(), &cancel));
        assert!(cancel.is_cancelled());
        assert!(!played.lock().unwrap()[0].0.exists());
    }

    #[test]
    fn cancelled_before_start_does_nothing() {
        let synth = FakeSynth::ok();
        let languages = Arc::clone(&synth.languages);
        let backend = backend(synth, FakePlayer::default());
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(!backend.speak("hello", EngineConfig::default(), &cancel));
        assert!(languages.lock().unwrap().is_empty());
    }

    #[test]
    fn language_reaches_synthesizer() {
        let synth = FakeSynth::ok();
        let languages = Arc::clone(&synth.languages);
        let backend = backend(synth, FakePlayer::default());

        backend.speak("你好 world", EngineConfig::default(), &CancelToken::new());
        backend.speak("hello world", EngineConfig::default(), &CancelToken::new());
        assert_eq!(*languages.lock().unwrap(), vec![Language::Zh, Language::En]);
    }

    #[test]
    fn disabled_backend_is_unavailable() {
        let backend =
            OnlineBackend::with_parts(Box::new(FakeSynth::ok()), Box::new(FakePlayer::default()), false);
        assert!(!backend.is_available());
        assert!(!backend.speak("hello", EngineConfig::default(), &CancelToken::new()));
    }

    #[test]
    fn halt_reaches_player() {
        let player = FakePlayer::default();
        let halts = Arc::clone(&player.halts);
        let backend = backend(FakeSynth::ok(), player);

        backend.halt();
        assert_eq!(*halts.lock().unwrap(), 1);
    }
}
