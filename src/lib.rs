//! Bilingual (Chinese / English) text-to-speech dispatch.
//!
//! Text is routed to the device's local voice first and falls back to a
//! remote synthesis service when the local path is unavailable or fails.
//!
//! | Module      | Responsibility                                        |
//! |-------------|-------------------------------------------------------|
//! | [`lang`]    | Language detection and voice selection                |
//! | [`offline`] | Local speech program driver, isolation and watchdog   |
//! | [`online`]  | Remote synthesis to a temp file and local playback    |
//! | [`engine`]  | Sessions, cancellation, fallback policy, settings     |
//! | [`config`]  | TOML settings and platform paths                      |
//! | [`shell`]   | Interactive command parsing for the CLI               |

pub mod config;
pub mod engine;
pub mod lang;
pub mod offline;
pub mod online;
pub mod shell;

pub use engine::{EngineAvailability, EngineConfig, SessionState, SpeakOutcome, SpeechEngine};
pub use lang::{detect_language, select_voice, Language, VoiceDescriptor};
