//! Language detection and voice selection.
//!
//! Both halves are pure functions over their inputs:
//!
//! ```text
//! text ──detect_language──▶ Language ──select_voice(voices)──▶ Option<VoiceDescriptor>
//! ```
//!
//! # Quick start
//!
//! ```
//! use bilingual_tts::lang::{detect_language, select_voice, Language, VoiceDescriptor};
//!
//! let voices = vec![
//!     VoiceDescriptor::new("com.apple.voice.compact.zh-CN.Tingting", "Tingting"),
//!     VoiceDescriptor::new("com.apple.voice.compact.en-US.Samantha", "Samantha"),
//! ];
//!
//! let lang = detect_language("你好，世界");
//! assert_eq!(lang, Language::Zh);
//! assert_eq!(select_voice(lang, &voices).unwrap().display_name, "Tingting");
//! ```

pub mod detect;
pub mod voice;

pub use detect::{detect_language, Language};
pub use voice::{select_voice, VoiceDescriptor};
