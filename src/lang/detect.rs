//! Script-based language detection.
//!
//! The rule is deliberately coarse: a single CJK Unified Ideograph anywhere
//! in the text makes the whole request Chinese.  Everything else is English.

/// First and last codepoints of the CJK Unified Ideographs block.
const CJK_FIRST: char = '\u{4E00}';
const CJK_LAST: char = '\u{9FFF}';

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Language resolved from the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// Chinese (Mandarin).
    Zh,
    /// English, and the fallback for any non-CJK text.
    En,
}

impl Language {
    /// Short tag used in logs and the CLI status output.
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }

    /// Language code understood by the remote synthesis service.
    pub fn remote_code(&self) -> &'static str {
        match self {
            Language::Zh => "zh-CN",
            Language::En => "en",
        }
    }

    /// Lower-case substrings that mark a device voice as suitable for this
    /// language.  Matched against both the voice name and the voice id.
    pub fn voice_markers(&self) -> &'static [&'static str] {
        match self {
            Language::Zh => &["chinese", "zh", "mandarin"],
            Language::En => &["english", "en", "american"],
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// ---------------------------------------------------------------------------
// detect_language
// ---------------------------------------------------------------------------

/// Returns [`Language::Zh`] if any character of `text` is a CJK Unified
/// Ideograph (U+4E00..=U+9FFF), otherwise [`Language::En`].
///
/// Scans left to right and stops at the first hit.
///
/// ```
/// use bilingual_tts::lang::{detect_language, Language};
///
/// assert_eq!(detect_language("Hello你好"), Language::Zh);
/// assert_eq!(detect_language("Hello"), Language::En);
/// assert_eq!(detect_language(""), Language::En);
/// ```
pub fn detect_language(text: &str) -> Language {
    if text.chars().any(|c| (CJK_FIRST..=CJK_LAST).contains(&c)) {
        Language::Zh
    } else {
        Language::En
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
