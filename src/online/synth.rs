//! Remote text-to-speech synthesis.
//!
//! [`TranslateTts`] talks to the public translate TTS endpoint, which
//! answers one MP3 fragment per `GET /translate_tts` request.  Long text is
//! split into fragments of at most `max_chars_per_request` characters and the
//! answers are concatenated; MP3 frames survive plain concatenation.

use std::io::Write;
use std::time::Duration;

use crate::config::OnlineConfig;
use crate::engine::CancelToken;
use crate::lang::Language;

use super::OnlineError;

/// Characters after which a fragment may end.
const BREAK_CHARS: &[char] = &[
    '.', ',', '!', '?', ';', ':', '，', '。', '！', '？', '；', '：', '、',
];

const USER_AGENT: &str = concat!("bilingual-tts/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RemoteSynthesizer trait
// ---------------------------------------------------------------------------

/// Turns text into encoded audio written to `out`.
///
/// Blocking.  `cancel` is only consulted between requests; a request in
/// flight always runs to completion or timeout.
pub trait RemoteSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        language: Language,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<(), OnlineError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: &dyn RemoteSynthesizer) {}
};

// ---------------------------------------------------------------------------
// TranslateTts
// ---------------------------------------------------------------------------

/// Synthesizer backed by the translate service's TTS endpoint.
#[derive(Debug, Clone)]
pub struct TranslateTts {
    base_url: String,
    timeout: Duration,
    slow: bool,
    max_chars: usize,
}

impl TranslateTts {
    pub fn from_config(config: &OnlineConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            slow: config.slow,
            max_chars: config.max_chars_per_request.max(1),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/translate_tts", self.base_url)
    }

    /// Query string for fragment `idx` of `total`.
    fn query(
        &self,
        fragment: &str,
        language: Language,
        idx: usize,
        total: usize,
    ) -> Vec<(&'static str, String)> {
        let speed = if self.slow { "0.3" } else { "1" };
        vec![
            ("ie", "UTF-8".to_string()),
            ("q", fragment.to_string()),
            ("tl", language.remote_code().to_string()),
            ("client", "tw-ob".to_string()),
            ("ttsspeed", speed.to_string()),
            ("total", total.to_string()),
            ("idx", idx.to_string()),
            ("textlen", fragment.chars().count().to_string()),
        ]
    }
}

impl RemoteSynthesizer for TranslateTts {
    fn synthesize(
        &self,
        text: &str,
        language: Language,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<(), OnlineError> {
        let fragments = split_text(text, self.max_chars);
        if fragments.is_empty() {
            return Err(OnlineError::EmptyAudio);
        }

        // Built here rather than at construction: the blocking client owns
        // its own runtime and must not be created or dropped inside tokio.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let url = self.endpoint();
        let total = fragments.len();
        let mut written = 0usize;

        for (idx, fragment) in fragments.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(OnlineError::Cancelled);
            }
            log::debug!("tts request {}/{total} ({language})", idx + 1);

            let response = client
                .get(&url)
                .query(&self.query(fragment, language, idx, total))
                .send()?;

            let status = response.status();
            if !status.is_success() {
                return Err(OnlineError::Status(status.as_u16()));
            }

            let bytes = response.bytes()?;
            out.write_all(&bytes)?;
            written += bytes.len();
        }

        out.flush()?;
        if written == 0 {
            return Err(OnlineError::EmptyAudio);
        }
        log::debug!("tts: {written} bytes in {total} fragment(s)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// split_text
// ---------------------------------------------------------------------------

fn is_break(c: char) -> bool {
    c.is_whitespace() || BREAK_CHARS.contains(&c)
}

/// Split `text` into trimmed fragments of at most `max_chars` characters.
///
/// Prefers to end a fragment right after punctuation or whitespace; a run
/// with no break point is cut hard at the limit.  Never splits inside a
/// character.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut fragments = Vec::new();
    let mut rest = text.trim();

    while !rest.is_empty() {
        let Some((limit, _)) = rest.char_indices().nth(max_chars) else {
            fragments.push(rest.to_string());
            break;
        };

        let cut = rest[..limit]
            .char_indices()
            .rev()
            .find(|&(_, c)| is_break(c))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(limit);

        let (head, tail) = rest.split_at(cut);
        let head = head.trim();
        if !head.is_empty() {
            fragments.push(head.to_string());
        }
        rest = tail.trim_start();
    }

    fragments
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
