//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Initial speaking parameters handed to the engine at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speaking rate in words per minute.  Not clamped.
    pub rate: i32,
    /// Output volume, clamped into `[0.0, 1.0]` when written to the engine.
    pub volume: f32,
    /// Skip the offline driver and always synthesise remotely.
    pub force_online: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 200,
            volume: 0.9,
            force_online: false,
        }
    }
}

// ---------------------------------------------------------------------------
// IsolationMode
// ---------------------------------------------------------------------------

/// Where the offline driver runs.
///
/// | Variant | Placement                                             |
/// |---------|-------------------------------------------------------|
/// | Auto    | `Process` on macOS, `Direct` everywhere else          |
/// | Direct  | On the engine's worker thread, watched by a watchdog  |
/// | Process | In a child process of this executable                 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    Auto,
    Direct,
    Process,
}

impl Default for IsolationMode {
    fn default() -> Self {
        Self::Auto
    }
}

impl IsolationMode {
    /// Resolve `Auto` against the host platform.
    pub fn resolve(self) -> IsolationMode {
        match self {
            IsolationMode::Auto if cfg!(target_os = "macos") => IsolationMode::Process,
            IsolationMode::Auto => IsolationMode::Direct,
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// OfflineConfig
// ---------------------------------------------------------------------------

/// Settings for the local device voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Whether the offline driver is probed at all.
    pub enabled: bool,
    /// Driver placement policy.
    pub isolation: IsolationMode,
    /// Hard ceiling for one offline utterance; the driver is force-stopped
    /// after this many seconds.
    pub watchdog_secs: u64,
    /// How often the watchdog looks at the cancellation flag.
    pub poll_interval_ms: u64,
    /// Explicit speech program (e.g. `"espeak"`).  `None` picks the platform
    /// default.
    pub program: Option<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            isolation: IsolationMode::default(),
            watchdog_secs: 30,
            poll_interval_ms: 100,
            program: None,
        }
    }
}

// ---------------------------------------------------------------------------
// OnlineConfig
// ---------------------------------------------------------------------------

/// Settings for the remote synthesis path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnlineConfig {
    /// Whether the online path may be used.
    pub enabled: bool,
    /// Base URL of the translate service; `/translate_tts` is appended.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Request the service's slow reading speed.
    pub slow: bool,
    /// Longest text fragment sent in a single request.
    pub max_chars_per_request: usize,
    /// Interval between player-busy polls.
    pub poll_interval_ms: u64,
}

impl Default for OnlineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://translate.google.com".into(),
            timeout_secs: 15,
            slow: false,
            max_chars_per_request: 100,
            poll_interval_ms: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use bilingual_tts::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert!(config.speech.volume <= 1.0);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub speech: SpeechConfig,
    pub offline: OfflineConfig,
    pub online: OnlineConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
