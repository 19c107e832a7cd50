//! Local speech driver backed by the platform's speech program.
//!
//! | Platform       | Program                | Voice list           |
//! |----------------|------------------------|----------------------|
//! | macOS          | `say`                  | `say -v ?`           |
//! | Windows        | `powershell` + SAPI    | `GetInstalledVoices` |
//! | Linux / BSD    | `espeak-ng`, `espeak`  | `--voices`           |
//!
//! Every utterance is one child process.  [`SystemDriver::stop`] kills it;
//! [`SystemDriver::say_and_wait`] reaps it, so each child is released once.

use std::io::Write;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::engine::session::lock;
use crate::lang::VoiceDescriptor;

/// Interval at which `say_and_wait` checks whether its child has exited.
const REAP_INTERVAL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// DriverError
// ---------------------------------------------------------------------------

/// Errors raised by a local speech driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The speech program is not installed or not on `PATH`.
    #[error("speech program `{0}` not found")]
    ProgramMissing(String),

    /// Spawning or waiting on the speech program failed.
    #[error("speech program I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The speech program ran but reported failure.
    #[error("speech program exited with {0}")]
    Exit(ExitStatus),

    /// The utterance was cut short by [`LocalDriver::stop`].
    #[error("speech stopped")]
    Stopped,
}

impl DriverError {
    /// `true` when retrying this driver cannot succeed.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, DriverError::ProgramMissing(_))
    }

    fn from_spawn(program: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            DriverError::ProgramMissing(program.to_string())
        } else {
            DriverError::Io(err)
        }
    }
}

// ---------------------------------------------------------------------------
// LocalDriver trait
// ---------------------------------------------------------------------------

/// A device-resident speech driver.
///
/// The handle is owned by the offline adapter.  `say_and_wait` must only be
/// entered by one thread at a time; `stop` may be called from any thread.
pub trait LocalDriver: Send + Sync {
    /// Voices the driver can speak with.
    fn voices(&self) -> Result<Vec<VoiceDescriptor>, DriverError>;

    fn set_rate(&self, rate: i32);

    fn set_volume(&self, volume: f32);

    fn set_voice(&self, voice_id: &str);

    /// Speak `text` and block until playback ends.
    fn say_and_wait(&self, text: &str) -> Result<(), DriverError>;

    /// Abort the utterance in progress, if any.
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// SpeechProgram
// ---------------------------------------------------------------------------

/// Command-line dialect of the speech program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechProgram {
    /// macOS `say`.
    Say,
    /// `espeak-ng` or classic `espeak`.
    Espeak,
    /// Windows PowerShell driving `System.Speech`.
    Sapi,
}

impl SpeechProgram {
    /// Guess the dialect from an executable name or path.
    ///
    /// Both `/` and `\\` count as separators so Windows paths from a
    /// settings file are recognised on any host.
    pub fn from_executable(executable: &str) -> Self {
        let file = executable.rsplit(['/', '\\']).next().unwrap_or(executable);
        let stem = match file.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file,
        }
        .to_lowercase();
        match stem.as_str() {
            "say" => SpeechProgram::Say,
            "powershell" | "pwsh" => SpeechProgram::Sapi,
            _ => SpeechProgram::Espeak,
        }
    }

    /// Executables tried, in order, when no program is configured.
    pub fn platform_candidates() -> &'static [&'static str] {
        if cfg!(target_os = "macos") {
            &["say"]
        } else if cfg!(windows) {
            &["powershell"]
        } else {
            &["espeak-ng", "espeak"]
        }
    }
}

// ---------------------------------------------------------------------------
// DriverProps
// ---------------------------------------------------------------------------

/// Properties applied to the next utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverProps {
    pub rate: i32,
    pub volume: f32,
    pub voice: Option<String>,
}

impl Default for DriverProps {
    fn default() -> Self {
        Self {
            rate: 200,
            volume: 0.9,
            voice: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SystemDriver
// ---------------------------------------------------------------------------

/// [`LocalDriver`] that shells out to the platform speech program.
pub struct SystemDriver {
    program: SpeechProgram,
    executable: String,
    props: Mutex<DriverProps>,
    child: Mutex<Option<Child>>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for SystemDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemDriver")
            .field("program", &self.program)
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}

impl SystemDriver {
    /// Wrap `executable` without checking that it exists.
    pub fn new(executable: impl Into<String>) -> Self {
        let executable = executable.into();
        Self {
            program: SpeechProgram::from_executable(&executable),
            executable,
            props: Mutex::new(DriverProps::default()),
            child: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Find a working speech program.
    ///
    /// Uses `program` when given, otherwise the platform candidates in
    /// order.  A candidate counts as working when its voice listing runs.
    pub fn probe(program: Option<&str>) -> Result<Self, DriverError> {
        let candidates: Vec<&str> = match program {
            Some(p) => vec![p],
            None => SpeechProgram::platform_candidates().to_vec(),
        };

        let mut last_err = DriverError::ProgramMissing(candidates.join(", "));
        for candidate in candidates {
            let driver = Self::new(candidate);
            match driver.voices() {
                Ok(voices) => {
                    log::info!(
                        "offline driver `{candidate}` ready with {} voices",
                        voices.len()
                    );
                    return Ok(driver);
                }
                Err(e) => {
                    log::debug!("offline driver `{candidate}` unusable: {e}");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    pub fn program(&self) -> SpeechProgram {
        self.program
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn props(&self) -> DriverProps {
        lock(&self.props).clone()
    }

    fn spawn_speech(&self, text: &str) -> Result<Child, DriverError> {
        let props = self.props();
        let mut command = Command::new(&self.executable);
        command
            .args(speech_args(self.program, &props, text))
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        if self.program == SpeechProgram::Sapi {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command
            .spawn()
            .map_err(|e| DriverError::from_spawn(&self.executable, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // SAPI reads the text from stdin so no shell quoting is involved.
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DriverError::Io(e));
            }
        }
        Ok(child)
    }

    /// Poll the stored child until it exits or is taken away by `stop`.
    fn wait_for_child(&self) -> Result<ExitStatus, DriverError> {
        loop {
            {
                let mut slot = lock(&self.child);
                let Some(child) = slot.as_mut() else {
                    return Err(DriverError::Stopped);
                };
                if let Some(status) = child.try_wait()? {
                    slot.take();
                    return Ok(status);
                }
            }
            std::thread::sleep(REAP_INTERVAL);
        }
    }
}

impl LocalDriver for SystemDriver {
    fn voices(&self) -> Result<Vec<VoiceDescriptor>, DriverError> {
        let mut command = Command::new(&self.executable);
        command.args(voice_list_args(self.program)).stdin(Stdio::null());

        let output = command
            .output()
            .map_err(|e| DriverError::from_spawn(&self.executable, e))?;
        if !output.status.success() {
            return Err(DriverError::Exit(output.status));
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        Ok(parse_voice_list(self.program, &listing))
    }

    fn set_rate(&self, rate: i32) {
        lock(&self.props).rate = rate;
    }

    fn set_volume(&self, volume: f32) {
        lock(&self.props).volume = volume;
    }

    fn set_voice(&self, voice_id: &str) {
        lock(&self.props).voice = Some(voice_id.to_string());
    }

    fn say_and_wait(&self, text: &str) -> Result<(), DriverError> {
        self.stopped.store(false, Ordering::SeqCst);
        let child = self.spawn_speech(text)?;
        {
            let mut slot = lock(&self.child);
            let child = slot.insert(child);
            // A stop that raced the spawn found no child to kill.
            if self.stopped.load(Ordering::SeqCst) {
                let _ = child.kill();
            }
        }

        let status = self.wait_for_child()?;
        if self.stopped.load(Ordering::SeqCst) {
            Err(DriverError::Stopped)
        } else if status.success() {
            Ok(())
        } else {
            Err(DriverError::Exit(status))
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(child) = lock(&self.child).as_mut() {
            if let Err(e) = child.kill() {
                log::debug!("offline driver: kill failed: {e}");
            }
        }
    }
}

impl Drop for SystemDriver {
    fn drop(&mut self) {
        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

// ---------------------------------------------------------------------------
// Command lines
// ---------------------------------------------------------------------------

/// Arguments that make `program` speak `text` with `props`.
///
/// For [`SpeechProgram::Sapi`] the text itself is written to stdin.
pub fn speech_args(program: SpeechProgram, props: &DriverProps, text: &str) -> Vec<String> {
    match program {
        SpeechProgram::Say => {
            let mut args = vec!["-r".to_string(), props.rate.to_string()];
            if let Some(voice) = &props.voice {
                args.push("-v".into());
                args.push(voice.clone());
            }
            args.push("--".into());
            // `say` has no volume flag; the embedded command sets it.
            args.push(format!("[[volm {:.2}]] {text}", props.volume));
            args
        }
        SpeechProgram::Espeak => {
            let amplitude = (props.volume * 100.0).round() as i32;
            let mut args = vec![
                "-s".to_string(),
                props.rate.to_string(),
                "-a".to_string(),
                amplitude.to_string(),
            ];
            if let Some(voice) = &props.voice {
                args.push("-v".into());
                args.push(voice.clone());
            }
            args.push("--".into());
            args.push(text.to_string());
            args
        }
        SpeechProgram::Sapi => {
            let mut script = String::from(
                "Add-Type -AssemblyName System.Speech; \
                 $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; ",
            );
            script.push_str(&format!(
                "$s.Rate = {}; $s.Volume = {}; ",
                sapi_rate(props.rate),
                (props.volume * 100.0).round() as i32
            ));
            if let Some(voice) = &props.voice {
                script.push_str(&format!("$s.SelectVoice('{}'); ", voice.replace('\'', "''")));
            }
            script.push_str("$s.Speak([Console]::In.ReadToEnd())");
            vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-Command".into(),
                script,
            ]
        }
    }
}

/// SAPI rates run from -10 to 10 around a nominal 200 words per minute.
fn sapi_rate(rate: i32) -> i32 {
    (rate.saturating_sub(200) / 20).clamp(-10, 10)
}

fn voice_list_args(program: SpeechProgram) -> Vec<String> {
    match program {
        SpeechProgram::Say => vec!["-v".into(), "?".into()],
        SpeechProgram::Espeak => vec!["--voices".into()],
        SpeechProgram::Sapi => vec![
            "-NoProfile".into(),
            "-NonInteractive".into(),
            "-Command".into(),
            "Add-Type -AssemblyName System.Speech; \
             (New-Object System.Speech.Synthesis.SpeechSynthesizer).GetInstalledVoices() | \
             ForEach-Object { $_.VoiceInfo.Name + '|' + $_.VoiceInfo.Culture.Name }"
                .into(),
        ],
    }
}

// ---------------------------------------------------------------------------
// Voice list parsing
// ---------------------------------------------------------------------------

/// Parse the program's voice listing into descriptors, in listing order.
pub fn parse_voice_list(program: SpeechProgram, listing: &str) -> Vec<VoiceDescriptor> {
    match program {
        SpeechProgram::Say => listing.lines().filter_map(parse_say_line).collect(),
        SpeechProgram::Espeak => listing.lines().skip(1).filter_map(parse_espeak_line).collect(),
        SpeechProgram::Sapi => listing.lines().filter_map(parse_sapi_line).collect(),
    }
}

/// `Tingting             zh_CN    # 你好！我叫婷婷。`
fn parse_say_line(line: &str) -> Option<VoiceDescriptor> {
    let head = line.split('#').next()?.trim();
    let (name, locale) = head.rsplit_once(char::is_whitespace)?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(VoiceDescriptor::new(name, format!("{name} ({locale})")))
}

/// ` 5  cmn             --/M      Chinese_(Mandarin) sit/cmn   (zh-cmn 5)(zh 5)`
fn parse_espeak_line(line: &str) -> Option<VoiceDescriptor> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let language = parts.get(1)?;
    let name = parts.get(3)?;
    Some(VoiceDescriptor::new(*language, format!("{name} ({language})")))
}

/// `Microsoft Huihui Desktop|zh-CN`
fn parse_sapi_line(line: &str) -> Option<VoiceDescriptor> {
    let (name, culture) = line.trim().split_once('|')?;
    if name.is_empty() {
        return None;
    }
    Some(VoiceDescriptor::new(name, format!("{name} ({culture})")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{select_voice, Language};

    const SAY_LISTING: &str = "\
Samantha            en_US    # Hello, my name is Samantha.
Bad News            en_US    # The light you see at the end of the tunnel.
Tingting            zh_CN    # 你好！我叫婷婷。
";

    const ESPEAK_LISTING: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 5  cmn             --/M      Chinese_(Mandarin) sit/cmn              (zh-cmn 5)(zh 5)
 2  en-us           --/M      English_(America)  gmw/en-US            (en 3)
";

    #[test]
    fn program_guessed_from_executable() {
        assert_eq!(SpeechProgram::from_executable("say"), SpeechProgram::Say);
        assert_eq!(
            SpeechProgram::from_executable("/usr/bin/espeak-ng"),
            SpeechProgram::Espeak
        );
        assert_eq!(
            SpeechProgram::from_executable("C:\\Windows\\powershell.exe"),
            SpeechProgram::Sapi
        );
        assert_eq!(SpeechProgram::from_executable("pwsh"), SpeechProgram::Sapi);
    }

    #[test]
    fn program_guess_ignores_host_path_style() {
        assert_eq!(
            SpeechProgram::from_executable("C:/Program Files/PowerShell/7/pwsh.exe"),
            SpeechProgram::Sapi
        );
        assert_eq!(
            SpeechProgram::from_executable("D:\\tools\\espeak-ng.exe"),
            SpeechProgram::Espeak
        );
        assert_eq!(SpeechProgram::from_executable("/usr/bin/say"), SpeechProgram::Say);
        assert_eq!(SpeechProgram::from_executable("SAY"), SpeechProgram::Say);
    }

    #[test]
    fn say_listing_keeps_multi_word_names() {
        let voices = parse_voice_list(SpeechProgram::Say, SAY_LISTING);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[1].id, "Bad News");
        assert_eq!(voices[2].display_name, "Tingting (zh_CN)");
    }

    #[test]
    fn say_listing_selects_by_locale() {
        let voices = parse_voice_list(SpeechProgram::Say, SAY_LISTING);
        assert_eq!(select_voice(Language::Zh, &voices).unwrap().id, "Tingting");
        assert_eq!(select_voice(Language::En, &voices).unwrap().id, "Samantha");
    }

    #[test]
    fn espeak_listing_skips_header() {
        let voices = parse_voice_list(SpeechProgram::Espeak, ESPEAK_LISTING);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].id, "af");
        assert_eq!(voices[1].id, "cmn");
        assert_eq!(voices[1].display_name, "Chinese_(Mandarin) (cmn)");
    }

    #[test]
    fn espeak_listing_selects_mandarin() {
        let voices = parse_voice_list(SpeechProgram::Espeak, ESPEAK_LISTING);
        assert_eq!(select_voice(Language::Zh, &voices).unwrap().id, "cmn");
        assert_eq!(select_voice(Language::En, &voices).unwrap().id, "en-us");
    }

    #[test]
    fn sapi_listing_parses_name_and_culture() {
        let voices = parse_voice_list(
            SpeechProgram::Sapi,
            "Microsoft Huihui Desktop|zh-CN\r\nMicrosoft Zira Desktop|en-US\r\n\r\n",
        );
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].id, "Microsoft Huihui Desktop");
        assert_eq!(voices[1].display_name, "Microsoft Zira Desktop (en-US)");
    }

    #[test]
    fn espeak_args_carry_rate_amplitude_and_voice() {
        let props = DriverProps {
            rate: 180,
            volume: 0.5,
            voice: Some("cmn".into()),
        };
        let args = speech_args(SpeechProgram::Espeak, &props, "你好");
        assert_eq!(args, vec!["-s", "180", "-a", "50", "-v", "cmn", "--", "你好"]);
    }

    #[test]
    fn say_args_embed_volume() {
        let props = DriverProps {
            rate: 200,
            volume: 0.9,
            voice: None,
        };
        let args = speech_args(SpeechProgram::Say, &props, "hello");
        assert_eq!(args, vec!["-r", "200", "--", "[[volm 0.90]] hello"]);
    }

    #[test]
    fn sapi_script_escapes_voice_and_reads_stdin() {
        let props = DriverProps {
            rate: 300,
            volume: 1.0,
            voice: Some("O'Brien".into()),
        };
        let args = speech_args(SpeechProgram::Sapi, &props, "ignored");
        let script = args.last().unwrap();
        assert!(script.contains("$s.Rate = 5;"));
        assert!(script.contains("$s.Volume = 100;"));
        assert!(script.contains("SelectVoice('O''Brien')"));
        assert!(script.contains("[Console]::In.ReadToEnd()"));
        assert!(!script.contains("ignored"));
    }

    #[test]
    fn sapi_rate_is_bounded() {
        assert_eq!(sapi_rate(200), 0);
        assert_eq!(sapi_rate(-1000), -10);
        assert_eq!(sapi_rate(1000), 10);
        assert_eq!(sapi_rate(i32::MIN), -10);
        assert_eq!(sapi_rate(i32::MAX), 10);
    }

    #[test]
    fn setters_update_props() {
        let driver = SystemDriver::new("espeak-ng");
        driver.set_rate(120);
        driver.set_volume(0.3);
        driver.set_voice("en-us");
        assert_eq!(
            driver.props(),
            DriverProps {
                rate: 120,
                volume: 0.3,
                voice: Some("en-us".into()),
            }
        );
    }

    #[test]
    fn missing_program_is_reported() {
        let err = SystemDriver::probe(Some("definitely-not-a-speech-program-xyz")).unwrap_err();
        assert!(err.is_unrecoverable());
    }

    #[test]
    fn say_and_wait_on_missing_program_fails_cleanly() {
        let driver = SystemDriver::new("definitely-not-a-speech-program-xyz");
        let err = driver.say_and_wait("hello").unwrap_err();
        assert!(matches!(err, DriverError::ProgramMissing(_)));
    }

    #[test]
    fn stop_without_utterance_is_harmless() {
        let driver = SystemDriver::new("espeak-ng");
        driver.stop();
    }
}
