//! Line commands of the interactive mode and the bundled demo script.
//!
//! Parsing is pure so the command surface can be tested without a terminal.

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    /// Blank line; ignored.
    Empty,
    Quit,
    Help,
    /// Print availability, config and last session state.
    Status,
    /// Print the offline voice snapshot.
    Voices,
    Rate(i32),
    Volume(f32),
    /// `:online` forces remote synthesis, `:offline` restores the fallback
    /// order.
    ForceOnline(bool),
    Speak(String),
    /// A `:` command that could not be parsed; carries the message to show.
    Invalid(String),
}

/// Interpret one line typed at the prompt.
///
/// Lines starting with `:` are commands; `quit`, `exit` and `退出` end the
/// session; everything else is text to speak.
pub fn parse_line(line: &str) -> ShellCommand {
    let line = line.trim();
    if line.is_empty() {
        return ShellCommand::Empty;
    }
    if matches!(line.to_lowercase().as_str(), "quit" | "exit" | "q" | "退出") {
        return ShellCommand::Quit;
    }

    let Some(command) = line.strip_prefix(':') else {
        return ShellCommand::Speak(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next();

    match (name.as_str(), arg) {
        ("q" | "quit" | "exit", _) => ShellCommand::Quit,
        ("h" | "help", _) => ShellCommand::Help,
        ("status", _) => ShellCommand::Status,
        ("voices", _) => ShellCommand::Voices,
        ("online", _) => ShellCommand::ForceOnline(true),
        ("offline", _) => ShellCommand::ForceOnline(false),
        ("rate", Some(value)) => match value.parse() {
            Ok(rate) => ShellCommand::Rate(rate),
            Err(_) => ShellCommand::Invalid(format!("not a rate: {value}")),
        },
        ("volume", Some(value)) => match value.parse::<f32>() {
            Ok(volume) if volume.is_finite() => ShellCommand::Volume(volume),
            _ => ShellCommand::Invalid(format!("not a volume: {value}")),
        },
        ("rate" | "volume", None) => ShellCommand::Invalid(format!(":{name} needs a value")),
        _ => ShellCommand::Invalid(format!("unknown command :{name} (try :help)")),
    }
}

pub const HELP: &str = "\
Type text to speak it.
  :rate N       speaking rate in words per minute
  :volume F     volume between 0.0 and 1.0
  :online       always use remote synthesis
  :offline      prefer the local voice again
  :voices       list local voices
  :status       show engine status
  quit | exit | 退出";

// ---------------------------------------------------------------------------
// Demo script
// ---------------------------------------------------------------------------

/// One step of `--demo`.
#[derive(Debug, Clone, Copy)]
pub struct DemoItem {
    pub title: &'static str,
    pub text: &'static str,
    pub rate: Option<i32>,
    pub volume: Option<f32>,
    pub force_online: bool,
}

const fn item(title: &'static str, text: &'static str) -> DemoItem {
    DemoItem {
        title,
        text,
        rate: None,
        volume: None,
        force_online: false,
    }
}

pub const DEMO: &[DemoItem] = &[
    item("Chinese", "你好，欢迎使用文字转语音程序！"),
    item("English", "Hello, welcome to the text-to-speech program!"),
    DemoItem {
        rate: Some(100),
        ..item("Slow rate", "这是一个慢速语音测试")
    },
    DemoItem {
        rate: Some(300),
        ..item("Fast rate", "这是一个快速语音测试")
    },
    DemoItem {
        volume: Some(0.5),
        ..item("Half volume", "这是音量测试")
    },
    DemoItem {
        force_online: true,
        ..item("Online voice", "测试在线语音引擎")
    },
    item("Mixed", "Hello你好，这是中英文混合测试"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_spoken_trimmed() {
        assert_eq!(
            parse_line("  你好，世界  "),
            ShellCommand::Speak("你好，世界".into())
        );
    }

    #[test]
    fn blank_line_is_empty() {
        assert_eq!(parse_line("   \t"), ShellCommand::Empty);
    }

    #[test]
    fn quit_words() {
        for word in ["quit", "EXIT", "q", "退出", ":quit"] {
            assert_eq!(parse_line(word), ShellCommand::Quit, "{word}");
        }
    }

    #[test]
    fn rate_and_volume_commands() {
        assert_eq!(parse_line(":rate 150"), ShellCommand::Rate(150));
        assert_eq!(parse_line(":rate -100"), ShellCommand::Rate(-100));
        assert_eq!(parse_line(":volume 2.0"), ShellCommand::Volume(2.0));
    }

    #[test]
    fn bad_values_are_invalid() {
        assert!(matches!(parse_line(":rate fast"), ShellCommand::Invalid(_)));
        assert!(matches!(parse_line(":volume NaN"), ShellCommand::Invalid(_)));
        assert!(matches!(parse_line(":volume"), ShellCommand::Invalid(_)));
        assert!(matches!(parse_line(":frobnicate"), ShellCommand::Invalid(_)));
    }

    #[test]
    fn routing_toggles() {
        assert_eq!(parse_line(":online"), ShellCommand::ForceOnline(true));
        assert_eq!(parse_line(":Offline"), ShellCommand::ForceOnline(false));
        assert_eq!(parse_line(":voices"), ShellCommand::Voices);
        assert_eq!(parse_line(":status"), ShellCommand::Status);
    }

    #[test]
    fn demo_covers_both_languages_and_online() {
        use crate::lang::{detect_language, Language};

        assert!(DEMO.iter().any(|d| detect_language(d.text) == Language::Zh));
        assert!(DEMO.iter().any(|d| detect_language(d.text) == Language::En));
        assert!(DEMO.iter().any(|d| d.force_online));
    }
}
