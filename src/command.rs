//! The tape AST: one [`Command`] per top-level statement.
//!
//! Verbs form a closed set, so commands are a plain enum rather than trait
//! objects. Adding a verb means adding a variant, and every `match` in the
//! engine has to handle it before the crate compiles again.

use crate::theme::{Rgb, Theme};
use regex::Regex;
use std::path::PathBuf;
use std::time::Duration;

/// Source position of a statement, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// A parsed statement together with where it came from.
#[derive(Debug, Clone)]
pub struct Command {
    pub kind: CommandKind,
    pub position: Position,
    /// Tape file the statement was read from, `None` for the top-level input.
    pub file: Option<PathBuf>,
}

impl Command {
    pub fn new(kind: CommandKind, position: Position) -> Self {
        Self {
            kind,
            position,
            file: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[derive(Debug, Clone)]
pub enum CommandKind {
    /// Type text. `speed` overrides the `TypingSpeed` setting for this statement.
    Type {
        text: String,
        speed: Option<Duration>,
    },
    Key(KeyPress),
    Sleep(Duration),
    Wait(WaitSpec),
    Set(Setting),
    Output(OutputTarget),
    Require(String),
    Hide,
    Show,
    Screenshot(PathBuf),
    Source(PathBuf),
    Env {
        name: String,
        value: String,
    },
    Copy(String),
    Paste {
        speed: Option<Duration>,
    },
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Type { .. } => "Type",
            CommandKind::Key(_) => "Key",
            CommandKind::Sleep(_) => "Sleep",
            CommandKind::Wait(_) => "Wait",
            CommandKind::Set(_) => "Set",
            CommandKind::Output(_) => "Output",
            CommandKind::Require(_) => "Require",
            CommandKind::Hide => "Hide",
            CommandKind::Show => "Show",
            CommandKind::Screenshot(_) => "Screenshot",
            CommandKind::Source(_) => "Source",
            CommandKind::Env { .. } => "Env",
            CommandKind::Copy(_) => "Copy",
            CommandKind::Paste { .. } => "Paste",
        }
    }
}

/// Named keys that have a dedicated verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
    Space,
    Backspace,
    Delete,
    Insert,
    Escape,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    /// A printable character, only reachable through a modifier chord.
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.ctrl || self.alt || self.shift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
    pub repeat: u32,
    /// Pause between repeats, `TypingSpeed` when unset.
    pub speed: Option<Duration>,
}

impl KeyPress {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
            repeat: 1,
            speed: None,
        }
    }
}

/// Which part of the visible text a `Wait` matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitScope {
    /// The last non-empty line.
    #[default]
    Line,
    Screen,
}

#[derive(Debug, Clone)]
pub struct WaitSpec {
    pub scope: WaitScope,
    /// Per-statement timeout, wins over `WaitTimeout`.
    pub timeout: Option<Duration>,
    /// Condition regex, `WaitPattern` when unset.
    pub pattern: Option<Regex>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowBar {
    #[default]
    None,
    Colorful,
    ColorfulRight,
    Rings,
    RingsRight,
}

impl WindowBar {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "" | "None" => WindowBar::None,
            "Colorful" => WindowBar::Colorful,
            "ColorfulRight" => WindowBar::ColorfulRight,
            "Rings" => WindowBar::Rings,
            "RingsRight" => WindowBar::RingsRight,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopOffset {
    Frames(u32),
    Percent(f64),
}

impl Default for LoopOffset {
    fn default() -> Self {
        LoopOffset::Frames(0)
    }
}

/// One typed `Set` assignment.
#[derive(Debug, Clone)]
pub enum Setting {
    Shell(String),
    FontFamily(String),
    FontSize(f32),
    LetterSpacing(f32),
    LineHeight(f32),
    Theme(Theme),
    Width(u32),
    Height(u32),
    Padding(u32),
    Margin(u32),
    MarginFill(Rgb),
    BorderRadius(u32),
    WindowBar(WindowBar),
    WindowBarSize(u32),
    CursorBlink(bool),
    TypingSpeed(Duration),
    PlaybackSpeed(f64),
    Framerate(u32),
    LoopOffset(LoopOffset),
    WaitTimeout(Duration),
    WaitPattern(Regex),
}

impl Setting {
    pub const NAMES: &'static [&'static str] = &[
        "Shell",
        "FontFamily",
        "FontSize",
        "LetterSpacing",
        "LineHeight",
        "Theme",
        "Width",
        "Height",
        "Padding",
        "Margin",
        "MarginFill",
        "BorderRadius",
        "WindowBar",
        "WindowBarSize",
        "CursorBlink",
        "TypingSpeed",
        "PlaybackSpeed",
        "Framerate",
        "LoopOffset",
        "WaitTimeout",
        "WaitPattern",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Setting::Shell(_) => "Shell",
            Setting::FontFamily(_) => "FontFamily",
            Setting::FontSize(_) => "FontSize",
            Setting::LetterSpacing(_) => "LetterSpacing",
            Setting::LineHeight(_) => "LineHeight",
            Setting::Theme(_) => "Theme",
            Setting::Width(_) => "Width",
            Setting::Height(_) => "Height",
            Setting::Padding(_) => "Padding",
            Setting::Margin(_) => "Margin",
            Setting::MarginFill(_) => "MarginFill",
            Setting::BorderRadius(_) => "BorderRadius",
            Setting::WindowBar(_) => "WindowBar",
            Setting::WindowBarSize(_) => "WindowBarSize",
            Setting::CursorBlink(_) => "CursorBlink",
            Setting::TypingSpeed(_) => "TypingSpeed",
            Setting::PlaybackSpeed(_) => "PlaybackSpeed",
            Setting::Framerate(_) => "Framerate",
            Setting::LoopOffset(_) => "LoopOffset",
            Setting::WaitTimeout(_) => "WaitTimeout",
            Setting::WaitPattern(_) => "WaitPattern",
        }
    }

    /// Settings that change the rendered terminal and need a restyle when the
    /// terminal is already running.
    pub fn affects_style(&self) -> bool {
        matches!(
            self,
            Setting::FontFamily(_)
                | Setting::FontSize(_)
                | Setting::LetterSpacing(_)
                | Setting::LineHeight(_)
                | Setting::Theme(_)
                | Setting::Width(_)
                | Setting::Height(_)
                | Setting::Padding(_)
                | Setting::Margin(_)
                | Setting::MarginFill(_)
                | Setting::BorderRadius(_)
                | Setting::WindowBar(_)
                | Setting::WindowBarSize(_)
                | Setting::CursorBlink(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Gif,
    Mp4,
    Webm,
    /// Text snapshots of the visible frames.
    Text,
    /// Every captured frame as a numbered PNG, hidden ones included.
    Frames,
}

impl OutputFormat {
    /// Infer the format from a path: a trailing separator means a frame
    /// directory, otherwise the extension decides.
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with('/') || path.ends_with(std::path::MAIN_SEPARATOR) {
            return Some(OutputFormat::Frames);
        }
        let ext = std::path::Path::new(path)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        Some(match ext.as_str() {
            "gif" => OutputFormat::Gif,
            "mp4" => OutputFormat::Mp4,
            "webm" => OutputFormat::Webm,
            "txt" | "ascii" => OutputFormat::Text,
            _ => return None,
        })
    }

    /// Formats produced by the external encoder.
    pub fn needs_encoder(self) -> bool {
        matches!(self, OutputFormat::Gif | OutputFormat::Mp4 | OutputFormat::Webm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_path() {
        assert_eq!(OutputFormat::from_path("out.gif"), Some(OutputFormat::Gif));
        assert_eq!(OutputFormat::from_path("a/b.MP4"), Some(OutputFormat::Mp4));
        assert_eq!(OutputFormat::from_path("x.webm"), Some(OutputFormat::Webm));
        assert_eq!(OutputFormat::from_path("x.ascii"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_path("frames/"), Some(OutputFormat::Frames));
        assert_eq!(OutputFormat::from_path("x.png"), None);
        assert_eq!(OutputFormat::from_path("noext"), None);
    }

    #[test]
    fn test_setting_names_cover_every_variant() {
        let settings = [
            Setting::Shell("bash".into()).name(),
            Setting::WaitPattern(Regex::new(">$").unwrap()).name(),
            Setting::LoopOffset(LoopOffset::Percent(50.0)).name(),
        ];
        for name in settings {
            assert!(Setting::NAMES.contains(&name));
        }
    }
}
