//! Recording settings with their defaults.
//!
//! Each `Set` statement replaces exactly one field; nothing is ever merged or
//! reverted.

use crate::command::{LoopOffset, Setting, WindowBar};
use crate::theme::{Rgb, Theme};
use regex::Regex;
use std::time::Duration;

pub const DEFAULT_FONT_FAMILY: &str = "JetBrains Mono,DejaVu Sans Mono,Menlo,Hack,monospace";
pub const DEFAULT_WAIT_PATTERN: &str = ">$";

#[derive(Debug, Clone)]
pub struct Settings {
    pub shell: String,
    pub font_family: String,
    pub font_size: f32,
    pub letter_spacing: f32,
    pub line_height: f32,
    pub theme: Theme,
    pub width: u32,
    pub height: u32,
    pub padding: u32,
    pub margin: u32,
    pub margin_fill: Option<Rgb>,
    pub border_radius: u32,
    pub window_bar: WindowBar,
    pub window_bar_size: u32,
    pub cursor_blink: bool,
    /// Delay between keystrokes. Zero sends text in one write.
    pub typing_speed: Duration,
    pub playback_speed: f64,
    pub framerate: u32,
    pub loop_offset: LoopOffset,
    pub wait_timeout: Duration,
    pub wait_pattern: Regex,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: 22.0,
            letter_spacing: 0.0,
            line_height: 1.0,
            theme: Theme::default(),
            width: 1200,
            height: 600,
            padding: 60,
            margin: 0,
            margin_fill: None,
            border_radius: 0,
            window_bar: WindowBar::None,
            window_bar_size: 30,
            cursor_blink: true,
            typing_speed: Duration::from_millis(50),
            playback_speed: 1.0,
            framerate: 50,
            loop_offset: LoopOffset::default(),
            wait_timeout: Duration::from_secs(15),
            wait_pattern: Regex::new(DEFAULT_WAIT_PATTERN).expect("default wait pattern is valid"),
        }
    }
}

impl Settings {
    /// Overwrite the field named by `setting`.
    pub fn apply(&mut self, setting: Setting) {
        match setting {
            Setting::Shell(v) => self.shell = v,
            Setting::FontFamily(v) => self.font_family = v,
            Setting::FontSize(v) => self.font_size = v,
            Setting::LetterSpacing(v) => self.letter_spacing = v,
            Setting::LineHeight(v) => self.line_height = v,
            Setting::Theme(v) => self.theme = v,
            Setting::Width(v) => self.width = v,
            Setting::Height(v) => self.height = v,
            Setting::Padding(v) => self.padding = v,
            Setting::Margin(v) => self.margin = v,
            Setting::MarginFill(v) => self.margin_fill = Some(v),
            Setting::BorderRadius(v) => self.border_radius = v,
            Setting::WindowBar(v) => self.window_bar = v,
            Setting::WindowBarSize(v) => self.window_bar_size = v,
            Setting::CursorBlink(v) => self.cursor_blink = v,
            Setting::TypingSpeed(v) => self.typing_speed = v,
            Setting::PlaybackSpeed(v) => self.playback_speed = v,
            Setting::Framerate(v) => self.framerate = v,
            Setting::LoopOffset(v) => self.loop_offset = v,
            Setting::WaitTimeout(v) => self.wait_timeout = v,
            Setting::WaitPattern(v) => self.wait_pattern = v,
        }
    }

    /// Capture interval implied by `framerate`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.framerate.max(1) as f64)
    }

    /// The subset of settings the screenshot rasterizer needs.
    pub fn style(&self) -> Style {
        Style {
            font_family: self.font_family.clone(),
            font_size: self.font_size,
            letter_spacing: self.letter_spacing,
            line_height: self.line_height,
            theme: self.theme.clone(),
            width: self.width,
            height: self.height,
            padding: self.padding,
            margin: self.margin,
            margin_fill: self.margin_fill,
            border_radius: self.border_radius,
            window_bar: self.window_bar,
            window_bar_size: self.window_bar_size,
            cursor_blink: self.cursor_blink,
        }
    }
}

/// Visual configuration handed to the terminal driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub font_family: String,
    pub font_size: f32,
    pub letter_spacing: f32,
    pub line_height: f32,
    pub theme: Theme,
    pub width: u32,
    pub height: u32,
    pub padding: u32,
    pub margin: u32,
    pub margin_fill: Option<Rgb>,
    pub border_radius: u32,
    pub window_bar: WindowBar,
    pub window_bar_size: u32,
    pub cursor_blink: bool,
}

impl Default for Style {
    fn default() -> Self {
        Settings::default().style()
    }
}
