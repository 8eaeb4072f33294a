//! Terminal color themes: a small built-in table plus inline JSON themes.

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

/// A color in RGB format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `#rgb`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| anyhow!("color must start with '#', got {s:?}"))?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("invalid hex color {s:?}");
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => bail!("color must be #rgb or #rrggbb, got {s:?}"),
        };
        let channel = |i: usize| {
            u8::from_str_radix(&expanded[i..i + 2], 16)
                .with_context(|| format!("invalid hex color {s:?}"))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Linear blend towards `other` by `t` in `0.0..=1.0`.
    pub fn mix(self, other: Rgb, t: f32) -> Rgb {
        let lerp = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Rgb::new(
            lerp(self.r, other.r),
            lerp(self.g, other.g),
            lerp(self.b, other.b),
        )
    }
}

/// Terminal color theme with 16 ANSI colors plus foreground/background/cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: String,
    pub foreground: Rgb,
    pub background: Rgb,
    pub cursor: Rgb,
    /// ANSI colors 0-15
    pub ansi: [Rgb; 16],
}

const fn hex(v: u32) -> Rgb {
    Rgb::new((v >> 16) as u8, (v >> 8) as u8, v as u8)
}

struct Palette {
    name: &'static str,
    foreground: u32,
    background: u32,
    cursor: u32,
    ansi: [u32; 16],
}

static BUILTIN: &[Palette] = &[
    Palette {
        name: "Default",
        foreground: 0xdddddd,
        background: 0x171717,
        cursor: 0xdddddd,
        ansi: [
            0x282a2e, 0xd74e6f, 0x31bb71, 0xd3e561, 0x8056ff, 0xed61d7, 0x04d7d7, 0xbfbfbf,
            0x4d4d4d, 0xfe5f86, 0x00d787, 0xebff71, 0x9b79ff, 0xff7af0, 0x00fefe, 0xe6e6e6,
        ],
    },
    Palette {
        name: "Dracula",
        foreground: 0xf8f8f2,
        background: 0x282a36,
        cursor: 0xf8f8f2,
        ansi: [
            0x21222c, 0xff5555, 0x50fa7b, 0xf1fa8c, 0xbd93f9, 0xff79c6, 0x8be9fd, 0xf8f8f2,
            0x6272a4, 0xff6e6e, 0x69ff94, 0xffffa5, 0xd6acff, 0xff92df, 0xa4ffff, 0xffffff,
        ],
    },
    Palette {
        name: "Nord",
        foreground: 0xd8dee9,
        background: 0x2e3440,
        cursor: 0xeceff4,
        ansi: [
            0x3b4252, 0xbf616a, 0xa3be8c, 0xebcb8b, 0x81a1c1, 0xb48ead, 0x88c0d0, 0xe5e9f0,
            0x4c566a, 0xbf616a, 0xa3be8c, 0xebcb8b, 0x81a1c1, 0xb48ead, 0x8fbcbb, 0xeceff4,
        ],
    },
    Palette {
        name: "Catppuccin Mocha",
        foreground: 0xcdd6f4,
        background: 0x1e1e2e,
        cursor: 0xf5e0dc,
        ansi: [
            0x45475a, 0xf38ba8, 0xa6e3a1, 0xf9e2af, 0x89b4fa, 0xf5c2e7, 0x94e2d5, 0xbac2de,
            0x585b70, 0xf38ba8, 0xa6e3a1, 0xf9e2af, 0x89b4fa, 0xf5c2e7, 0x94e2d5, 0xa6adc8,
        ],
    },
    Palette {
        name: "Solarized Dark",
        foreground: 0x839496,
        background: 0x002b36,
        cursor: 0x93a1a1,
        ansi: [
            0x073642, 0xdc322f, 0x859900, 0xb58900, 0x268bd2, 0xd33682, 0x2aa198, 0xeee8d5,
            0x002b36, 0xcb4b16, 0x586e75, 0x657b83, 0x839496, 0x6c71c4, 0x93a1a1, 0xfdf6e3,
        ],
    },
    Palette {
        name: "Gruvbox Dark",
        foreground: 0xebdbb2,
        background: 0x282828,
        cursor: 0xebdbb2,
        ansi: [
            0x282828, 0xcc241d, 0x98971a, 0xd79921, 0x458588, 0xb16286, 0x689d6a, 0xa89984,
            0x928374, 0xfb4934, 0xb8bb26, 0xfabd2f, 0x83a598, 0xd3869b, 0x8ec07c, 0xebdbb2,
        ],
    },
];

impl Palette {
    fn to_theme(&self) -> Theme {
        Theme {
            name: self.name.to_string(),
            foreground: hex(self.foreground),
            background: hex(self.background),
            cursor: hex(self.cursor),
            ansi: self.ansi.map(hex),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        BUILTIN[0].to_theme()
    }
}

/// Inline theme as written in a tape: every field optional, missing ones
/// fall back to the default theme.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ThemeSpec {
    name: Option<String>,
    foreground: Option<String>,
    background: Option<String>,
    cursor: Option<String>,
    // Accepted for compatibility with exported palettes; unused.
    #[allow(dead_code)]
    selection: Option<String>,
    #[allow(dead_code)]
    cursor_accent: Option<String>,
    black: Option<String>,
    red: Option<String>,
    green: Option<String>,
    yellow: Option<String>,
    blue: Option<String>,
    magenta: Option<String>,
    cyan: Option<String>,
    white: Option<String>,
    bright_black: Option<String>,
    bright_red: Option<String>,
    bright_green: Option<String>,
    bright_yellow: Option<String>,
    bright_blue: Option<String>,
    bright_magenta: Option<String>,
    bright_cyan: Option<String>,
    bright_white: Option<String>,
}

impl Theme {
    /// Look up a built-in theme by name, ignoring case.
    pub fn named(name: &str) -> Option<Self> {
        BUILTIN
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
            .map(Palette::to_theme)
    }

    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|p| p.name)
    }

    /// Decode an inline JSON theme.
    pub fn from_json(json: &str) -> Result<Self> {
        let spec: ThemeSpec = serde_json::from_str(json).context("invalid theme JSON")?;
        let mut theme = Theme::default();
        theme.name = spec.name.clone().unwrap_or_else(|| "Custom".to_string());

        let set = |slot: &mut Rgb, value: &Option<String>| -> Result<()> {
            if let Some(value) = value {
                *slot = Rgb::from_hex(value)?;
            }
            Ok(())
        };
        set(&mut theme.foreground, &spec.foreground)?;
        set(&mut theme.background, &spec.background)?;
        set(&mut theme.cursor, &spec.cursor)?;
        let ansi = [
            &spec.black,
            &spec.red,
            &spec.green,
            &spec.yellow,
            &spec.blue,
            &spec.magenta,
            &spec.cyan,
            &spec.white,
            &spec.bright_black,
            &spec.bright_red,
            &spec.bright_green,
            &spec.bright_yellow,
            &spec.bright_blue,
            &spec.bright_magenta,
            &spec.bright_cyan,
            &spec.bright_white,
        ];
        for (slot, value) in theme.ansi.iter_mut().zip(ansi) {
            set(slot, value)?;
        }
        Ok(theme)
    }

    /// Resolve a 256-color palette index.
    pub fn indexed(&self, index: u8) -> Rgb {
        match index {
            0..=15 => self.ansi[index as usize],
            16..=231 => {
                let i = index - 16;
                let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                Rgb::new(level(i / 36), level((i / 6) % 6), level(i % 6))
            }
            _ => {
                let v = 8 + (index - 232) * 10;
                Rgb::new(v, v, v)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        assert_eq!(Rgb::from_hex("#ff8000").unwrap(), Rgb::new(255, 128, 0));
        assert_eq!(Rgb::from_hex("#fff").unwrap(), Rgb::new(255, 255, 255));
        assert!(Rgb::from_hex("ff8000").is_err());
        assert!(Rgb::from_hex("#ff80").is_err());
        assert!(Rgb::from_hex("#gg0000").is_err());
        assert!(Rgb::from_hex("#aéaaa").is_err());
        assert!(Rgb::from_hex("#é").is_err());
    }

    #[test]
    fn test_named_lookup_is_case_insensitive() {
        let theme = Theme::named("dracula").unwrap();
        assert_eq!(theme.name, "Dracula");
        assert_eq!(theme.background, Rgb::new(0x28, 0x2a, 0x36));
        assert!(Theme::named("No Such Theme").is_none());
    }

    #[test]
    fn test_inline_theme_falls_back_to_default() {
        let theme = Theme::from_json(r##"{"background": "#000000", "brightRed": "#ff0000"}"##)
            .unwrap();
        assert_eq!(theme.background, Rgb::new(0, 0, 0));
        assert_eq!(theme.ansi[9], Rgb::new(255, 0, 0));
        assert_eq!(theme.foreground, Theme::default().foreground);
        assert_eq!(theme.name, "Custom");
    }

    #[test]
    fn test_inline_theme_rejects_unknown_keys() {
        assert!(Theme::from_json(r##"{"backgroud": "#000000"}"##).is_err());
    }

    #[test]
    fn test_indexed_palette() {
        let theme = Theme::default();
        assert_eq!(theme.indexed(1), theme.ansi[1]);
        assert_eq!(theme.indexed(16), Rgb::new(0, 0, 0));
        assert_eq!(theme.indexed(231), Rgb::new(255, 255, 255));
        assert_eq!(theme.indexed(232), Rgb::new(8, 8, 8));
    }
}
