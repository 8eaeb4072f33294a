//! Recursive-descent parser for the tape language.
//!
//! The top-level entry points are [`parse`], [`parse_str`] and [`parse_file`].
//! Statements are line-oriented: a statement's arguments must sit on the same
//! line as its keyword. When a statement fails to parse the error is recorded
//! and the parser skips to the next line, so one pass reports every
//! detectable error.

use crate::command::{
    Command, CommandKind, Key, KeyPress, LoopOffset, Modifiers, OutputFormat, OutputTarget,
    Position, Setting, WaitScope, WaitSpec, WindowBar,
};
use crate::diagnostics::Diagnostic;
use crate::error::Error;
use crate::lexer::{Keyword, Token, TokenKind, tokenize};
use crate::theme::{Rgb, Theme};
use anyhow::{Context as _, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for a key repeat count.
const MAX_REPEAT: u32 = 10_000;

/// A syntax error at a 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn at(token: &Token, message: impl Into<String>) -> Self {
        Self {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }
}

/// Result of a parse: every statement that parsed, plus every error found.
#[derive(Debug, Default)]
pub struct Parsed {
    pub commands: Vec<Command>,
    pub errors: Vec<ParseError>,
}

impl Parsed {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse a tape, returning the AST and all syntax errors.
///
/// # Example
///
/// ```
/// let parsed = tapetty::parse("Type \"ls\"\nEnter\nSleep oops\n");
/// assert_eq!(parsed.commands.len(), 2);
/// assert_eq!(parsed.errors.len(), 1);
/// assert_eq!(parsed.errors[0].line, 3);
/// ```
pub fn parse(content: &str) -> Parsed {
    let mut parser = Parser::new(tokenize(content));
    let commands = parser.parse();
    Parsed {
        commands,
        errors: parser.into_errors(),
    }
}

/// Parse a tape, failing with [`Error::Parse`] if any statement is invalid.
pub fn parse_str(content: &str) -> Result<Vec<Command>, Error> {
    let parsed = parse(content);
    if parsed.is_valid() {
        Ok(parsed.commands)
    } else {
        Err(Error::Parse(parsed.errors))
    }
}

/// Parse a complete tape and splice in its `Source`d files.
///
/// Blank input is [`Error::EmptyInput`], a usage error rather than a parse
/// error. Returns the flattened commands plus warnings from splicing.
pub fn load(content: &str, base_dir: &Path) -> Result<(Vec<Command>, Vec<Diagnostic>), Error> {
    if content.trim().is_empty() {
        return Err(Error::EmptyInput);
    }
    let commands = parse_str(content)?;
    resolve_sources(commands, base_dir)
}

/// Parse a tape from a file. Each command records the file it came from.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Command>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tape file: {}", path.display()))?;
    let mut commands = parse_str(&content)?;
    for command in &mut commands {
        command.file = Some(path.to_path_buf());
    }
    Ok(commands)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    /// Parse every statement, recording errors as they are found.
    pub fn parse(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            let start = self.advance();
            let position = Position {
                line: start.line,
                column: start.column,
            };
            let result = self
                .parse_statement(&start)
                .and_then(|kind| self.expect_end_of_statement(&start).map(|_| kind));
            match result {
                Ok(kind) => commands.push(Command::new(kind, position)),
                Err(err) => {
                    self.record(err);
                    self.skip_line(start.line);
                }
            }
        }
        commands
    }

    fn record(&mut self, err: ParseError) {
        if !self.errors.contains(&err) {
            self.errors.push(err);
        }
    }

    fn peek(&self) -> &Token {
        // The token stream always ends with Eof, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    /// The next token if it continues the statement that started on `line`.
    fn peek_on_line(&self, line: usize) -> Option<&Token> {
        let token = self.peek();
        (token.kind != TokenKind::Eof && token.line == line).then_some(token)
    }

    fn skip_line(&mut self, line: usize) {
        while self.peek_on_line(line).is_some() {
            self.advance();
        }
    }

    fn expect_end_of_statement(&self, start: &Token) -> Result<(), ParseError> {
        match self.peek_on_line(start.line) {
            None => Ok(()),
            Some(token) => Err(ParseError::at(
                token,
                format!("unexpected {} after {}", describe(token), start.literal),
            )),
        }
    }

    /// Consume the next token on the statement line, or fail with `what` at
    /// the statement keyword.
    fn expect_arg(&mut self, start: &Token, what: &str) -> Result<Token, ParseError> {
        if self.peek_on_line(start.line).is_some() {
            Ok(self.advance())
        } else {
            Err(ParseError::at(
                start,
                format!("{} expects {what}", start.literal),
            ))
        }
    }

    fn eat(&mut self, line: usize, kind: TokenKind) -> Option<Token> {
        match self.peek_on_line(line) {
            Some(token) if token.kind == kind => Some(self.advance()),
            _ => None,
        }
    }

    fn parse_statement(&mut self, start: &Token) -> Result<CommandKind, ParseError> {
        let TokenKind::Keyword(keyword) = start.kind else {
            let message = match start.kind {
                TokenKind::Illegal => format!("illegal token {:?}", start.literal),
                _ => format!("expected a command, found {}", describe(start)),
            };
            return Err(ParseError::at(start, message));
        };

        match keyword {
            Keyword::Type => self.parse_type(start),
            Keyword::Sleep => {
                let token = self.expect_arg(start, "a duration")?;
                Ok(CommandKind::Sleep(duration_value(&token)?))
            }
            Keyword::Wait => self.parse_wait(start),
            Keyword::Set => self.parse_set(start),
            Keyword::Output => {
                let token = self.expect_arg(start, "an output path")?;
                let path = path_value(&token)?;
                let format = OutputFormat::from_path(&path).ok_or_else(|| {
                    ParseError::at(
                        &token,
                        format!(
                            "unsupported output format for {path:?} (expected .gif, .mp4, .webm, .txt, .ascii or a directory ending in '/')"
                        ),
                    )
                })?;
                Ok(CommandKind::Output(OutputTarget {
                    path: PathBuf::from(path),
                    format,
                }))
            }
            Keyword::Require => {
                let token = self.expect_arg(start, "a program name")?;
                Ok(CommandKind::Require(path_value(&token)?))
            }
            Keyword::Hide => Ok(CommandKind::Hide),
            Keyword::Show => Ok(CommandKind::Show),
            Keyword::Screenshot => {
                let token = self.expect_arg(start, "a .png path")?;
                let path = path_value(&token)?;
                if !path.to_ascii_lowercase().ends_with(".png") {
                    return Err(ParseError::at(
                        &token,
                        format!("screenshot path {path:?} must end in .png"),
                    ));
                }
                Ok(CommandKind::Screenshot(PathBuf::from(path)))
            }
            Keyword::Source => {
                let token = self.expect_arg(start, "a .tape path")?;
                let path = path_value(&token)?;
                if !path.ends_with(".tape") {
                    return Err(ParseError::at(
                        &token,
                        format!("source path {path:?} must end in .tape"),
                    ));
                }
                Ok(CommandKind::Source(PathBuf::from(path)))
            }
            Keyword::Env => {
                let name = self.expect_arg(start, "a variable name and a value")?;
                if name.kind != TokenKind::Identifier {
                    return Err(ParseError::at(
                        &name,
                        format!("expected environment variable name, found {}", describe(&name)),
                    ));
                }
                let value = self.expect_arg(start, "a variable name and a value")?;
                let value = match value.kind {
                    TokenKind::String
                    | TokenKind::Identifier
                    | TokenKind::Number
                    | TokenKind::Duration => value.literal,
                    _ => {
                        return Err(ParseError::at(
                            &value,
                            format!("expected environment variable value, found {}", describe(&value)),
                        ));
                    }
                };
                Ok(CommandKind::Env {
                    name: name.literal,
                    value,
                })
            }
            Keyword::Copy => {
                let token = self.expect_arg(start, "a string")?;
                Ok(CommandKind::Copy(string_value(&token)?))
            }
            Keyword::Paste => Ok(CommandKind::Paste {
                speed: self.parse_speed(start)?,
            }),
            Keyword::Ctrl | Keyword::Alt | Keyword::Shift => self.parse_chord(start, keyword),
            _ => {
                let key = key_for(keyword).ok_or_else(|| {
                    ParseError::at(start, format!("{keyword} cannot start a statement"))
                })?;
                self.parse_key_tail(start, KeyPress::new(key))
            }
        }
    }

    /// `Type[@speed] "text" ["more text" ...]`
    fn parse_type(&mut self, start: &Token) -> Result<CommandKind, ParseError> {
        let speed = self.parse_speed(start)?;
        let first = self.expect_arg(start, "a string")?;
        let mut text = string_value(&first)?;
        while let Some(token) = self.eat(start.line, TokenKind::String) {
            text.push_str(&token.literal);
        }
        Ok(CommandKind::Type { text, speed })
    }

    /// Optional `@<duration>` suffix.
    fn parse_speed(&mut self, start: &Token) -> Result<Option<Duration>, ParseError> {
        if self.eat(start.line, TokenKind::At).is_none() {
            return Ok(None);
        }
        let token = self.expect_arg(start, "a duration after '@'")?;
        duration_value(&token).map(Some)
    }

    /// `Ctrl+Alt+X`, `Shift+Tab`, ...
    fn parse_chord(
        &mut self,
        start: &Token,
        first: Keyword,
    ) -> Result<CommandKind, ParseError> {
        let mut modifiers = Modifiers::default();
        let mut current = first;
        loop {
            match current {
                Keyword::Ctrl => modifiers.ctrl = true,
                Keyword::Alt => modifiers.alt = true,
                Keyword::Shift => modifiers.shift = true,
                _ => unreachable!("only modifiers reach the chord loop"),
            }
            if self.eat(start.line, TokenKind::Plus).is_none() {
                let at = self.peek_on_line(start.line).unwrap_or(start).clone();
                return Err(ParseError::at(
                    &at,
                    format!("expected '+' after {current}"),
                ));
            }
            let token = self.expect_arg(start, "a key after '+'")?;
            let key = match token.kind {
                TokenKind::Keyword(kw @ (Keyword::Ctrl | Keyword::Alt | Keyword::Shift)) => {
                    current = kw;
                    continue;
                }
                TokenKind::Keyword(kw) => key_for(kw),
                TokenKind::Identifier
                | TokenKind::Number
                | TokenKind::Illegal
                | TokenKind::LBracket
                | TokenKind::RBracket
                | TokenKind::At
                | TokenKind::Percent
                | TokenKind::Plus => single_char(&token.literal).map(Key::Char),
                _ => None,
            };
            let key = key.ok_or_else(|| {
                ParseError::at(&token, format!("invalid key {}", describe(&token)))
            })?;
            let mut press = KeyPress::new(key);
            press.modifiers = modifiers;
            return self.parse_key_tail(start, press);
        }
    }

    /// Optional `@speed` then an optional repeat count, bare or bracketed.
    fn parse_key_tail(
        &mut self,
        start: &Token,
        mut press: KeyPress,
    ) -> Result<CommandKind, ParseError> {
        press.speed = self.parse_speed(start)?;
        let bracketed = self.eat(start.line, TokenKind::LBracket).is_some();
        if let Some(token) = self.eat(start.line, TokenKind::Number) {
            press.repeat = repeat_value(&token)?;
        } else if bracketed {
            let token = self.expect_arg(start, "a repeat count inside '[ ]'")?;
            return Err(ParseError::at(
                &token,
                format!("expected repeat count, found {}", describe(&token)),
            ));
        }
        if bracketed && self.eat(start.line, TokenKind::RBracket).is_none() {
            let at = self.peek_on_line(start.line).unwrap_or(start).clone();
            return Err(ParseError::at(&at, "expected ']' after repeat count"));
        }
        Ok(CommandKind::Key(press))
    }

    /// `Wait[+Screen|+Line][@timeout] [/regex/]`
    fn parse_wait(&mut self, start: &Token) -> Result<CommandKind, ParseError> {
        let mut spec = WaitSpec {
            scope: WaitScope::default(),
            timeout: None,
            pattern: None,
        };
        if self.eat(start.line, TokenKind::Plus).is_some() {
            let token = self.expect_arg(start, "a scope (Screen or Line) after '+'")?;
            spec.scope = match token.literal.as_str() {
                "Screen" => WaitScope::Screen,
                "Line" => WaitScope::Line,
                _ => {
                    return Err(ParseError::at(
                        &token,
                        format!("invalid Wait scope {}, expected Screen or Line", describe(&token)),
                    ));
                }
            };
        }
        spec.timeout = self.parse_speed(start)?;
        if let Some(token) = self.peek_on_line(start.line).cloned() {
            if token.kind == TokenKind::Regex {
                self.advance();
                spec.pattern = Some(regex_value(&token)?);
            }
        }
        Ok(CommandKind::Wait(spec))
    }

    fn parse_set(&mut self, start: &Token) -> Result<CommandKind, ParseError> {
        let name = self.expect_arg(start, "a setting name and a value")?;
        if name.kind != TokenKind::Identifier || !Setting::NAMES.contains(&name.literal.as_str()) {
            return Err(ParseError::at(
                &name,
                format!("unknown setting {}", describe(&name)),
            ));
        }
        let value = self.expect_arg(start, &format!("a value for {}", name.literal))?;
        let setting = match name.literal.as_str() {
            "Shell" => Setting::Shell(word_value(&value)?),
            "FontFamily" => Setting::FontFamily(word_value(&value)?),
            "FontSize" => Setting::FontSize(positive(&value, number_value(&value)?)? as f32),
            "LetterSpacing" => Setting::LetterSpacing(number_value(&value)? as f32),
            "LineHeight" => Setting::LineHeight(positive(&value, number_value(&value)?)? as f32),
            "Theme" => Setting::Theme(theme_value(&value)?),
            "Width" => Setting::Width(nonzero(&value, integer_value(&value)?)?),
            "Height" => Setting::Height(nonzero(&value, integer_value(&value)?)?),
            "Padding" => Setting::Padding(integer_value(&value)?),
            "Margin" => Setting::Margin(integer_value(&value)?),
            "MarginFill" => Setting::MarginFill(color_value(&value)?),
            "BorderRadius" => Setting::BorderRadius(integer_value(&value)?),
            "WindowBar" => {
                let word = word_value(&value)?;
                Setting::WindowBar(WindowBar::parse(&word).ok_or_else(|| {
                    ParseError::at(
                        &value,
                        format!(
                            "invalid WindowBar {word:?}, expected Colorful, ColorfulRight, Rings, RingsRight or None"
                        ),
                    )
                })?)
            }
            "WindowBarSize" => Setting::WindowBarSize(integer_value(&value)?),
            "CursorBlink" => Setting::CursorBlink(bool_value(&value)?),
            "TypingSpeed" => Setting::TypingSpeed(duration_value(&value)?),
            "PlaybackSpeed" => {
                Setting::PlaybackSpeed(positive(&value, number_value(&value)?)?)
            }
            "Framerate" => {
                let fps = integer_value(&value)?;
                if !(1..=120).contains(&fps) {
                    return Err(ParseError::at(
                        &value,
                        format!("Framerate must be between 1 and 120, got {fps}"),
                    ));
                }
                Setting::Framerate(fps)
            }
            "LoopOffset" => {
                let amount = number_value(&value)?;
                if amount < 0.0 {
                    return Err(ParseError::at(&value, "LoopOffset cannot be negative"));
                }
                if self.eat(start.line, TokenKind::Percent).is_some() {
                    Setting::LoopOffset(LoopOffset::Percent(amount))
                } else {
                    Setting::LoopOffset(LoopOffset::Frames(integer_value(&value)?))
                }
            }
            "WaitTimeout" => Setting::WaitTimeout(duration_value(&value)?),
            "WaitPattern" => match value.kind {
                TokenKind::Regex | TokenKind::String => Setting::WaitPattern(regex_value(&value)?),
                _ => {
                    return Err(ParseError::at(
                        &value,
                        format!("WaitPattern expects a /regex/, found {}", describe(&value)),
                    ));
                }
            },
            other => unreachable!("setting {other} is listed in Setting::NAMES"),
        };
        Ok(CommandKind::Set(setting))
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Keyword(_) | TokenKind::Identifier | TokenKind::Number | TokenKind::Duration => {
            format!("{} `{}`", token.kind, token.literal)
        }
        TokenKind::String => format!("string {:?}", token.literal),
        TokenKind::Illegal => format!("illegal token {:?}", token.literal),
        _ => token.kind.to_string(),
    }
}

fn key_for(keyword: Keyword) -> Option<Key> {
    Some(match keyword {
        Keyword::Enter => Key::Enter,
        Keyword::Tab => Key::Tab,
        Keyword::Space => Key::Space,
        Keyword::Backspace => Key::Backspace,
        Keyword::Delete => Key::Delete,
        Keyword::Insert => Key::Insert,
        Keyword::Escape => Key::Escape,
        Keyword::Up => Key::Up,
        Keyword::Down => Key::Down,
        Keyword::Left => Key::Left,
        Keyword::Right => Key::Right,
        Keyword::PageUp => Key::PageUp,
        Keyword::PageDown => Key::PageDown,
        Keyword::Home => Key::Home,
        Keyword::End => Key::End,
        _ => return None,
    })
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    let ch = chars.next()?;
    chars.next().is_none().then_some(ch)
}

/// Parse a duration token: `500ms`, `1.5s`, or a bare number of seconds.
pub(crate) fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (value, scale) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 0.001)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1.0)
    } else {
        (s, 1.0)
    };
    let value: f64 = value.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| Duration::from_secs_f64(value * scale))
}

fn duration_value(token: &Token) -> Result<Duration, ParseError> {
    match token.kind {
        TokenKind::Duration | TokenKind::Number => parse_duration(&token.literal)
            .ok_or_else(|| ParseError::at(token, format!("invalid duration `{}`", token.literal))),
        _ => Err(ParseError::at(
            token,
            format!("expected duration, found {}", describe(token)),
        )),
    }
}

fn number_value(token: &Token) -> Result<f64, ParseError> {
    if token.kind != TokenKind::Number {
        return Err(ParseError::at(
            token,
            format!("expected number, found {}", describe(token)),
        ));
    }
    token
        .literal
        .parse()
        .map_err(|_| ParseError::at(token, format!("invalid number `{}`", token.literal)))
}

fn integer_value(token: &Token) -> Result<u32, ParseError> {
    if token.kind != TokenKind::Number {
        return Err(ParseError::at(
            token,
            format!("expected integer, found {}", describe(token)),
        ));
    }
    token.literal.parse().map_err(|_| {
        ParseError::at(
            token,
            format!("expected a non-negative integer, found `{}`", token.literal),
        )
    })
}

fn repeat_value(token: &Token) -> Result<u32, ParseError> {
    let count = integer_value(token)?;
    if count == 0 || count > MAX_REPEAT {
        return Err(ParseError::at(
            token,
            format!("repeat count must be between 1 and {MAX_REPEAT}, got {count}"),
        ));
    }
    Ok(count)
}

fn positive(token: &Token, value: f64) -> Result<f64, ParseError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ParseError::at(token, format!("value must be positive, got {value}")))
    }
}

fn nonzero(token: &Token, value: u32) -> Result<u32, ParseError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ParseError::at(token, "value must be greater than zero"))
    }
}

fn string_value(token: &Token) -> Result<String, ParseError> {
    match token.kind {
        TokenKind::String => Ok(token.literal.clone()),
        _ => Err(ParseError::at(
            token,
            format!("expected string, found {}", describe(token)),
        )),
    }
}

/// A string or a bare word.
fn word_value(token: &Token) -> Result<String, ParseError> {
    match token.kind {
        TokenKind::String | TokenKind::Identifier => Ok(token.literal.clone()),
        _ => Err(ParseError::at(
            token,
            format!("expected string, found {}", describe(token)),
        )),
    }
}

fn path_value(token: &Token) -> Result<String, ParseError> {
    let path = word_value(token)?;
    if path.is_empty() {
        return Err(ParseError::at(token, "path cannot be empty"));
    }
    Ok(path)
}

fn bool_value(token: &Token) -> Result<bool, ParseError> {
    match (token.kind, token.literal.as_str()) {
        (TokenKind::Identifier, "true") => Ok(true),
        (TokenKind::Identifier, "false") => Ok(false),
        _ => Err(ParseError::at(
            token,
            format!("expected true or false, found {}", describe(token)),
        )),
    }
}

fn regex_value(token: &Token) -> Result<Regex, ParseError> {
    Regex::new(&token.literal)
        .map_err(|e| ParseError::at(token, format!("invalid regex /{}/: {e}", token.literal)))
}

fn color_value(token: &Token) -> Result<Rgb, ParseError> {
    let text = word_value(token)?;
    Rgb::from_hex(&text).map_err(|e| ParseError::at(token, format!("{e:#}")))
}

fn theme_value(token: &Token) -> Result<Theme, ParseError> {
    match token.kind {
        TokenKind::Json => {
            Theme::from_json(&token.literal).map_err(|e| ParseError::at(token, format!("{e:#}")))
        }
        TokenKind::String | TokenKind::Identifier => {
            Theme::named(&token.literal).ok_or_else(|| {
                let known: Vec<_> = Theme::builtin_names().collect();
                ParseError::at(
                    token,
                    format!(
                        "unknown theme {:?} (built-in themes: {})",
                        token.literal,
                        known.join(", ")
                    ),
                )
            })
        }
        _ => Err(ParseError::at(
            token,
            format!("expected theme name or JSON object, found {}", describe(token)),
        )),
    }
}

/// Maximum `Source` nesting, as a backstop next to cycle detection.
const MAX_SOURCE_DEPTH: usize = 16;

/// Replace every `Source` statement with the commands of the file it names.
///
/// Paths resolve relative to the file containing the statement (or
/// `base_dir` for the top-level tape). `Output` statements inside sourced
/// tapes are dropped and reported as warnings.
pub fn resolve_sources(
    commands: Vec<Command>,
    base_dir: &Path,
) -> Result<(Vec<Command>, Vec<Diagnostic>), Error> {
    let mut warnings = Vec::new();
    let mut stack = Vec::new();
    let resolved = splice(commands, base_dir, &mut stack, &mut warnings)?;
    Ok((resolved, warnings))
}

fn splice(
    commands: Vec<Command>,
    base_dir: &Path,
    stack: &mut Vec<PathBuf>,
    warnings: &mut Vec<Diagnostic>,
) -> Result<Vec<Command>, Error> {
    let mut out = Vec::with_capacity(commands.len());
    for command in commands {
        let relative = match &command.kind {
            CommandKind::Source(relative) => relative.clone(),
            _ => {
                out.push(command);
                continue;
            }
        };
        let dir = command
            .file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or(base_dir);
        let path = dir.join(relative);
        let source_err = |message: String| Error::Source {
            path: path.clone(),
            line: command.position.line,
            column: command.position.column,
            message,
        };

        let canonical = path
            .canonicalize()
            .map_err(|e| source_err(format!("cannot open {}: {e}", path.display())))?;
        if stack.contains(&canonical) {
            return Err(source_err(format!(
                "{} is already being sourced (inclusion cycle)",
                path.display()
            )));
        }
        if stack.len() >= MAX_SOURCE_DEPTH {
            return Err(source_err(format!(
                "Source nesting deeper than {MAX_SOURCE_DEPTH} levels"
            )));
        }

        let content = std::fs::read_to_string(&canonical)
            .map_err(|e| source_err(format!("cannot read {}: {e}", path.display())))?;
        let parsed = parse(&content);
        if !parsed.is_valid() {
            return Err(Error::SourceParse {
                path: path.clone(),
                errors: parsed.errors,
            });
        }

        let mut nested = Vec::with_capacity(parsed.commands.len());
        for mut child in parsed.commands {
            child.file = Some(path.clone());
            if matches!(child.kind, CommandKind::Output(_)) {
                warnings.push(Diagnostic::warning(
                    &child,
                    "Output in a sourced tape is ignored",
                ));
                continue;
            }
            nested.push(child);
        }

        stack.push(canonical);
        let nested_dir = path.parent().unwrap_or(base_dir).to_path_buf();
        let spliced = splice(nested, &nested_dir, stack, warnings);
        stack.pop();
        out.extend(spliced?);
    }
    Ok(out)
}
