//! Tokenizer for tape scripts.
//!
//! The lexer is total: every character of the input ends up in some token,
//! and characters it cannot classify become [`TokenKind::Illegal`] tokens so
//! the parser can report them with an accurate position and keep going.

use std::fmt;

/// Script keywords. Command verbs, key names and key modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Type,
    Sleep,
    Wait,
    Set,
    Output,
    Require,
    Hide,
    Show,
    Screenshot,
    Source,
    Env,
    Copy,
    Paste,
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
    Ctrl,
    Alt,
    Shift,
}

static KEYWORDS: &[(&str, Keyword)] = &[
    ("Type", Keyword::Type),
    ("Sleep", Keyword::Sleep),
    ("Wait", Keyword::Wait),
    ("Set", Keyword::Set),
    ("Output", Keyword::Output),
    ("Require", Keyword::Require),
    ("Hide", Keyword::Hide),
    ("Show", Keyword::Show),
    ("Screenshot", Keyword::Screenshot),
    ("Source", Keyword::Source),
    ("Env", Keyword::Env),
    ("Copy", Keyword::Copy),
    ("Paste", Keyword::Paste),
    ("Enter", Keyword::Enter),
    ("Tab", Keyword::Tab),
    ("Space", Keyword::Space),
    ("Backspace", Keyword::Backspace),
    ("Delete", Keyword::Delete),
    ("Insert", Keyword::Insert),
    ("Escape", Keyword::Escape),
    ("Up", Keyword::Up),
    ("Down", Keyword::Down),
    ("Left", Keyword::Left),
    ("Right", Keyword::Right),
    ("PageUp", Keyword::PageUp),
    ("PageDown", Keyword::PageDown),
    ("Home", Keyword::Home),
    ("End", Keyword::End),
    ("Ctrl", Keyword::Ctrl),
    ("Alt", Keyword::Alt),
    ("Shift", Keyword::Shift),
];

impl Keyword {
    pub fn lookup(word: &str) -> Option<Self> {
        KEYWORDS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, kw)| *kw)
    }

    pub fn as_str(self) -> &'static str {
        KEYWORDS
            .iter()
            .find(|(_, kw)| *kw == self)
            .map(|(name, _)| *name)
            .unwrap_or("?")
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword(Keyword),
    String,
    Number,
    Duration,
    Identifier,
    Regex,
    Json,
    Plus,
    At,
    Percent,
    LBracket,
    RBracket,
    Illegal,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(kw) => write!(f, "keyword `{kw}`"),
            TokenKind::String => f.write_str("string"),
            TokenKind::Number => f.write_str("number"),
            TokenKind::Duration => f.write_str("duration"),
            TokenKind::Identifier => f.write_str("identifier"),
            TokenKind::Regex => f.write_str("regex"),
            TokenKind::Json => f.write_str("JSON object"),
            TokenKind::Plus => f.write_str("`+`"),
            TokenKind::At => f.write_str("`@`"),
            TokenKind::Percent => f.write_str("`%`"),
            TokenKind::LBracket => f.write_str("`[`"),
            TokenKind::RBracket => f.write_str("`]`"),
            TokenKind::Illegal => f.write_str("illegal token"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A single token with its literal text and 1-based source position.
///
/// For strings and regexes `literal` holds the unescaped contents without
/// delimiters. For illegal tokens it holds the offending text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub line: usize,
    pub column: usize,
}

/// Tokenize `input` into a token vector terminated by [`TokenKind::Eof`].
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// No token has been read on the current line yet.
    line_start: bool,
    /// The current line is a statement whose argument is a path, so `/`
    /// starts a word rather than a regex.
    path_line: bool,
}

fn takes_path(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Keyword(Keyword::Output | Keyword::Screenshot | Keyword::Require | Keyword::Source)
    )
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '/' | '~' | ':' | '-')
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            line_start: true,
            path_line: false,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
            self.line_start = true;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.bump();
            } else if ch == '#' {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let token = |kind, literal: String| Token {
            kind,
            literal,
            line,
            column,
        };

        let Some(ch) = self.peek() else {
            return token(TokenKind::Eof, String::new());
        };
        let first_on_line = std::mem::replace(&mut self.line_start, false);

        let next = match ch {
            '"' => self.read_string(line, column),
            '/' if !self.path_line => self.read_regex(line, column),
            '{' => self.read_json(line, column),
            '+' | '@' | '%' | '[' | ']' => {
                self.bump();
                let kind = match ch {
                    '+' => TokenKind::Plus,
                    '@' => TokenKind::At,
                    '%' => TokenKind::Percent,
                    '[' => TokenKind::LBracket,
                    _ => TokenKind::RBracket,
                };
                token(kind, ch.to_string())
            }
            ch if is_word_char(ch) => {
                let mut word = String::new();
                while let Some(ch) = self.peek() {
                    if !is_word_char(ch) {
                        break;
                    }
                    word.push(ch);
                    self.bump();
                }
                token(classify_word(&word), word)
            }
            _ => {
                self.bump();
                token(TokenKind::Illegal, ch.to_string())
            }
        };
        if first_on_line {
            self.path_line = takes_path(next.kind);
        }
        next
    }

    /// Double-quoted string with backslash escapes. Strings never span lines;
    /// reaching a newline or the end of input yields an illegal token.
    fn read_string(&mut self, line: usize, column: usize) -> Token {
        self.bump();
        let mut value = String::new();
        let mut raw = String::from('"');
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Token {
                        kind: TokenKind::Illegal,
                        literal: raw,
                        line,
                        column,
                    };
                }
                Some('"') => {
                    self.bump();
                    return Token {
                        kind: TokenKind::String,
                        literal: value,
                        line,
                        column,
                    };
                }
                Some('\\') => {
                    self.bump();
                    raw.push('\\');
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('"') => '"',
                        Some('\\') => '\\',
                        _ => {
                            value.push('\\');
                            continue;
                        }
                    };
                    if let Some(ch) = self.bump() {
                        raw.push(ch);
                    }
                    value.push(escaped);
                }
                Some(ch) => {
                    self.bump();
                    raw.push(ch);
                    value.push(ch);
                }
            }
        }
    }

    fn read_regex(&mut self, line: usize, column: usize) -> Token {
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Token {
                        kind: TokenKind::Illegal,
                        literal: format!("/{value}"),
                        line,
                        column,
                    };
                }
                Some('/') => {
                    self.bump();
                    return Token {
                        kind: TokenKind::Regex,
                        literal: value,
                        line,
                        column,
                    };
                }
                Some('\\') if self.peek_at(1) == Some('/') => {
                    self.bump();
                    self.bump();
                    value.push('/');
                }
                Some(ch) => {
                    self.bump();
                    value.push(ch);
                }
            }
        }
    }

    /// A balanced `{ ... }` block, kept verbatim for JSON decoding later.
    /// Braces inside JSON strings are not counted. The block must close on
    /// the line it opened on; otherwise it is illegal up to the end of that
    /// line and lexing resumes on the next one.
    fn read_json(&mut self, line: usize, column: usize) -> Token {
        let mut value = String::new();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
            value.push(ch);
            if in_string {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    in_string = false;
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Token {
                            kind: TokenKind::Json,
                            literal: value,
                            line,
                            column,
                        };
                    }
                }
                _ => {}
            }
        }
        Token {
            kind: TokenKind::Illegal,
            literal: value,
            line,
            column,
        }
    }
}

fn classify_word(word: &str) -> TokenKind {
    if let Some(kw) = Keyword::lookup(word) {
        return TokenKind::Keyword(kw);
    }
    if is_number(word) {
        return TokenKind::Number;
    }
    let unit_stripped = word
        .strip_suffix("ms")
        .or_else(|| word.strip_suffix('s'));
    match unit_stripped {
        Some(value) if is_number(value) && !value.starts_with('-') => TokenKind::Duration,
        _ => TokenKind::Identifier,
    }
}

fn is_number(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    !int.is_empty()
        && int.chars().all(|c| c.is_ascii_digit())
        && frac.is_none_or(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_basic_statements() {
        assert_eq!(
            kinds("Type \"echo hi\"\nEnter\nSleep 500ms"),
            vec![
                TokenKind::Keyword(Keyword::Type),
                TokenKind::String,
                TokenKind::Keyword(Keyword::Enter),
                TokenKind::Keyword(Keyword::Sleep),
                TokenKind::Duration,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_positions_are_one_based() {
        let tokens = tokenize("Set FontSize 22\n  Sleep 1s");
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 5));
        assert_eq!((tokens[2].line, tokens[2].column), (1, 14));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 3));
        assert_eq!((tokens[4].line, tokens[4].column), (2, 9));
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"Type "say \"hi\"\n\\""#);
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].literal, "say \"hi\"\n\\");
    }

    #[test]
    fn test_unterminated_string_is_illegal() {
        let tokens = tokenize("Type \"oops\nEnter");
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[2].kind, TokenKind::Keyword(Keyword::Enter));
        assert_eq!(tokens[2].line, 2);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("# a comment\nHide # trailing\n"),
            vec![TokenKind::Keyword(Keyword::Hide), TokenKind::Eof]
        );
    }

    #[test]
    fn test_numbers_and_durations() {
        assert_eq!(
            kinds("50 1.5 -1 500ms 2s 1.5s 5minutes"),
            vec![
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Duration,
                TokenKind::Duration,
                TokenKind::Duration,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_modifiers_and_punctuation() {
        assert_eq!(
            kinds("Ctrl+C Wait+Screen@10s /World/ Enter [3] 50%"),
            vec![
                TokenKind::Keyword(Keyword::Ctrl),
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::Keyword(Keyword::Wait),
                TokenKind::Plus,
                TokenKind::Identifier,
                TokenKind::At,
                TokenKind::Duration,
                TokenKind::Regex,
                TokenKind::Keyword(Keyword::Enter),
                TokenKind::LBracket,
                TokenKind::Number,
                TokenKind::RBracket,
                TokenKind::Number,
                TokenKind::Percent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_regex_escaped_slash() {
        let tokens = tokenize(r"Wait /a\/b/");
        assert_eq!(tokens[1].kind, TokenKind::Regex);
        assert_eq!(tokens[1].literal, "a/b");
    }

    #[test]
    fn test_paths_are_identifiers() {
        let tokens = tokenize("Output ./demo/out.gif");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].literal, "./demo/out.gif");
    }

    #[test]
    fn test_absolute_paths_after_path_verbs() {
        let tokens = tokenize("Output /tmp/out.gif\nScreenshot /tmp/shot.png\nWait /tmp/");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].literal, "/tmp/out.gif");
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
        assert_eq!(tokens[3].literal, "/tmp/shot.png");
        assert_eq!(tokens[5].kind, TokenKind::Regex);
        assert_eq!(tokens[5].literal, "tmp");
    }

    #[test]
    fn test_unclosed_json_stops_at_end_of_line() {
        let tokens = tokenize("Set Theme { \"a\": 1\nHide");
        assert_eq!(tokens[2].kind, TokenKind::Illegal);
        assert_eq!(tokens[2].line, 1);
        assert_eq!(tokens[3].kind, TokenKind::Keyword(Keyword::Hide));
        assert_eq!(tokens[3].line, 2);
    }

    #[test]
    fn test_json_block() {
        let tokens = tokenize("Set Theme { \"name\": \"x}\", \"nested\": {} }\nHide");
        assert_eq!(tokens[2].kind, TokenKind::Json);
        assert!(tokens[2].literal.ends_with("} }"));
        assert_eq!(tokens[3].kind, TokenKind::Keyword(Keyword::Hide));
    }

    #[test]
    fn test_illegal_characters_do_not_stop_the_scan() {
        let tokens = tokenize("Hide $ Show");
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[1].literal, "$");
        assert_eq!(tokens[2].kind, TokenKind::Keyword(Keyword::Show));
    }
}
