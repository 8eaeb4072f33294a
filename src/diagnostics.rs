//! Position-aware diagnostics with a rendered excerpt of the offending line.
//!
//! ```text
//! error: expected duration, found identifier `forever`
//!  --> demo.tape:2:7
//!   |
//! 2 | Sleep forever
//!   |       ^
//! ```

use crate::command::Command;
use crate::parser::ParseError;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// File the position refers to; `None` means the top-level tape.
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(command: &Command, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            file: command.file.clone(),
            line: command.position.line,
            column: command.position.column,
            message: message.into(),
        }
    }
}

impl From<&ParseError> for Diagnostic {
    fn from(err: &ParseError) -> Self {
        Self {
            severity: Severity::Error,
            file: None,
            line: err.line,
            column: err.column,
            message: err.message.clone(),
        }
    }
}

/// Render one diagnostic against the text it points into.
///
/// `name` labels the location line. Positions outside `source` still render,
/// just without an excerpt.
pub fn render(name: &str, source: &str, diag: &Diagnostic) -> String {
    let mut out = format!(
        "{}: {}\n --> {}:{}:{}\n",
        diag.severity, diag.message, name, diag.line, diag.column
    );
    let Some(text) = source.lines().nth(diag.line.saturating_sub(1)) else {
        return out;
    };
    let gutter = diag.line.to_string();
    let pad = " ".repeat(gutter.len());
    // Align the caret by characters, keeping tabs so it lines up in a terminal.
    let lead: String = text
        .chars()
        .take(diag.column.saturating_sub(1))
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
    out.push_str(&format!("{pad} |\n{gutter} | {text}\n{pad} | {lead}^\n"));
    out
}

/// Write diagnostics for one tape. Diagnostics pointing into another file
/// (sourced tapes) load that file for their excerpt.
pub fn report(
    out: &mut impl Write,
    name: &str,
    source: &str,
    diagnostics: &[Diagnostic],
) -> io::Result<()> {
    for diag in diagnostics {
        let rendered = match &diag.file {
            Some(path) => render_external(path, diag),
            None => render(name, source, diag),
        };
        writeln!(out, "{rendered}")?;
    }
    Ok(())
}

fn render_external(path: &Path, diag: &Diagnostic) -> String {
    let text = std::fs::read_to_string(path).unwrap_or_default();
    render(&path.display().to_string(), &text, diag)
}

/// Convenience wrapper for a list of parse errors.
pub fn report_parse_errors(
    out: &mut impl Write,
    name: &str,
    source: &str,
    errors: &[ParseError],
) -> io::Result<()> {
    let diagnostics: Vec<Diagnostic> = errors.iter().map(Diagnostic::from).collect();
    report(out, name, source, &diagnostics)
}
