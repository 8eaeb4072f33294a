//! Typed failures for a recording run.
//!
//! Library entry points return `anyhow::Result`; when a caller needs to tell
//! failure classes apart it can `downcast_ref::<Error>()`.

use crate::parser::ParseError;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The tape text was empty. A usage error, not a parse error.
    #[error("no input provided")]
    EmptyInput,

    #[error("{} syntax error(s) in tape", .0.len())]
    Parse(Vec<ParseError>),

    /// A `Source` statement could not be resolved.
    #[error("{}:{line}:{column}: {message}", path.display())]
    Source {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// A sourced tape has syntax errors of its own.
    #[error("{} syntax error(s) in sourced tape {}", errors.len(), path.display())]
    SourceParse {
        path: PathBuf,
        errors: Vec<ParseError>,
    },

    /// A `Require`d program is not on `PATH`.
    #[error("{line}:{column}: required program `{program}` was not found on PATH")]
    MissingProgram {
        program: String,
        /// Sourced tape the `Require` came from; `None` for the top level.
        file: Option<PathBuf>,
        line: usize,
        column: usize,
    },

    /// An external tool the run depends on is missing.
    #[error("{name} is not installed. Install it from: {hint}")]
    MissingDependency { name: String, hint: String },

    /// The terminal subprocess or its control connection failed.
    #[error("terminal driver failed: {0:#}")]
    Driver(anyhow::Error),

    #[error("recording cancelled")]
    Cancelled,

    /// One or more output targets failed to encode.
    #[error("{} output(s) failed: {}", .0.len(), EncodeFailures(.0))]
    Encode(Vec<EncodeFailure>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeFailure {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for EncodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

struct EncodeFailures<'a>(&'a [EncodeFailure]);

impl fmt::Display for EncodeFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
