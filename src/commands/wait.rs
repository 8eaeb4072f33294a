//! `Wait`: block the command stream until the screen matches a pattern.
//!
//! Script syntax: `Wait`, `Wait+Screen@10s /ready/`, `Wait /\$$/`
//!
//! A timeout is not fatal; it is recorded as a warning and the run goes on.

use crate::command::{Command, WaitScope, WaitSpec};
use crate::session::Session;
use anyhow::Result;
use regex::Regex;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The part of `text` a wait with `scope` matches against.
pub fn scoped(text: &str, scope: WaitScope) -> &str {
    match scope {
        WaitScope::Screen => text,
        WaitScope::Line => text
            .lines()
            .rev()
            .map(str::trim_end)
            .find(|line| !line.is_empty())
            .unwrap_or(""),
    }
}

pub async fn execute(spec: &WaitSpec, command: &Command, session: &mut Session) -> Result<()> {
    let timeout = spec.timeout.unwrap_or(session.settings.wait_timeout);
    let pattern: Regex = spec
        .pattern
        .clone()
        .unwrap_or_else(|| session.settings.wait_pattern.clone());
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let text = session.visible_text().await?;
        if pattern.is_match(scoped(&text, spec.scope)) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            session.warn(
                command,
                format!("Wait timed out after {timeout:?} waiting for /{pattern}/"),
            );
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_scope_uses_last_non_empty_line() {
        let screen = "$ make\nbuilding\n> \n\n";
        assert_eq!(scoped(screen, WaitScope::Line), ">");
        assert_eq!(scoped(screen, WaitScope::Screen), screen);
    }

    #[test]
    fn test_dollar_prompt_matches_trimmed_line() {
        let pattern = Regex::new(r"\$$").unwrap();
        assert!(pattern.is_match(scoped("ls\nfile\n$ \n", WaitScope::Line)));
        let padded = Regex::new(r"\$ $").unwrap();
        assert!(!padded.is_match(scoped("ls\nfile\n$ \n", WaitScope::Line)));
    }

    #[test]
    fn test_line_scope_of_blank_screen() {
        assert_eq!(scoped("\n\n", WaitScope::Line), "");
    }
}
