//! `Type` and `Paste`: text input, paced by `TypingSpeed`.
//!
//! Script syntax: `Type "text here"`, `Type@10ms "fast"`, `Paste`

use super::pause;
use crate::session::Session;
use anyhow::Result;
use std::time::Duration;

/// Terminal bytes for one typed character. Newlines submit like Enter.
fn char_bytes(ch: char) -> Vec<u8> {
    match ch {
        '\n' => b"\r".to_vec(),
        _ => ch.to_string().into_bytes(),
    }
}

/// Type `text`, one keystroke per `speed` (or the `TypingSpeed` setting).
///
/// A zero speed sends the whole string in a single write.
pub async fn execute(text: &str, speed: Option<Duration>, session: &mut Session) -> Result<()> {
    let delay = speed.unwrap_or(session.settings.typing_speed);
    if delay.is_zero() {
        let bytes: Vec<u8> = text.chars().flat_map(char_bytes).collect();
        return session.send(&bytes).await;
    }
    for ch in text.chars() {
        session.send(&char_bytes(ch)).await?;
        pause(delay).await;
    }
    Ok(())
}

/// Type the clipboard contents set by the last `Copy`.
pub async fn paste(speed: Option<Duration>, session: &mut Session) -> Result<()> {
    let text = session.clipboard.clone();
    if text.is_empty() {
        log::debug!("Paste with empty clipboard");
        return Ok(());
    }
    execute(&text, speed, session).await
}
