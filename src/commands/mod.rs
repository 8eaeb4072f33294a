//! Executors for each tape verb.
//!
//! [`execute`] dispatches one [`Command`] against the session. Verbs that
//! need a terminal start it on first use.

mod key_press;
mod screenshot;
mod set;
mod show;
mod sleep;
mod type_text;
mod wait;

pub use key_press::key_bytes;
pub use wait::scoped;

use crate::command::{Command, CommandKind};
use crate::session::Session;
use anyhow::Result;
use std::time::Duration;

/// Keystroke pacing. Zero skips the timer entirely.
async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Run one command to completion.
pub async fn execute(command: &Command, session: &mut Session) -> Result<()> {
    match &command.kind {
        CommandKind::Type { text, speed } => type_text::execute(text, *speed, session).await,
        CommandKind::Key(press) => key_press::execute(press, session).await,
        CommandKind::Sleep(duration) => sleep::execute(*duration, session).await,
        CommandKind::Wait(spec) => wait::execute(spec, command, session).await,
        CommandKind::Set(setting) => set::execute(setting, command, session).await,
        CommandKind::Env { name, value } => {
            set::env(name, value, command, session);
            Ok(())
        }
        CommandKind::Output(target) => {
            session.outputs.push(target.clone());
            Ok(())
        }
        // Checked before the run starts.
        CommandKind::Require(_) => Ok(()),
        CommandKind::Hide => show::execute(false, session).await,
        CommandKind::Show => show::execute(true, session).await,
        CommandKind::Screenshot(path) => screenshot::execute(path, session).await,
        CommandKind::Source(path) => {
            // Sources are spliced in before evaluation; a leftover one means
            // the caller skipped resolution.
            anyhow::bail!("unresolved Source {}", path.display())
        }
        CommandKind::Copy(text) => {
            session.clipboard = text.clone();
            Ok(())
        }
        CommandKind::Paste { speed } => type_text::paste(*speed, session).await,
    }
}
