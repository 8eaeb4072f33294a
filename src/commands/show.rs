//! `Hide` and `Show`: toggle whether captured frames reach the output.
//!
//! Frames keep being captured while hidden so elapsed time is preserved.

use crate::session::Session;
use anyhow::Result;

pub async fn execute(visible: bool, session: &mut Session) -> Result<()> {
    // Hiding first thing still has to start the terminal so setup typing
    // happens off camera.
    session.ensure_terminal().await?;
    session.set_visible(visible);
    log::debug!("recording {}", if visible { "visible" } else { "hidden" });
    Ok(())
}
