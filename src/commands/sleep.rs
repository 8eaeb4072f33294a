//! `Sleep`: pause the command stream. The capture loop keeps running.
//!
//! Script syntax: `Sleep 500ms`, `Sleep 2s`, `Sleep 1.5`

use crate::session::Session;
use anyhow::Result;
use std::time::Duration;

pub async fn execute(duration: Duration, session: &mut Session) -> Result<()> {
    session.ensure_terminal().await?;
    tokio::time::sleep(duration).await;
    Ok(())
}
