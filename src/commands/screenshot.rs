//! `Screenshot`: capture the current screen to a PNG.
//!
//! Script syntax: `Screenshot shots/step1.png`
//!
//! The image is taken now but written when the run finalizes, so failed or
//! cancelled runs leave no files behind.

use crate::session::{Screenshot, Session};
use anyhow::Result;
use std::path::Path;

pub async fn execute(path: &Path, session: &mut Session) -> Result<()> {
    let capture = session.capture().await?;
    session.screenshots.push(Screenshot {
        path: path.to_path_buf(),
        image: capture.image,
    });
    Ok(())
}
