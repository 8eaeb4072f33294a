//! The terminal driver seam.
//!
//! The engine talks to a live terminal only through [`Terminal`], and starts
//! one only through [`Launcher`]. The production pair is
//! [`PtyLauncher`](crate::pty::PtyLauncher) / [`PtyTerminal`](crate::pty::PtyTerminal);
//! tests substitute scripted implementations.

use crate::settings::Style;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// One screen capture: the rendered PNG plus the visible text at that moment.
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: Arc<Vec<u8>>,
    pub text: String,
}

/// Rasterize-and-encode work left over from a [`Terminal::snapshot`].
pub type RenderJob = Box<dyn FnOnce() -> Result<Capture> + Send>;

/// A screen grab taken while holding the driver.
pub enum Snapshot {
    Ready(Capture),
    /// Still needs rendering. Run it with [`Snapshot::finish`] after the
    /// driver is released so input is not held up by rasterization.
    Render(RenderJob),
}

impl Snapshot {
    /// Produce the capture, rendering on the blocking pool if needed.
    pub async fn finish(self) -> Result<Capture> {
        match self {
            Snapshot::Ready(capture) => Ok(capture),
            Snapshot::Render(job) => tokio::task::spawn_blocking(job)
                .await
                .context("render task failed")?,
        }
    }
}

impl From<Capture> for Snapshot {
    fn from(capture: Capture) -> Self {
        Snapshot::Ready(capture)
    }
}

/// Remote control surface of a running terminal.
///
/// Every operation may fail. Failures are fatal for the run: a terminal that
/// dropped an input or a resize cannot be trusted to continue.
#[async_trait]
pub trait Terminal: Send {
    /// Apply visual settings. Recomputes the grid and resizes the terminal
    /// when the cell layout changed.
    async fn apply_style(&mut self, style: &Style) -> Result<()>;

    /// Inject raw input bytes (text or key sequences).
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Grab the current screen. Must be cheap; expensive rendering belongs
    /// in a [`Snapshot::Render`] job.
    async fn snapshot(&mut self) -> Result<Snapshot>;

    /// Currently visible text, one line per row, trailing blanks trimmed.
    async fn visible_text(&mut self) -> Result<String>;

    /// Tear down the terminal process. Must be idempotent.
    async fn shutdown(&mut self) -> Result<()>;
}

/// How to start a terminal session.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment, applied after the shell's own prompt variables.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub style: Style,
}

#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start a terminal and wait until it is ready for input.
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn Terminal>>;
}
