//! The live, mutable state of one recording run.
//!
//! Commands receive a `&mut Session`. The terminal is started lazily by the
//! first command that needs it, and the capture loop starts with it.

use crate::capture::{CaptureLoop, FrameLog, SharedTerminal};
use crate::command::{Command, OutputTarget};
use crate::diagnostics::Diagnostic;
use crate::error::Error;
use crate::frame::Frame;
use crate::settings::Settings;
use crate::shell;
use crate::terminal::{Capture, Launcher};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// A screenshot taken mid-run, written out only when the run finalizes.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub path: PathBuf,
    pub image: Arc<Vec<u8>>,
}

pub struct Session {
    pub settings: Settings,
    launcher: Arc<dyn Launcher>,
    terminal: Option<SharedTerminal>,
    capture: Option<CaptureLoop>,
    clock: Option<Instant>,
    frames: FrameLog,
    visible: Arc<AtomicBool>,
    failure: watch::Sender<Option<String>>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    pub(crate) clipboard: String,
    pub(crate) outputs: Vec<OutputTarget>,
    pub(crate) screenshots: Vec<Screenshot>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

fn driver(err: anyhow::Error) -> anyhow::Error {
    Error::Driver(err).into()
}

impl Session {
    pub fn new(settings: Settings, launcher: Arc<dyn Launcher>) -> Self {
        let (failure, _) = watch::channel(None);
        Self {
            settings,
            launcher,
            terminal: None,
            capture: None,
            clock: None,
            frames: Arc::new(Mutex::new(Vec::new())),
            visible: Arc::new(AtomicBool::new(true)),
            failure,
            env: Vec::new(),
            cwd: None,
            clipboard: String::new(),
            outputs: Vec::new(),
            screenshots: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Working directory for the shell. Defaults to the process's own.
    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn is_started(&self) -> bool {
        self.terminal.is_some()
    }

    /// Subscribe to capture-loop failures.
    pub fn capture_failures(&self) -> watch::Receiver<Option<String>> {
        self.failure.subscribe()
    }

    pub fn add_env(&mut self, name: String, value: String) {
        self.env.push((name, value));
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Record a non-fatal problem tied to `command`.
    pub fn warn(&mut self, command: &Command, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning(command, message);
        log::warn!(
            "{}:{}: {}",
            diagnostic.line,
            diagnostic.column,
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    /// Time since the terminal started, zero before that.
    pub fn elapsed(&self) -> Duration {
        self.clock.map(|c| c.elapsed()).unwrap_or_default()
    }

    /// Start the terminal and the capture loop if not running yet.
    pub async fn ensure_terminal(&mut self) -> Result<SharedTerminal> {
        if let Some(terminal) = &self.terminal {
            return Ok(terminal.clone());
        }
        let mut spec = shell::launch_spec(&self.settings.shell, &self.env, self.settings.style());
        spec.cwd = self.cwd.clone();
        log::info!("starting terminal: {} {}", spec.program, spec.args.join(" "));
        let terminal = self.launcher.launch(spec).await.map_err(driver)?;
        let terminal: SharedTerminal = Arc::new(tokio::sync::Mutex::new(terminal));

        let clock = Instant::now();
        let interval = self.settings.frame_interval();
        self.capture = Some(CaptureLoop::spawn(
            terminal.clone(),
            self.frames.clone(),
            self.visible.clone(),
            clock,
            interval,
            self.failure.clone(),
        ));
        log::debug!("capturing every {interval:?}");
        self.clock = Some(clock);
        self.terminal = Some(terminal.clone());
        Ok(terminal)
    }

    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let terminal = self.ensure_terminal().await?;
        let mut terminal = terminal.lock().await;
        terminal.send(bytes).await.map_err(driver)
    }

    pub async fn visible_text(&mut self) -> Result<String> {
        let terminal = self.ensure_terminal().await?;
        let mut terminal = terminal.lock().await;
        terminal.visible_text().await.map_err(driver)
    }

    pub async fn capture(&mut self) -> Result<Capture> {
        let terminal = self.ensure_terminal().await?;
        let snapshot = terminal.lock().await.snapshot().await.map_err(driver)?;
        snapshot.finish().await.map_err(driver)
    }

    /// Push the current style to a running terminal. No-op before start.
    pub async fn restyle(&mut self) -> Result<()> {
        let Some(terminal) = &self.terminal else {
            return Ok(());
        };
        let style = self.settings.style();
        let mut terminal = terminal.lock().await;
        terminal.apply_style(&style).await.map_err(driver)
    }

    /// Copy of the frames captured so far.
    pub fn frames(&self) -> Vec<Frame> {
        match self.frames.lock() {
            Ok(frames) => frames.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stop capturing and tear the terminal down. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(capture) = self.capture.take() {
            capture.stop().await;
        }
        if let Some(terminal) = self.terminal.take() {
            terminal.lock().await.shutdown().await.map_err(driver)?;
            log::debug!("terminal shut down");
        }
        Ok(())
    }
}
