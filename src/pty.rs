//! A shell running inside a PTY, with a vt100 screen model for captures.

use crate::pty_reader::{ReaderState, spawn_reader};
use crate::render::{Rasterizer, encode_png};
use crate::settings::Style;
use crate::terminal::{Capture, LaunchSpec, Launcher, Snapshot, Terminal};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const READY_ATTEMPTS: u32 = 16;
const READY_BACKOFF_START: Duration = Duration::from_millis(10);
const READY_BACKOFF_MAX: Duration = Duration::from_millis(500);
const BLINK_PHASE: Duration = Duration::from_millis(500);

/// Manages a shell running inside a PTY
pub struct PtyTerminal {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    screen: Arc<Mutex<vt100::Parser>>,
    reader: Arc<ReaderState>,
    rasterizer: Arc<Mutex<Rasterizer>>,
    cursor_blink: bool,
    /// Bumped on every restyle so captures rendered with an older style
    /// never match the cache.
    style_epoch: u64,
    started: Instant,
    last_capture: Arc<Mutex<Option<(u64, Capture)>>>,
    closed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("terminal lock poisoned"))
}

impl PtyTerminal {
    /// Spawn the program described by `spec` in a PTY sized for its style.
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let rasterizer = Rasterizer::new(spec.style.clone());
        let (rows, cols) = rasterizer.grid();
        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(pty_size(rows, cols, &spec.style))
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&spec.program);
        for arg in &spec.args {
            cmd.arg(arg);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        let cwd = match &spec.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to resolve working directory")?,
        };
        cmd.cwd(cwd);

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", spec.program))?;
        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        let screen = Arc::new(Mutex::new(vt100::Parser::new(rows, cols, 0)));
        let reader = spawn_reader(reader, screen.clone());
        log::debug!("spawned {} in a {cols}x{rows} pty", spec.program);

        Ok(Self {
            master: pair.master,
            child,
            writer,
            screen,
            reader,
            cursor_blink: spec.style.cursor_blink,
            rasterizer: Arc::new(Mutex::new(rasterizer)),
            style_epoch: 0,
            started: Instant::now(),
            last_capture: Arc::new(Mutex::new(None)),
            closed: false,
        })
    }

    /// Wait until the shell has drawn something, with bounded backoff.
    pub async fn wait_until_ready(&mut self) -> Result<()> {
        let mut backoff = READY_BACKOFF_START;
        for _ in 0..READY_ATTEMPTS {
            if self.reader.bytes.load(Ordering::SeqCst) > 0 {
                return Ok(());
            }
            if let Some(status) = self.child.try_wait()? {
                bail!("terminal exited during startup with {status:?}");
            }
            if self.reader.closed.load(Ordering::SeqCst) {
                bail!("terminal closed its output during startup");
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(READY_BACKOFF_MAX);
        }
        bail!("terminal produced no output after {READY_ATTEMPTS} attempts")
    }

    fn screen(&self) -> Result<MutexGuard<'_, vt100::Parser>> {
        lock(&self.screen)
    }

    fn ensure_alive(&mut self) -> Result<()> {
        if self.closed {
            bail!("terminal is shut down");
        }
        if let Some(status) = self.child.try_wait()? {
            bail!("terminal exited unexpectedly with {status:?}");
        }
        Ok(())
    }

    fn cursor_on(&self) -> bool {
        !self.cursor_blink
            || (self.started.elapsed().as_millis() / BLINK_PHASE.as_millis()) % 2 == 0
    }
}

fn pty_size(rows: u16, cols: u16, style: &Style) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: style.width.min(u32::from(u16::MAX)) as u16,
        pixel_height: style.height.min(u32::from(u16::MAX)) as u16,
    }
}

#[async_trait]
impl Terminal for PtyTerminal {
    async fn apply_style(&mut self, style: &Style) -> Result<()> {
        self.ensure_alive()?;
        let (resized, (rows, cols)) = {
            let mut rasterizer = lock(&self.rasterizer)?;
            (rasterizer.set_style(style.clone()), rasterizer.grid())
        };
        self.cursor_blink = style.cursor_blink;
        self.style_epoch += 1;
        if resized {
            self.master
                .resize(pty_size(rows, cols, style))
                .context("Failed to resize PTY")?;
            self.screen()?.set_size(rows, cols);
            log::debug!("resized terminal to {cols}x{rows}");
        }
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_alive()?;
        self.writer
            .write_all(bytes)
            .context("Failed to write to terminal")?;
        self.writer.flush()?;
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Snapshot> {
        if self.closed {
            bail!("terminal is shut down");
        }
        let cursor_on = self.cursor_on();
        let screen = self.screen()?.screen().clone();

        let mut hasher = DefaultHasher::new();
        screen.contents_formatted().hash(&mut hasher);
        screen.cursor_position().hash(&mut hasher);
        cursor_on.hash(&mut hasher);
        self.style_epoch.hash(&mut hasher);
        let fingerprint = hasher.finish();
        if let Some((last, capture)) = lock(&self.last_capture)?.as_ref() {
            if *last == fingerprint {
                return Ok(capture.clone().into());
            }
        }

        let rasterizer = self.rasterizer.clone();
        let cache = self.last_capture.clone();
        Ok(Snapshot::Render(Box::new(move || {
            let image = lock(&rasterizer)?.render(&screen, cursor_on);
            let capture = Capture {
                image: Arc::new(encode_png(&image)?),
                text: screen.contents(),
            };
            *lock(&cache)? = Some((fingerprint, capture.clone()));
            Ok(capture)
        })))
    }

    async fn visible_text(&mut self) -> Result<String> {
        if self.closed {
            bail!("terminal is shut down");
        }
        Ok(self.screen()?.screen().contents())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.child.try_wait()?.is_none() {
            self.child.kill().context("Failed to stop terminal")?;
        }
        self.child.wait().context("Failed to reap terminal")?;
        Ok(())
    }
}

impl Drop for PtyTerminal {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Launches [`PtyTerminal`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyLauncher;

#[async_trait]
impl Launcher for PtyLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn Terminal>> {
        let mut terminal = PtyTerminal::spawn(&spec)?;
        terminal.wait_until_ready().await?;
        Ok(Box::new(terminal))
    }
}
