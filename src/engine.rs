//! The evaluator: runs a command list against a terminal while the capture
//! loop records frames, then hands the result to the encoder.
//!
//! ```text
//! Idle -> Running -> Completed
//!                 \-> Failed
//!                 \-> Cancelled
//! ```

use crate::cancel::Cancellation;
use crate::capture;
use crate::command::{Command, CommandKind, OutputTarget};
use crate::commands;
use crate::diagnostics::Diagnostic;
use crate::encode;
use crate::error::Error;
use crate::frame::Frame;
use crate::preflight;
use crate::pty::PtyLauncher;
use crate::session::{Screenshot, Session};
use crate::settings::Settings;
use crate::terminal::Launcher;
use anyhow::{Result, bail};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct Recording {
    pub frames: Vec<Frame>,
    /// Settings as they stood after the last command.
    pub settings: Settings,
    pub outputs: Vec<OutputTarget>,
    pub screenshots: Vec<Screenshot>,
    /// Non-fatal problems, in the order they happened.
    pub diagnostics: Vec<Diagnostic>,
    /// Resolved encoder, present when a video output was requested.
    pub encoder: Option<PathBuf>,
    /// Files written by [`Engine::record`].
    pub written: Vec<PathBuf>,
}

/// Drives one recording. An engine is single-use.
pub struct Engine {
    launcher: Arc<dyn Launcher>,
    cancel: Cancellation,
    cwd: Option<PathBuf>,
    state: State,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(PtyLauncher)
    }
}

impl Engine {
    pub fn new(launcher: impl Launcher + 'static) -> Self {
        Self {
            launcher: Arc::new(launcher),
            cancel: Cancellation::never(),
            cwd: None,
            state: State::Idle,
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Working directory for the recorded shell.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Run `commands` and return the captured frames without writing any
    /// output files.
    pub async fn evaluate(&mut self, commands: Vec<Command>) -> Result<Recording> {
        let result = self.run(commands).await;
        self.finish(result)
    }

    /// Run `commands`, then write every `Output` target and screenshot.
    pub async fn record(&mut self, commands: Vec<Command>) -> Result<Recording> {
        let result = match self.run(commands).await {
            Ok(mut recording) => match encode::finalize(&recording, &self.cancel).await {
                Ok(written) => {
                    recording.written = written;
                    Ok(recording)
                }
                Err(err) => Err(err.into()),
            },
            Err(err) => Err(err),
        };
        self.finish(result)
    }

    fn finish(&mut self, result: Result<Recording>) -> Result<Recording> {
        self.state = match &result {
            Ok(_) => State::Completed,
            Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled)) => {
                State::Cancelled
            }
            Err(_) => State::Failed,
        };
        log::info!("recording {:?}", self.state);
        result
    }

    async fn run(&mut self, commands: Vec<Command>) -> Result<Recording> {
        if self.state != State::Idle {
            bail!("engine already ran");
        }

        // Pre-flight gates everything, including terminal startup.
        preflight::check_requirements(&commands)?;
        let wants_encoder = commands.iter().any(|c| {
            matches!(&c.kind, CommandKind::Output(target) if target.format.needs_encoder())
        });
        let encoder = if wants_encoder {
            Some(preflight::find_ffmpeg()?)
        } else {
            None
        };

        self.state = State::Running;
        let mut session =
            Session::new(Settings::default(), self.launcher.clone()).with_cwd(self.cwd.clone());
        let outcome = self.drive(&commands, &mut session).await;
        // Teardown runs on every path; the first error wins.
        let closed = session.close().await;
        outcome?;
        closed?;

        Ok(Recording {
            frames: session.frames(),
            settings: session.settings.clone(),
            outputs: std::mem::take(&mut session.outputs),
            screenshots: std::mem::take(&mut session.screenshots),
            diagnostics: std::mem::take(&mut session.diagnostics),
            encoder,
            written: Vec::new(),
        })
    }

    async fn drive(&self, commands: &[Command], session: &mut Session) -> Result<()> {
        let mut failures = session.capture_failures();
        for command in commands {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled.into());
            }
            log::debug!(
                "{}:{} {}",
                command.position.line,
                command.position.column,
                command.name()
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled.into()),
                message = capture::failed(&mut failures) => {
                    return Err(Error::Driver(anyhow::anyhow!(message)).into());
                }
                result = commands::execute(command, session) => result?,
            }
        }
        // A capture that failed after the last command still fails the run.
        if let Some(message) = failures.borrow().clone() {
            return Err(Error::Driver(anyhow::anyhow!(message)).into());
        }
        Ok(())
    }
}
