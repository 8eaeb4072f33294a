//! The fixed-interval capture loop.
//!
//! Runs as its own task next to the command stream. Each tick takes the
//! terminal lock just long enough to grab the screen, renders it after
//! releasing the lock and appends a [`Frame`] stamped with the tick time. A failed capture ends the loop and is published on the
//! failure channel; the loop is never retried.

use crate::frame::Frame;
use crate::terminal::Terminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub type SharedTerminal = Arc<tokio::sync::Mutex<Box<dyn Terminal>>>;
pub type FrameLog = Arc<Mutex<Vec<Frame>>>;

/// Handle to a running capture task. Dropping it aborts the task.
pub struct CaptureLoop {
    handle: JoinHandle<()>,
}

impl CaptureLoop {
    pub fn spawn(
        terminal: SharedTerminal,
        frames: FrameLog,
        visible: Arc<AtomicBool>,
        clock: Instant,
        interval: Duration,
        failure: watch::Sender<Option<String>>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(clock, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let tick = ticker.tick().await;
                let visible = visible.load(Ordering::SeqCst);
                let snapshot = terminal.lock().await.snapshot().await;
                let capture = match snapshot {
                    Ok(snapshot) => snapshot.finish().await,
                    Err(err) => Err(err),
                };
                let capture = match capture {
                    Ok(capture) => capture,
                    Err(err) => {
                        log::error!("screen capture failed: {err:#}");
                        failure.send_replace(Some(format!("screen capture failed: {err:#}")));
                        return;
                    }
                };
                let frame = Frame {
                    timestamp: tick.saturating_duration_since(clock),
                    image: capture.image,
                    text: capture.text,
                    visible,
                };
                match frames.lock() {
                    Ok(mut frames) => frames.push(frame),
                    Err(_) => {
                        failure.send_replace(Some("frame log lock poisoned".to_string()));
                        return;
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stop the loop and wait for it to wind down.
    pub async fn stop(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Resolves with the failure message once the capture loop has failed.
/// Pends forever if it never does.
pub async fn failed(rx: &mut watch::Receiver<Option<String>>) -> String {
    let message = match rx.wait_for(Option::is_some).await {
        Ok(message) => message.clone(),
        Err(_) => None,
    };
    match message {
        Some(message) => message,
        None => std::future::pending().await,
    }
}
