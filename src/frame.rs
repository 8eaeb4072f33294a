//! Captured frames and the fixed-rate output timeline built from them.

use crate::command::LoopOffset;
use std::sync::Arc;
use std::time::Duration;

/// One capture-loop tick. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Time since the session clock started.
    pub timestamp: Duration,
    /// PNG bytes. Unchanged screens share one allocation.
    pub image: Arc<Vec<u8>>,
    pub text: String,
    pub visible: bool,
}

/// Lay frames on a fixed-rate timeline of `interval` slots.
///
/// Slot `i` shows the latest visible frame captured at or before
/// `first + i * interval`. Hidden stretches keep their duration but hold the
/// last visible frame. A hidden stretch at the very start holds the first
/// visible frame instead.
pub fn timeline(frames: &[Frame], interval: Duration) -> Vec<&Frame> {
    let unit = interval.as_nanos().max(1);
    let slot = |frame: &Frame| frame.timestamp.as_nanos() / unit;

    let Some(first_visible) = frames.iter().find(|f| f.visible) else {
        return Vec::new();
    };
    let base = slot(&frames[0]);
    let mut out: Vec<&Frame> = Vec::new();
    let mut held = first_visible;
    for frame in frames {
        let index = (slot(frame) - base) as usize;
        while out.len() < index {
            out.push(held);
        }
        if !frame.visible {
            continue;
        }
        held = frame;
        if out.len() == index {
            out.push(frame);
        } else if let Some(last) = out.last_mut() {
            // Same slot: the newer screen wins.
            *last = frame;
        }
    }
    if let Some(last) = frames.last() {
        let end = (slot(last).saturating_sub(base)) as usize;
        while out.len() <= end {
            out.push(held);
        }
    }
    out
}

/// Rotate `frames` so playback starts at the loop offset.
pub fn apply_loop_offset<T>(frames: &mut [T], offset: LoopOffset) {
    if frames.is_empty() {
        return;
    }
    let len = frames.len();
    let shift = match offset {
        LoopOffset::Frames(n) => n as usize % len,
        LoopOffset::Percent(p) => ((len as f64 * p / 100.0).round() as usize) % len,
    };
    frames.rotate_left(shift);
}

/// Distinct consecutive screen texts, in order.
pub fn text_snapshots<'a>(frames: &[&'a Frame]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for &frame in frames {
        let text = frame.text.as_str();
        if out.last() != Some(&text) {
            out.push(text);
        }
    }
    out
}
