//! Turning captured frames into output files.
//!
//! Every artifact is written to a temporary file next to its destination and
//! renamed into place only once complete, so a failed or cancelled run never
//! leaves something that looks like a finished recording. Targets fail
//! independently; the run fails if any of them did.

use crate::cancel::Cancellation;
use crate::command::{OutputFormat, OutputTarget};
use crate::engine::Recording;
use crate::error::{EncodeFailure, Error};
use crate::frame::{Frame, apply_loop_offset, text_snapshots, timeline};
use crate::settings::Settings;
use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::NamedTempFile;

const SNAPSHOT_SEPARATOR: &str = "\n────────────────────────────────────────\n";

/// Write all outputs and screenshots of `recording`.
///
/// Returns the paths written, or every per-target failure at once.
pub async fn finalize(recording: &Recording, cancel: &Cancellation) -> Result<Vec<PathBuf>, Error> {
    let mut written = Vec::new();
    let mut failures = Vec::new();

    for shot in &recording.screenshots {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match write_atomic(&shot.path, &shot.image) {
            Ok(()) => written.push(shot.path.clone()),
            Err(err) => failures.push(EncodeFailure {
                path: shot.path.clone(),
                message: format!("{err:#}"),
            }),
        }
    }

    for target in &recording.outputs {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        log::info!("writing {}", target.path.display());
        match write_target(target, recording, cancel).await {
            Ok(()) => written.push(target.path.clone()),
            Err(err) if matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled)) => {
                return Err(Error::Cancelled);
            }
            Err(err) => {
                log::error!("{}: {err:#}", target.path.display());
                failures.push(EncodeFailure {
                    path: target.path.clone(),
                    message: format!("{err:#}"),
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(written)
    } else {
        Err(Error::Encode(failures))
    }
}

async fn write_target(
    target: &OutputTarget,
    recording: &Recording,
    cancel: &Cancellation,
) -> Result<()> {
    let settings = &recording.settings;
    match target.format {
        OutputFormat::Frames => write_frame_dir(&target.path, &recording.frames, cancel),
        OutputFormat::Text => {
            let frames = timeline(&recording.frames, settings.frame_interval());
            if frames.is_empty() {
                bail!("no visible frames were recorded");
            }
            let text = text_snapshots(&frames).join(SNAPSHOT_SEPARATOR);
            write_atomic(&target.path, text.as_bytes())
        }
        OutputFormat::Gif | OutputFormat::Mp4 | OutputFormat::Webm => {
            let encoder = recording
                .encoder
                .as_deref()
                .ok_or_else(|| anyhow!("no video encoder available"))?;
            let mut frames = timeline(&recording.frames, settings.frame_interval());
            if frames.is_empty() {
                bail!("no visible frames were recorded");
            }
            apply_loop_offset(&mut frames, settings.loop_offset);
            encode_video(encoder, target, &frames, settings, cancel).await
        }
    }
}

/// Write `bytes` to `path` through a sibling temp file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = temp_sibling(path)?;
    tmp.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to move output into {}", path.display()))?;
    Ok(())
}

fn parent_dir(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed to create directory {}", parent.display()))?;
    Ok(parent)
}

fn temp_sibling(path: &Path) -> Result<NamedTempFile> {
    let parent = parent_dir(path)?;
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix(".tapetty-")
        .suffix(&suffix)
        .tempfile_in(&parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))
}

fn frame_name(index: usize) -> String {
    format!("frame-{index:05}.png")
}

/// Every captured frame, hidden ones included, as numbered PNGs.
fn write_frame_dir(dir: &Path, frames: &[Frame], cancel: &Cancellation) -> Result<()> {
    if frames.is_empty() {
        bail!("no frames were recorded");
    }
    let parent = parent_dir(dir)?;
    let staging = tempfile::Builder::new()
        .prefix(".tapetty-frames-")
        .tempdir_in(&parent)
        .context("failed to create staging directory")?;
    for (index, frame) in frames.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled.into());
        }
        fs::write(staging.path().join(frame_name(index)), frame.image.as_slice())
            .context("failed to write frame")?;
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for index in 0..frames.len() {
        let name = frame_name(index);
        fs::rename(staging.path().join(&name), dir.join(&name))
            .with_context(|| format!("failed to move {name} into {}", dir.display()))?;
    }
    Ok(())
}

/// Encoder arguments for one target. `input` is the numbered PNG pattern,
/// `output` the temporary file ffmpeg writes.
pub fn ffmpeg_args(format: OutputFormat, settings: &Settings, input: &Path, output: &Path) -> Vec<String> {
    let fps = settings.framerate.max(1);
    let input_rate = f64::from(fps) * settings.playback_speed;
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-framerate",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{input_rate}"));
    args.push("-i".to_string());
    args.push(input.to_string_lossy().into_owned());
    args.push("-r".to_string());
    args.push(fps.to_string());

    let tail: &[&str] = match format {
        OutputFormat::Gif => &[
            "-filter_complex",
            "split[a][b];[a]palettegen=stats_mode=diff[p];[b][p]paletteuse=dither=bayer:bayer_scale=5:diff_mode=rectangle",
            "-loop",
            "0",
            "-f",
            "gif",
        ],
        OutputFormat::Mp4 => &[
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-crf",
            "20",
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ],
        OutputFormat::Webm => &[
            "-c:v",
            "libvpx-vp9",
            "-pix_fmt",
            "yuv420p",
            "-b:v",
            "0",
            "-crf",
            "30",
            "-f",
            "webm",
        ],
        OutputFormat::Text | OutputFormat::Frames => &[],
    };
    args.extend(tail.iter().map(|s| s.to_string()));
    args.push(output.to_string_lossy().into_owned());
    args
}

async fn encode_video(
    encoder: &Path,
    target: &OutputTarget,
    frames: &[&Frame],
    settings: &Settings,
    cancel: &Cancellation,
) -> Result<()> {
    let staging = tempfile::tempdir().context("failed to create frame staging directory")?;
    for (index, frame) in frames.iter().enumerate() {
        fs::write(staging.path().join(frame_name(index)), frame.image.as_slice())
            .context("failed to stage frame")?;
    }

    let tmp = temp_sibling(&target.path)?;
    let args = ffmpeg_args(
        target.format,
        settings,
        &staging.path().join("frame-%05d.png"),
        tmp.path(),
    );
    log::debug!("{} {}", encoder.display(), args.join(" "));

    let child = tokio::process::Command::new(encoder)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {}", encoder.display()))?;

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled.into()),
        output = child.wait_with_output() => output.context("failed waiting for encoder")?,
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "encoder failed with {} ({})",
            output.status,
            last_n_chars(&stderr, 500)
        );
    }
    tmp.persist(&target.path)
        .with_context(|| format!("failed to move output into {}", target.path.display()))?;
    Ok(())
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(ms: u64, text: &str, visible: bool) -> Frame {
        Frame {
            timestamp: Duration::from_millis(ms),
            image: Arc::new(format!("png:{text}").into_bytes()),
            text: text.to_string(),
            visible,
        }
    }

    fn recording(frames: Vec<Frame>, outputs: Vec<OutputTarget>) -> Recording {
        Recording {
            frames,
            settings: Settings::default(),
            outputs,
            screenshots: Vec::new(),
            diagnostics: Vec::new(),
            encoder: None,
            written: Vec::new(),
        }
    }

    fn target(path: PathBuf, format: OutputFormat) -> OutputTarget {
        OutputTarget { path, format }
    }

    #[test]
    fn test_gif_args() {
        let args = ffmpeg_args(
            OutputFormat::Gif,
            &Settings::default(),
            Path::new("/tmp/f/frame-%05d.png"),
            Path::new("out.gif"),
        );
        assert_eq!(args[..6], ["-hide_banner", "-loglevel", "error", "-y", "-framerate", "50"]);
        assert!(args.iter().any(|a| a.contains("palettegen")));
        assert_eq!(args.last().map(String::as_str), Some("out.gif"));
    }

    #[test]
    fn test_playback_speed_scales_input_rate() {
        let mut settings = Settings::default();
        settings.playback_speed = 2.0;
        let args = ffmpeg_args(OutputFormat::Mp4, &settings, Path::new("in"), Path::new("o.mp4"));
        assert_eq!(args[5], "100");
        assert!(args.contains(&"libx264".to_string()));
    }

    #[tokio::test]
    async fn test_text_output_skips_hidden_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let rec = recording(
            vec![
                frame(0, "> ", true),
                frame(20, "> ", true),
                frame(40, "secret", false),
                frame(60, "> ls", true),
            ],
            vec![target(path.clone(), OutputFormat::Text)],
        );
        let written = finalize(&rec, &Cancellation::never()).await.unwrap();
        assert_eq!(written, vec![path.clone()]);
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"));
        assert_eq!(text, format!("> {SNAPSHOT_SEPARATOR}> ls"));
    }

    #[tokio::test]
    async fn test_frame_dir_keeps_hidden_frames() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("frames");
        let rec = recording(
            vec![frame(0, "a", true), frame(20, "b", false)],
            vec![target(out.clone(), OutputFormat::Frames)],
        );
        finalize(&rec, &Cancellation::never()).await.unwrap();
        assert_eq!(fs::read(out.join("frame-00001.png")).unwrap(), b"png:b");
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        let bad = dir.path().join("bad.gif");
        let rec = recording(
            vec![frame(0, "a", true)],
            vec![
                target(bad.clone(), OutputFormat::Gif),
                target(good.clone(), OutputFormat::Text),
            ],
        );
        match finalize(&rec, &Cancellation::never()).await {
            Err(Error::Encode(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].path, bad);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(good.exists());
        assert!(!bad.exists());
    }

    #[tokio::test]
    async fn test_nothing_visible_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let rec = recording(
            vec![frame(0, "x", false)],
            vec![target(path.clone(), OutputFormat::Text)],
        );
        assert!(matches!(
            finalize(&rec, &Cancellation::never()).await,
            Err(Error::Encode(_))
        ));
        assert!(!path.exists());
    }

    #[cfg(unix)]
    fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_video_is_moved_into_place_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("demo.gif");
        let mut rec = recording(
            vec![frame(0, "a", true)],
            vec![target(out.clone(), OutputFormat::Gif)],
        );
        rec.encoder = Some(fake_encoder(
            dir.path(),
            r#"for last; do :; done; printf GIF89a > "$last""#,
        ));
        finalize(&rec, &Cancellation::never()).await.unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"GIF89a");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_encoder_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("demo.mp4");
        let mut rec = recording(
            vec![frame(0, "a", true)],
            vec![target(out.clone(), OutputFormat::Mp4)],
        );
        rec.encoder = Some(fake_encoder(dir.path(), "echo 'codec exploded' >&2; exit 3"));
        match finalize(&rec, &Cancellation::never()).await {
            Err(Error::Encode(failures)) => assert!(failures[0].message.contains("codec exploded")),
            other => panic!("unexpected {other:?}"),
        }
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["fake-ffmpeg".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_stops_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("demo.webm");
        let mut rec = recording(
            vec![frame(0, "a", true)],
            vec![target(out.clone(), OutputFormat::Webm)],
        );
        rec.encoder = Some(fake_encoder(dir.path(), "sleep 30"));
        let (handle, cancellation) = cancel::channel();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.cancel();
        });
        let started = std::time::Instant::now();
        let result = finalize(&rec, &cancellation).await;
        canceller.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!out.exists());
    }
}
