use anyhow::{Result, bail};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tapetty::frame::timeline;
use tapetty::{
    Capture, Engine, Error, LaunchSpec, Launcher, Severity, Snapshot, State, Style, Terminal,
    cancel, load,
};

/// Everything the fake terminal saw, shared with the test.
#[derive(Default)]
struct FakeState {
    launches: Vec<LaunchSpec>,
    input: Vec<u8>,
    screen: String,
    styles: Vec<Style>,
    shutdowns: usize,
    fail_send: bool,
    fail_capture: bool,
}

#[derive(Clone, Default)]
struct FakeLauncher {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLauncher {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

struct FakeTerminal {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self, spec: LaunchSpec) -> Result<Box<dyn Terminal>> {
        let mut state = self.state.lock().unwrap();
        state.launches.push(spec);
        state.screen = "> ".to_string();
        Ok(Box::new(FakeTerminal {
            state: self.state.clone(),
        }))
    }
}

/// A tiny line discipline: echoes input, runs `echo` on Enter, reprints the prompt.
fn feed(screen: &mut String, bytes: &[u8]) {
    for ch in String::from_utf8_lossy(bytes).chars() {
        if ch == '\r' {
            let line = screen.lines().last().unwrap_or("").to_string();
            screen.push('\n');
            if let Some(arg) = line.strip_prefix("> echo ") {
                screen.push_str(arg);
                screen.push('\n');
            }
            screen.push_str("> ");
        } else {
            screen.push(ch);
        }
    }
}

#[async_trait]
impl Terminal for FakeTerminal {
    async fn apply_style(&mut self, style: &Style) -> Result<()> {
        self.state.lock().unwrap().styles.push(style.clone());
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            bail!("connection reset");
        }
        state.input.extend_from_slice(bytes);
        feed(&mut state.screen, bytes);
        Ok(())
    }

    async fn snapshot(&mut self) -> Result<Snapshot> {
        let state = self.state.lock().unwrap();
        if state.fail_capture {
            bail!("screen went away");
        }
        Ok(Capture {
            image: Arc::new(state.screen.clone().into_bytes()),
            text: state.screen.clone(),
        }
        .into())
    }

    async fn visible_text(&mut self) -> Result<String> {
        Ok(self.state.lock().unwrap().screen.clone())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.state.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}

fn tape(source: &str) -> Vec<tapetty::Command> {
    load(source, Path::new(".")).unwrap().0
}

fn typed_error(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>().expect("typed error")
}

#[tokio::test(start_paused = true)]
async fn test_commands_run_in_order() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    let commands = tape("Set TypingSpeed 0ms\nType \"ab\"\nEnter\nType \"c\"\nCtrl+C\nUp 2\n");
    engine.evaluate(commands).await.unwrap();

    assert_eq!(engine.state(), State::Completed);
    let state = launcher.state();
    assert_eq!(state.input, b"ab\rc\x03\x1b[A\x1b[A");
    assert_eq!(state.launches.len(), 1);
    assert_eq!(state.shutdowns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_typing_speed_paces_keystrokes() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    let started = tokio::time::Instant::now();
    engine
        .evaluate(tape("Type@100ms \"abcd\"\n"))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(400));
    assert_eq!(launcher.state().input, b"abcd");
}

#[tokio::test(start_paused = true)]
async fn test_frames_are_evenly_spaced() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher);
    let recording = engine
        .evaluate(tape("Set Framerate 10\nType \"x\"\nSleep 1s\n"))
        .await
        .unwrap();

    let frames = &recording.frames;
    assert!(frames.len() >= 10, "only {} frames", frames.len());
    for pair in frames.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    for frame in frames {
        assert_eq!(frame.timestamp.as_millis() % 100, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_hidden_frames_keep_time_but_not_content() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher);
    let source = "\
Set TypingSpeed 0ms
Set Framerate 10
Type \"visible\"
Sleep 300ms
Hide
Type \" secret\"
Sleep 1s
Show
Sleep 300ms
";
    let recording = engine.evaluate(tape(source)).await.unwrap();

    let hidden: Vec<_> = recording.frames.iter().filter(|f| !f.visible).collect();
    assert!(hidden.len() >= 9);
    let interval = recording.settings.frame_interval();
    let out = timeline(&recording.frames, interval);
    // The hidden second is held on the last visible frame, not dropped.
    assert!(out.len() >= 15, "timeline has {} slots", out.len());
    let first_secret = out
        .iter()
        .position(|f| f.text.contains("secret"))
        .expect("secret shows after Show");
    assert!(first_secret >= 12);
}

#[tokio::test(start_paused = true)]
async fn test_wait_matches_prompt_and_output() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher);
    let source = "\
Set TypingSpeed 0ms
Wait
Type \"echo ready\"
Enter
Wait+Screen@2s /(?m)^ready$/
";
    let recording = engine.evaluate(tape(source)).await.unwrap();
    assert!(recording.diagnostics.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_is_a_warning() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    let source = "Set TypingSpeed 0ms\nWait@1s /never/\nType \"after\"\n";
    let recording = engine.evaluate(tape(source)).await.unwrap();

    assert_eq!(engine.state(), State::Completed);
    assert_eq!(recording.diagnostics.len(), 1);
    let warning = &recording.diagnostics[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.line, 2);
    assert!(warning.message.contains("timed out"));
    assert_eq!(launcher.state().input, b"after");
}

#[tokio::test(start_paused = true)]
async fn test_missing_requirement_fails_before_launch() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    let err = engine
        .evaluate(tape("Type \"hi\"\nRequire doesnotexist123\n"))
        .await
        .unwrap_err();

    match typed_error(&err) {
        Error::MissingProgram { program, line, .. } => {
            assert_eq!(program, "doesnotexist123");
            assert_eq!(*line, 2);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(engine.state(), State::Failed);
    assert!(launcher.state().launches.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_terminal_starts_lazily() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    let recording = engine
        .evaluate(tape("Set FontSize 30\nCopy \"x\"\nOutput out.txt\n"))
        .await
        .unwrap();
    assert!(launcher.state().launches.is_empty());
    assert!(recording.frames.is_empty());
    assert_eq!(recording.settings.font_size, 30.0);
    assert_eq!(recording.outputs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_launch_uses_shell_and_env() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    engine
        .evaluate(tape("Set Shell zsh\nEnv GREETING \"hi there\"\nSet Width 800\nHide\n"))
        .await
        .unwrap();
    let state = launcher.state();
    let spec = &state.launches[0];
    assert_eq!(spec.program, "zsh");
    assert!(spec.env.contains(&("GREETING".to_string(), "hi there".to_string())));
    assert_eq!(spec.style.width, 800);
}

#[tokio::test(start_paused = true)]
async fn test_settings_after_start() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    let source = "Hide\nSet FontSize 40\nSet Shell fish\nEnv A b\nSet TypingSpeed 1ms\n";
    let recording = engine.evaluate(tape(source)).await.unwrap();

    let state = launcher.state();
    assert_eq!(state.styles.len(), 1);
    assert_eq!(state.styles[0].font_size, 40.0);
    let lines: Vec<usize> = recording.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![3, 4]);
    assert_eq!(recording.settings.shell, "bash");
}

#[tokio::test(start_paused = true)]
async fn test_copy_then_paste() {
    let launcher = FakeLauncher::default();
    let mut engine = Engine::new(launcher.clone());
    engine
        .evaluate(tape("Set TypingSpeed 0ms\nCopy \"git status\"\nPaste\n"))
        .await
        .unwrap();
    assert_eq!(launcher.state().input, b"git status");
}

#[tokio::test(start_paused = true)]
async fn test_driver_failure_is_fatal() {
    let launcher = FakeLauncher::default();
    launcher.state().fail_send = true;
    let mut engine = Engine::new(launcher.clone());
    let err = engine
        .evaluate(tape("Type \"a\"\nType \"never\"\n"))
        .await
        .unwrap_err();
    assert!(matches!(typed_error(&err), Error::Driver(_)));
    assert_eq!(engine.state(), State::Failed);
    assert_eq!(launcher.state().shutdowns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_capture_failure_is_fatal() {
    let launcher = FakeLauncher::default();
    launcher.state().fail_capture = true;
    let mut engine = Engine::new(launcher.clone());
    let err = engine.evaluate(tape("Sleep 5s\n")).await.unwrap_err();
    assert!(matches!(typed_error(&err), Error::Driver(_)));
    assert_eq!(engine.state(), State::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_tears_down() {
    let launcher = FakeLauncher::default();
    let (handle, cancellation) = cancel::channel();
    let mut engine = Engine::new(launcher.clone()).with_cancellation(cancellation);
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.cancel();
    });
    let started = tokio::time::Instant::now();
    let err = engine.record(tape("Sleep 60s\n")).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(typed_error(&err), Error::Cancelled));
    assert_eq!(engine.state(), State::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(launcher.state().shutdowns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_engine_is_single_use() {
    let mut engine = Engine::new(FakeLauncher::default());
    engine.evaluate(tape("Hide\n")).await.unwrap();
    assert!(engine.evaluate(tape("Hide\n")).await.is_err());
}

#[tokio::test]
async fn test_record_writes_text_and_screenshot() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("session.txt");
    let png = dir.path().join("shots/one.png");
    let source = format!(
        "Output \"{}\"\nSet TypingSpeed 0ms\nSet Framerate 20\nType \"echo hi\"\nEnter\nSleep 200ms\nScreenshot \"{}\"\n",
        txt.display(),
        png.display()
    );
    let mut engine = Engine::new(FakeLauncher::default());
    let recording = engine.record(tape(&source)).await.unwrap();

    assert_eq!(recording.written.len(), 2);
    let text = fs::read_to_string(&txt).unwrap();
    assert!(text.contains("> echo hi\nhi\n> "));
    assert_eq!(fs::read(&png).unwrap(), b"> echo hi\nhi\n> ");
}

#[tokio::test]
async fn test_failed_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let txt = dir.path().join("session.txt");
    let launcher = FakeLauncher::default();
    launcher.state().fail_send = true;
    let source = format!("Output \"{}\"\nType \"x\"\n", txt.display());
    let mut engine = Engine::new(launcher);
    assert!(engine.record(tape(&source)).await.is_err());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

fn tapetty() -> Command {
    Command::new(env!("CARGO_BIN_EXE_tapetty"))
}

#[test]
fn test_validate_valid_tape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ok.tape");
    fs::write(&path, "Output demo.gif\nType \"ls\"\nEnter\nSleep 1s\n").unwrap();

    let output = tapetty().arg("validate").arg(&path).output().unwrap();
    assert!(
        output.status.success(),
        "validate failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok"));
}

#[test]
fn test_validate_reports_every_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.tape");
    fs::write(&path, "Type \"ok\"\nSleep forever\nSet Nope 1\nEnter\n").unwrap();

    let output = tapetty().arg("validate").arg(&path).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("error:").count(), 2, "stderr: {stderr}");
    assert!(stderr.contains("bad.tape:2:7"));
    assert!(stderr.contains("bad.tape:3:5"));
}

#[test]
fn test_empty_stdin_is_usage_error() {
    let mut child = tapetty()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(b"\n  \n").unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no input provided"));
}

#[test]
fn test_missing_requirement_exits_non_zero() {
    let mut child = tapetty()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"Require doesnotexist123\nType \"hi\"\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("doesnotexist123"));
    assert!(stderr.contains("<stdin>:1:1"));
}

/// Full pipeline against a real shell and encoder.
#[test]
#[ignore = "needs bash and ffmpeg"]
fn test_records_real_gif() {
    let dir = tempfile::tempdir().unwrap();
    let gif = dir.path().join("demo.gif");
    let tape_path = dir.path().join("demo.tape");
    fs::write(
        &tape_path,
        format!(
            "Output \"{}\"\nSet Width 640\nSet Height 360\nType \"echo hello\"\nEnter\nWait /hello/\nSleep 500ms\n",
            gif.display()
        ),
    )
    .unwrap();

    let output = tapetty().arg(&tape_path).output().unwrap();
    assert!(
        output.status.success(),
        "tapetty failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let bytes = fs::read(&gif).unwrap();
    assert_eq!(&bytes[..3], b"GIF");
}
