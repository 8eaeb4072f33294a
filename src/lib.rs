//! # Tapetty
//!
//! Record scripted terminal sessions as GIF, MP4 or WebM.
//!
//! A *tape* is a small line-oriented script. Tapetty starts a shell in a
//! pseudo-terminal, plays the tape against it while a capture loop renders
//! the screen at a fixed framerate, and hands the frames to `ffmpeg`.
//!
//! ## Quick start
//!
//! ```no_run
//! use tapetty::{Engine, load};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tape = r#"
//! Output demo.gif
//! Set FontSize 28
//! Type "echo hello"
//! Enter
//! Wait /hello/
//! Sleep 1s
//! "#;
//!
//!     let (commands, _warnings) = load(tape, Path::new("."))?;
//!     let recording = Engine::default().record(commands).await?;
//!     println!("wrote {:?}", recording.written);
//!     Ok(())
//! }
//! ```
//!
//! ## Parsing tapes
//!
//! [`parse`] returns every statement that parsed together with every syntax
//! error, which is what `tapetty validate` uses. [`parse_str`] and
//! [`parse_file`] fail with [`Error::Parse`] instead. [`load`] additionally
//! rejects blank input and splices `Source`d tapes in place.
//!
//! ## Tape syntax
//!
//! | Statement | Description |
//! |-----------|-------------|
//! | `Type "text"` | Type text, one keystroke per `TypingSpeed` |
//! | `Type@10ms "text"` | Type with a per-statement speed |
//! | `Enter`, `Tab`, `Space`, `Backspace`, `Delete`, `Insert`, `Escape` | Press a key |
//! | `Up`, `Down`, `Left`, `Right`, `PageUp`, `PageDown`, `Home`, `End` | Navigation keys |
//! | `Backspace 5`, `Up[3]`, `Left@100ms 2` | Repeat a key, optionally paced |
//! | `Ctrl+C`, `Alt+Shift+Left` | Modifier chords |
//! | `Sleep 500ms` | Pause the script (`ms`, `s`, or bare seconds) |
//! | `Wait`, `Wait+Screen@10s /ready/` | Block until the screen matches a regex |
//! | `Set Name value` | Change a setting from here on |
//! | `Output out.gif` | Add an output (`.gif`, `.mp4`, `.webm`, `.txt`, `frames/`) |
//! | `Require git` | Fail before starting unless `git` is on `PATH` |
//! | `Hide` / `Show` | Stop / resume recording frames |
//! | `Screenshot shot.png` | Save the current screen |
//! | `Source other.tape` | Splice another tape in place |
//! | `Env NAME "value"` | Set an environment variable for the shell |
//! | `Copy "text"` / `Paste` | Set the clipboard / type it |
//! | `# comment` | Full-line or inline comment |
//!
//! ## Custom terminals
//!
//! The engine only talks to a terminal through the [`Terminal`] and
//! [`Launcher`] traits. [`PtyLauncher`] is the production implementation;
//! pass your own to [`Engine::new`] to drive something else.

pub mod cancel;
pub mod capture;
pub mod command;
pub mod commands;
pub mod diagnostics;
pub mod encode;
pub mod engine;
pub mod error;
pub mod frame;
pub mod lexer;
pub mod logger;
pub mod parser;
pub mod preflight;
pub mod pty;
pub(crate) mod pty_reader;
pub mod render;
pub mod session;
pub mod settings;
pub mod shell;
pub mod terminal;
pub mod theme;

pub use cancel::{CancelHandle, Cancellation};
pub use command::{Command, CommandKind};
pub use diagnostics::{Diagnostic, Severity};
pub use engine::{Engine, Recording, State};
pub use error::{EncodeFailure, Error};
pub use frame::Frame;
pub use parser::{ParseError, Parsed, load, parse, parse_file, parse_str, resolve_sources};
pub use pty::PtyLauncher;
pub use settings::{Settings, Style};
pub use terminal::{Capture, LaunchSpec, Launcher, RenderJob, Snapshot, Terminal};
