use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tapetty::diagnostics::{self, Diagnostic, Severity};
use tapetty::{Engine, Error, cancel, load, logger, parse, resolve_sources};

/// Exit status for an interrupted recording (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "tapetty",
    about = "Record scripted terminal sessions as GIF, MP4 or WebM",
    version,
    args_conflicts_with_subcommands = true
)]
struct Args {
    #[command(subcommand)]
    command: Option<Cmd>,

    /// Tape file to record. Reads standard input when omitted or `-`
    file: Option<PathBuf>,

    /// More log output (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Check tapes for errors without running them
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl Args {
    fn level(&self) -> Option<LevelFilter> {
        if self.quiet {
            return Some(LevelFilter::Error);
        }
        match self.verbose {
            0 => None,
            1 => Some(LevelFilter::Info),
            2 => Some(LevelFilter::Debug),
            _ => Some(LevelFilter::Trace),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logger::init(logger::resolve_level(args.level()));

    let result = match &args.command {
        Some(Cmd::Validate { files }) => Ok(validate(files)),
        None => record(args.file.as_deref()).await,
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Read a tape from `path`, or standard input for `None` / `-`.
/// Returns the display name, contents and the directory `Source` resolves against.
fn read_tape(path: Option<&Path>) -> Result<(String, String, PathBuf)> {
    match path {
        Some(path) if path != Path::new("-") => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read tape file: {}", path.display()))?;
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            Ok((path.display().to_string(), content, dir))
        }
        _ => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read tape from standard input")?;
            Ok(("<stdin>".to_string(), content, PathBuf::from(".")))
        }
    }
}

async fn record(path: Option<&Path>) -> Result<ExitCode> {
    let (name, source, base_dir) = read_tape(path)?;
    let mut stderr = std::io::stderr();

    let (commands, warnings) = match load(&source, &base_dir) {
        Ok(loaded) => loaded,
        Err(err) => {
            report_error(&name, &source, err)?;
            return Ok(ExitCode::FAILURE);
        }
    };
    diagnostics::report(&mut stderr, &name, &source, &warnings)?;

    let (handle, cancellation) = cancel::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, cancelling");
            handle.cancel();
        }
    });

    let mut engine = Engine::default().with_cancellation(cancellation);
    match engine.record(commands).await {
        Ok(recording) => {
            diagnostics::report(&mut stderr, &name, &source, &recording.diagnostics)?;
            for path in &recording.written {
                println!("{}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => match err.downcast::<Error>() {
            Ok(Error::Cancelled) => {
                eprintln!("recording cancelled, no output written");
                Ok(ExitCode::from(EXIT_CANCELLED))
            }
            Ok(err) => {
                report_error(&name, &source, err)?;
                Ok(ExitCode::FAILURE)
            }
            Err(err) => Err(err),
        },
    }
}

/// Print a typed failure, with a source excerpt where it has a position.
fn report_error(name: &str, source: &str, err: Error) -> Result<()> {
    let mut stderr = std::io::stderr();
    match err {
        Error::Parse(errors) => diagnostics::report_parse_errors(&mut stderr, name, source, &errors)?,
        Error::SourceParse { path, errors } => {
            let text = std::fs::read_to_string(&path).unwrap_or_default();
            let label = path.display().to_string();
            diagnostics::report_parse_errors(&mut stderr, &label, &text, &errors)?;
        }
        Error::MissingProgram {
            ref program,
            ref file,
            line,
            column,
        } => {
            let diag = Diagnostic {
                severity: Severity::Error,
                file: file.clone(),
                line,
                column,
                message: format!("required program `{program}` was not found on PATH"),
            };
            diagnostics::report(&mut stderr, name, source, &[diag])?;
        }
        other => eprintln!("error: {other}"),
    }
    Ok(())
}

/// Parse each file and report every problem. Fails if any file is invalid.
fn validate(files: &[PathBuf]) -> ExitCode {
    let mut stderr = std::io::stderr();
    let mut ok = true;
    for file in files {
        let name = file.display().to_string();
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("error: cannot read {name}: {err}");
                ok = false;
                continue;
            }
        };
        let parsed = parse(&source);
        if !parsed.is_valid() {
            let _ = diagnostics::report_parse_errors(&mut stderr, &name, &source, &parsed.errors);
            ok = false;
            continue;
        }
        let dir = file.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        match resolve_sources(parsed.commands, dir) {
            Ok((_, warnings)) => {
                let _ = diagnostics::report(&mut stderr, &name, &source, &warnings);
                println!("{name}: ok");
            }
            Err(err) => {
                let _ = report_error(&name, &source, err);
                ok = false;
            }
        }
    }
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
