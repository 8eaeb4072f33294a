//! Checks that run before anything is launched: `Require`d programs and the
//! video encoder.

use crate::command::{Command, CommandKind};
use crate::error::Error;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

pub const FFMPEG_ENV: &str = "TAPETTY_FFMPEG";
const FFMPEG_HINT: &str = "https://ffmpeg.org/download.html";

/// Resolve a program name to an executable path by searching `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    find_program_in(program, std::env::var_os("PATH").as_deref())
}

fn find_program_in(program: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let path = Path::new(program);
    if path.components().count() > 1 {
        return is_executable(path).then(|| path.to_path_buf());
    }
    std::env::split_paths(path_var?)
        .flat_map(|dir| candidates(&dir, program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(windows)]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program), dir.join(format!("{program}.exe"))]
}

#[cfg(not(windows))]
fn candidates(dir: &Path, program: &str) -> Vec<PathBuf> {
    vec![dir.join(program)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Fail on the first `Require` whose program is not on `PATH`.
pub fn check_requirements(commands: &[Command]) -> Result<(), Error> {
    for command in commands {
        if let CommandKind::Require(program) = &command.kind {
            if find_program(program).is_none() {
                return Err(Error::MissingProgram {
                    program: program.clone(),
                    file: command.file.clone(),
                    line: command.position.line,
                    column: command.position.column,
                });
            }
            log::debug!("found required program {program}");
        }
    }
    Ok(())
}

/// Locate the video encoder, honoring `TAPETTY_FFMPEG`.
pub fn find_ffmpeg() -> Result<PathBuf, Error> {
    let name = std::env::var(FFMPEG_ENV).unwrap_or_else(|_| "ffmpeg".to_string());
    find_program(&name).ok_or_else(|| Error::MissingDependency {
        name,
        hint: FFMPEG_HINT.to_string(),
    })
}
