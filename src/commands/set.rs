//! `Set` and `Env`: mutate session configuration.
//!
//! Style settings are pushed to a running terminal immediately. Settings
//! that only matter at launch (`Shell`, `Env`) are ignored with a warning
//! once the terminal is up.

use crate::command::{Command, Setting};
use crate::session::Session;
use anyhow::Result;

pub async fn execute(setting: &Setting, command: &Command, session: &mut Session) -> Result<()> {
    let started = session.is_started();
    match setting {
        Setting::Shell(_) if started => {
            session.warn(command, "Set Shell has no effect after the terminal started");
            return Ok(());
        }
        Setting::Framerate(_) if started => {
            session.warn(
                command,
                "Set Framerate after the terminal started only affects encoding",
            );
        }
        _ => {}
    }
    log::debug!("Set {}", setting.name());
    session.settings.apply(setting.clone());
    if started && setting.affects_style() {
        session.restyle().await?;
    }
    Ok(())
}

pub fn env(name: &str, value: &str, command: &Command, session: &mut Session) {
    if session.is_started() {
        session.warn(
            command,
            format!("Env {name} has no effect after the terminal started"),
        );
        return;
    }
    session.add_env(name.to_string(), value.to_string());
}
