//! Launch lines for supported shells.
//!
//! Known shells start without user rc files and with a plain `> ` prompt so
//! recordings look the same on every machine and the default `WaitPattern`
//! (`>$`) matches an idle prompt.

use crate::settings::Style;
use crate::terminal::LaunchSpec;

const PROMPT: &str = "> ";

/// Build the launch spec for `shell` with user-provided environment.
pub fn launch_spec(shell: &str, env: &[(String, String)], style: Style) -> LaunchSpec {
    let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let (program, args, mut vars): (String, Vec<String>, Vec<(String, String)>) = match shell {
        "bash" => (
            "bash".into(),
            owned(&["--noprofile", "--norc", "--login", "+o", "history"]),
            vec![("PS1".into(), PROMPT.into())],
        ),
        "zsh" => (
            "zsh".into(),
            owned(&["--histnofile", "--no-rcs"]),
            vec![("PROMPT".into(), PROMPT.into())],
        ),
        "fish" => (
            "fish".into(),
            vec![
                "--login".into(),
                "--no-config".into(),
                "--private".into(),
                "-C".into(),
                format!(
                    "function fish_greeting; end; function fish_prompt; echo -n '{PROMPT}'; end"
                ),
            ],
            Vec::new(),
        ),
        "sh" | "dash" => (shell.into(), Vec::new(), vec![("PS1".into(), PROMPT.into())]),
        other => {
            let mut words = other.split_whitespace().map(String::from);
            let program = words.next().unwrap_or_else(|| "sh".into());
            (program, words.collect(), Vec::new())
        }
    };
    vars.push(("TERM".into(), "xterm-256color".into()));
    vars.extend(env.iter().cloned());
    LaunchSpec {
        program,
        args,
        env: vars,
        cwd: None,
        style,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_has_plain_prompt() {
        let spec = launch_spec("bash", &[], Style::default());
        assert_eq!(spec.program, "bash");
        assert!(spec.args.contains(&"--norc".to_string()));
        assert!(spec.env.contains(&("PS1".into(), "> ".into())));
    }

    #[test]
    fn test_custom_shell_is_split() {
        let spec = launch_spec("python3 -q", &[], Style::default());
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-q".to_string()]);
    }

    #[test]
    fn test_user_env_comes_last() {
        let env = vec![("PS1".to_string(), "$ ".to_string())];
        let spec = launch_spec("sh", &env, Style::default());
        assert_eq!(spec.env.last(), Some(&("PS1".to_string(), "$ ".to_string())));
    }
}
