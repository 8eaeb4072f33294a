//! Key verbs and modifier chords.
//!
//! Script syntax: `Enter`, `Backspace@100ms 5`, `Ctrl+C`, `Alt+Shift+Left`

use super::pause;
use crate::command::{Key, KeyPress, Modifiers};
use crate::session::Session;
use anyhow::Result;

/// Bytes a terminal would receive for `key` with `modifiers` held.
pub fn key_bytes(key: Key, modifiers: Modifiers) -> Vec<u8> {
    // xterm-style modifier parameter for CSI sequences.
    let param = 1 + u8::from(modifiers.shift) + 2 * u8::from(modifiers.alt) + 4 * u8::from(modifiers.ctrl);
    let csi = |tail: char| {
        if param == 1 {
            format!("\x1b[{tail}").into_bytes()
        } else {
            format!("\x1b[1;{param}{tail}").into_bytes()
        }
    };
    let tilde = |code: u8| {
        if param == 1 {
            format!("\x1b[{code}~").into_bytes()
        } else {
            format!("\x1b[{code};{param}~").into_bytes()
        }
    };
    let alt = |bytes: Vec<u8>| {
        if modifiers.alt {
            let mut out = vec![0x1b];
            out.extend(bytes);
            out
        } else {
            bytes
        }
    };

    match key {
        Key::Up => csi('A'),
        Key::Down => csi('B'),
        Key::Right => csi('C'),
        Key::Left => csi('D'),
        Key::Home => csi('H'),
        Key::End => csi('F'),
        Key::Insert => tilde(2),
        Key::Delete => tilde(3),
        Key::PageUp => tilde(5),
        Key::PageDown => tilde(6),
        Key::Tab if modifiers.shift => b"\x1b[Z".to_vec(),
        Key::Tab => alt(b"\t".to_vec()),
        Key::Enter => alt(b"\r".to_vec()),
        Key::Escape => alt(b"\x1b".to_vec()),
        Key::Backspace if modifiers.ctrl => alt(vec![0x08]),
        Key::Backspace => alt(vec![0x7f]),
        Key::Space if modifiers.ctrl => alt(vec![0x00]),
        Key::Space => alt(b" ".to_vec()),
        Key::Char(c) if modifiers.ctrl => alt(match control_byte(c) {
            Some(byte) => vec![byte],
            None => c.to_string().into_bytes(),
        }),
        Key::Char(c) => {
            let c = if modifiers.shift { c.to_ascii_uppercase() } else { c };
            alt(c.to_string().into_bytes())
        }
    }
}

fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' | 'A'..='Z' => Some(c.to_ascii_lowercase() as u8 & 0x1f),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '-' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

/// Send the key `press.repeat` times, pausing after each press.
pub async fn execute(press: &KeyPress, session: &mut Session) -> Result<()> {
    let bytes = key_bytes(press.key, press.modifiers);
    let delay = press.speed.unwrap_or(session.settings.typing_speed);
    for _ in 0..press.repeat {
        session.send(&bytes).await?;
        pause(delay).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with(ctrl: bool, alt: bool, shift: bool) -> Modifiers {
        Modifiers { ctrl, alt, shift }
    }

    #[test]
    fn test_plain_keys() {
        let none = Modifiers::default();
        assert_eq!(key_bytes(Key::Enter, none), b"\r");
        assert_eq!(key_bytes(Key::Backspace, none), b"\x7f");
        assert_eq!(key_bytes(Key::Up, none), b"\x1b[A");
        assert_eq!(key_bytes(Key::PageDown, none), b"\x1b[6~");
        assert_eq!(key_bytes(Key::Escape, none), b"\x1b");
    }

    #[test]
    fn test_ctrl_chords() {
        assert_eq!(key_bytes(Key::Char('c'), with(true, false, false)), [0x03]);
        assert_eq!(key_bytes(Key::Char('L'), with(true, false, false)), [0x0c]);
        assert_eq!(key_bytes(Key::Char('['), with(true, false, false)), [0x1b]);
        assert_eq!(key_bytes(Key::Char('?'), with(true, false, false)), [0x7f]);
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(key_bytes(Key::Char('b'), with(false, true, false)), b"\x1bb");
        assert_eq!(key_bytes(Key::Char('x'), with(true, true, false)), [0x1b, 0x18]);
    }

    #[test]
    fn test_modified_cursor_keys() {
        assert_eq!(key_bytes(Key::Left, with(true, false, false)), b"\x1b[1;5D");
        assert_eq!(key_bytes(Key::Right, with(false, true, true)), b"\x1b[1;4C");
        assert_eq!(key_bytes(Key::Delete, with(false, false, true)), b"\x1b[3;2~");
    }

    #[test]
    fn test_shift_tab_and_shift_char() {
        assert_eq!(key_bytes(Key::Tab, with(false, false, true)), b"\x1b[Z");
        assert_eq!(key_bytes(Key::Char('a'), with(false, false, true)), b"A");
    }
}
