use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// What the reader thread reports back to the session.
#[derive(Debug, Default)]
pub struct ReaderState {
    /// Total bytes fed into the screen model so far.
    pub bytes: AtomicU64,
    /// Set once the PTY reached EOF or a read failed.
    pub closed: AtomicBool,
}

/// Spawns a background thread that feeds PTY output into `screen`.
pub fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    screen: Arc<Mutex<vt100::Parser>>,
) -> Arc<ReaderState> {
    let state = Arc::new(ReaderState::default());
    let shared = state.clone();

    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    let Ok(mut parser) = screen.lock() else {
                        break;
                    };
                    parser.process(&buffer[..n]);
                    drop(parser);
                    shared.bytes.fetch_add(n as u64, Ordering::SeqCst);
                }
                Err(err) => {
                    log::debug!("pty read failed: {err}");
                    break;
                }
            }
        }
        shared.closed.store(true, Ordering::SeqCst);
    });

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_reader_feeds_screen_until_eof() {
        let screen = Arc::new(Mutex::new(vt100::Parser::new(4, 20, 0)));
        let state = spawn_reader(Cursor::new(b"hello\r\nworld".to_vec()), screen.clone());
        for _ in 0..100 {
            if state.closed.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(state.closed.load(Ordering::SeqCst));
        assert_eq!(state.bytes.load(Ordering::SeqCst), 12);
        let contents = screen.lock().unwrap().screen().contents();
        assert!(contents.starts_with("hello\nworld"));
    }
}
