//! Polling the terminal for the interactive `s` (skip pass) and `d` (toggle
//! diff) keys without blocking the engine.
//!
//! The terminal is switched to unbuffered, no-echo mode for the lifetime of
//! the logger and restored on drop. When stdin is not a terminal (tests,
//! pipes, CI), every poll simply reports "no key".

use std::fmt;

/// Reads single keystrokes off stdin without blocking. Only the engine
/// process owns the terminal; workers never touch it.
pub struct KeyLogger {
    #[cfg(unix)]
    inner: Option<unix::RawTerminal>,
}

impl fmt::Debug for KeyLogger {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyLogger")
    }
}

impl KeyLogger {
    /// Try to take the terminal into raw mode. Degrades to an inert reader
    /// when there is no terminal to take.
    #[cfg(unix)]
    pub fn new() -> KeyLogger {
        KeyLogger {
            inner: unix::RawTerminal::new(),
        }
    }

    /// See above; on non-unix platforms the reader is always inert.
    #[cfg(not(unix))]
    pub fn new() -> KeyLogger {
        KeyLogger {}
    }

    /// The key pressed since the last poll, if any.
    #[cfg(unix)]
    pub fn pressed_key(&mut self) -> Option<char> {
        self.inner.as_mut().and_then(|t| t.pressed_key())
    }

    /// See above.
    #[cfg(not(unix))]
    pub fn pressed_key(&mut self) -> Option<char> {
        None
    }
}

#[cfg(unix)]
mod unix {
    use libc;
    use std::mem;

    pub struct RawTerminal {
        fd: libc::c_int,
        old: libc::termios,
    }

    impl RawTerminal {
        pub fn new() -> Option<RawTerminal> {
            let fd = libc::STDIN_FILENO;
            unsafe {
                if libc::isatty(fd) != 1 {
                    return None;
                }

                let mut old: libc::termios = mem::zeroed();
                if libc::tcgetattr(fd, &mut old) != 0 {
                    return None;
                }

                let mut raw = old;
                raw.c_lflag &= !(libc::ICANON | libc::ECHO);
                if libc::tcsetattr(fd, libc::TCSAFLUSH, &raw) != 0 {
                    return None;
                }

                Some(RawTerminal { fd: fd, old: old })
            }
        }

        pub fn pressed_key(&mut self) -> Option<char> {
            unsafe {
                let mut pollfd = libc::pollfd {
                    fd: self.fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                if libc::poll(&mut pollfd, 1, 0) <= 0 {
                    return None;
                }
                if pollfd.revents & libc::POLLIN == 0 {
                    return None;
                }

                let mut byte = 0u8;
                let len = libc::read(self.fd, &mut byte as *mut u8 as *mut libc::c_void, 1);
                if len != 1 {
                    return None;
                }
                Some(byte as char)
            }
        }
    }

    impl Drop for RawTerminal {
        fn drop(&mut self) {
            unsafe {
                libc::tcsetattr(self.fd, libc::TCSAFLUSH, &self.old);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_without_a_terminal() {
        // The test harness's stdin is not a tty, so the logger must degrade
        // gracefully and report no keys.
        let mut keys = KeyLogger::new();
        assert_eq!(keys.pressed_key(), None);
    }
}
