//! Operator console
//!
//! The control loop talks to the person at the terminal through two
//! operations: a non-blocking key poll and a fixed-row status line. The
//! banner and key echo rows are cosmetic extras of the same console.

pub mod terminal;

pub use terminal::TerminalConsole;

use std::io;

/// Key that ends the program
pub const QUIT_KEY: char = 'q';

/// Keyboard and status display used by the control loop.
#[cfg_attr(test, mockall::automock)]
pub trait OperatorConsole {
    /// Return a pending key press, if any. Must not block.
    fn poll_key(&mut self) -> io::Result<Option<char>>;

    /// Overwrite the status row with the current state and its readings.
    fn render_status(&mut self, label: &str, details: &str) -> io::Result<()>;

    /// Show the program name and how to quit.
    fn render_banner(&mut self, program: &str) -> io::Result<()>;

    /// Echo the last key pressed.
    fn render_key(&mut self, key: char) -> io::Result<()>;
}

impl<T: OperatorConsole + ?Sized> OperatorConsole for &mut T {
    fn poll_key(&mut self) -> io::Result<Option<char>> {
        (**self).poll_key()
    }
    fn render_status(&mut self, label: &str, details: &str) -> io::Result<()> {
        (**self).render_status(label, details)
    }
    fn render_banner(&mut self, program: &str) -> io::Result<()> {
        (**self).render_banner(program)
    }
    fn render_key(&mut self, key: char) -> io::Result<()> {
        (**self).render_key(key)
    }
}

/// Banner text shown on the first row
pub fn banner_text(program: &str) -> String {
    format!("{}: Press '{}' to end program", program, QUIT_KEY)
}

/// Key echo text shown on the second row
pub fn key_text(key: char) -> String {
    format!("Key code: '{}' ({})", key, key as u32)
}
