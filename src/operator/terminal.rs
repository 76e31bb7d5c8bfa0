// src/operator/terminal.rs
// crossterm implementation of the operator console: raw mode, alternate
// screen, zero-timeout key polling and fixed-row redraws.

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute, queue,
    style::Print,
    terminal::{
        Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode,
        enable_raw_mode,
    },
};
use log::warn;
use std::io::{self, Stdout, Write, stdout};
use std::time::Duration;

use super::{OperatorConsole, banner_text, key_text};

const BANNER_ROW: u16 = 1;
const KEY_ROW: u16 = 2;
const STATUS_ROW: u16 = 3;
const COLUMN: u16 = 1;

/// Full-screen terminal console; restores the terminal when dropped
pub struct TerminalConsole {
    out: Stdout,
}

impl TerminalConsole {
    /// Switch the terminal to raw mode on the alternate screen.
    pub fn new() -> io::Result<Self> {
        let mut out = stdout();
        enable_raw_mode()?;
        if let Err(e) = execute!(out, EnterAlternateScreen, Hide, Clear(ClearType::All)) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        Ok(TerminalConsole { out })
    }

    fn write_row(&mut self, row: u16, text: &str) -> io::Result<()> {
        queue!(
            self.out,
            MoveTo(COLUMN, row),
            Print(text),
            Clear(ClearType::UntilNewLine)
        )?;
        self.out.flush()
    }
}

/// Character of a plain key press. Chords with Ctrl or Alt are dropped, so
/// Ctrl-Q and the raw-mode Ctrl-C never read as 'q' or 'c'.
fn typed_char(key: &KeyEvent) -> Option<char> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if !key.modifiers.difference(KeyModifiers::SHIFT).is_empty() {
        return None;
    }
    match key.code {
        KeyCode::Char(c) => Some(c),
        _ => None,
    }
}

impl OperatorConsole for TerminalConsole {
    fn poll_key(&mut self) -> io::Result<Option<char>> {
        while event::poll(Duration::ZERO)? {
            // crossterm also reports key release and repeat on some platforms
            if let Event::Key(key) = event::read()? {
                if let Some(c) = typed_char(&key) {
                    return Ok(Some(c));
                }
            }
        }
        Ok(None)
    }

    fn render_status(&mut self, label: &str, details: &str) -> io::Result<()> {
        self.write_row(STATUS_ROW, &format!("{}, {}", label, details))
    }

    fn render_banner(&mut self, program: &str) -> io::Result<()> {
        self.write_row(BANNER_ROW, &banner_text(program))
    }

    fn render_key(&mut self, key: char) -> io::Result<()> {
        self.write_row(KEY_ROW, &key_text(key))
    }
}

impl Drop for TerminalConsole {
    fn drop(&mut self) {
        if let Err(e) = execute!(self.out, Show, LeaveAlternateScreen) {
            warn!("Failed to leave alternate screen: {}", e);
        }
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}
