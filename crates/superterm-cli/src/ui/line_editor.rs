//! Single-line editor with a pre-filled buffer and history browsing.
//!
//! `LineBuffer` holds the editing state and is tested on its own;
//! `LineEditor` drives it from crossterm key events in raw mode. When stdin
//! is not a terminal, lines are read as-is.

use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use std::io::{self, BufRead, IsTerminal, Write};
use superterm_core::history::History;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Line(String),
    /// Ctrl-C on a line with text in it.
    Cancelled,
    /// Ctrl-C on an empty line.
    Interrupted,
    Eof,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
}

impl LineBuffer {
    /// Buffer holding `text` with the cursor at the end.
    pub fn with_text(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let cursor = chars.len();
        Self { chars, cursor }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.chars.len());
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.chars.len();
    }

    pub fn kill_before(&mut self) {
        self.chars.drain(..self.cursor);
        self.cursor = 0;
    }

    pub fn kill_after(&mut self) {
        self.chars.truncate(self.cursor);
    }

    /// Terminal columns between the start of the buffer and the cursor.
    pub fn cursor_columns(&self) -> usize {
        self.chars[..self.cursor]
            .iter()
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }
}

/// What a key press did to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyAction {
    Edited,
    Submit,
    Cancel,
    Eof,
    Ignored,
}

/// Applies one key to the buffer, walking `history` for Up/Down.
///
/// `stash` keeps whatever was typed before browsing started so Down can
/// bring it back.
fn apply_key(
    buffer: &mut LineBuffer,
    key: KeyEvent,
    history: &mut History,
    stash: &mut Option<String>,
) -> KeyAction {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => return KeyAction::Submit,
        KeyCode::Char('c') if ctrl => return KeyAction::Cancel,
        KeyCode::Char('d') if ctrl => {
            if buffer.is_empty() {
                return KeyAction::Eof;
            }
            buffer.delete();
        }
        KeyCode::Char('a') if ctrl => buffer.move_home(),
        KeyCode::Char('e') if ctrl => buffer.move_end(),
        KeyCode::Char('u') if ctrl => buffer.kill_before(),
        KeyCode::Char('k') if ctrl => buffer.kill_after(),
        KeyCode::Home => buffer.move_home(),
        KeyCode::End => buffer.move_end(),
        KeyCode::Left => buffer.move_left(),
        KeyCode::Right => buffer.move_right(),
        KeyCode::Backspace => buffer.backspace(),
        KeyCode::Delete => buffer.delete(),
        KeyCode::Up => {
            if stash.is_none() {
                *stash = Some(buffer.text());
            }
            match history.previous() {
                Some(entry) => *buffer = LineBuffer::with_text(entry),
                None => return KeyAction::Ignored,
            }
        }
        KeyCode::Down => match history.next() {
            Some(entry) => *buffer = LineBuffer::with_text(entry),
            None => match stash.take() {
                Some(typed) => *buffer = LineBuffer::with_text(&typed),
                None => return KeyAction::Ignored,
            },
        },
        KeyCode::Char(c) if !ctrl && !key.modifiers.contains(KeyModifiers::ALT) => {
            buffer.insert(c)
        }
        _ => return KeyAction::Ignored,
    }
    KeyAction::Edited
}

/// Leaves raw mode when dropped, including on early returns.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub struct LineEditor {
    interactive: bool,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal() && io::stdout().is_terminal(),
        }
    }

    pub fn read_line(
        &mut self,
        prompt: &str,
        prefill: Option<&str>,
        history: &mut History,
    ) -> io::Result<ReadOutcome> {
        if self.interactive {
            self.read_terminal(prompt, prefill, history)
        } else {
            read_plain()
        }
    }

    fn read_terminal(
        &mut self,
        prompt: &str,
        prefill: Option<&str>,
        history: &mut History,
    ) -> io::Result<ReadOutcome> {
        let mut buffer = LineBuffer::with_text(prefill.unwrap_or_default());
        let mut stash = None;
        history.reset_cursor();

        let _raw = RawModeGuard::enable()?;
        let mut out = io::stdout();
        let mut cursor_row = 0;
        render(&mut out, prompt, &buffer, &mut cursor_row)?;

        loop {
            let key = match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => key,
                Event::Resize(_, _) => {
                    render(&mut out, prompt, &buffer, &mut cursor_row)?;
                    continue;
                }
                _ => continue,
            };

            let action = apply_key(&mut buffer, key, history, &mut stash);
            if matches!(action, KeyAction::Submit | KeyAction::Cancel | KeyAction::Eof) {
                // Leave the cursor after the whole line before moving on.
                buffer.move_end();
                render(&mut out, prompt, &buffer, &mut cursor_row)?;
            }
            match action {
                KeyAction::Submit => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    history.reset_cursor();
                    return Ok(ReadOutcome::Line(buffer.text()));
                }
                KeyAction::Cancel => {
                    write!(out, "^C\r\n")?;
                    out.flush()?;
                    history.reset_cursor();
                    return Ok(if buffer.is_empty() {
                        ReadOutcome::Interrupted
                    } else {
                        ReadOutcome::Cancelled
                    });
                }
                KeyAction::Eof => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(ReadOutcome::Eof);
                }
                KeyAction::Edited => render(&mut out, prompt, &buffer, &mut cursor_row)?,
                KeyAction::Ignored => {}
            }
        }
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a prompt plus buffer lands once the terminal wraps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    /// Row of the last printed column, counted from the prompt's row.
    end_row: usize,
    cursor_row: usize,
    cursor_column: usize,
}

impl Layout {
    /// `total` and `cursor` are display columns from the start of the prompt.
    ///
    /// Text that exactly fills its last row is followed by a forced line break,
    /// so the end row is always `total / width`.
    fn new(total: usize, cursor: usize, width: usize) -> Self {
        let width = width.max(1);
        Self {
            end_row: total / width,
            cursor_row: cursor / width,
            cursor_column: cursor % width,
        }
    }
}

fn to_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Redraws the prompt and buffer over the previous render.
///
/// `cursor_row` is the row the cursor was left on last time, relative to the
/// prompt, and is updated for the next call.
fn render(
    out: &mut impl Write,
    prompt: &str,
    buffer: &LineBuffer,
    cursor_row: &mut usize,
) -> io::Result<()> {
    let width = terminal::size()
        .map(|(columns, _)| usize::from(columns))
        .unwrap_or(80)
        .max(1);
    let text = buffer.text();
    let total = prompt.width() + text.width();
    let layout = Layout::new(total, prompt.width() + buffer.cursor_columns(), width);

    if *cursor_row > 0 {
        queue!(out, MoveUp(to_u16(*cursor_row)))?;
    }
    queue!(
        out,
        MoveToColumn(0),
        Clear(ClearType::FromCursorDown),
        Print(prompt),
        Print(&text),
    )?;
    if total > 0 && total % width == 0 {
        queue!(out, Print("\r\n"))?;
    }

    let up = layout.end_row.saturating_sub(layout.cursor_row);
    if up > 0 {
        queue!(out, MoveUp(to_u16(up)))?;
    }
    queue!(out, MoveToColumn(to_u16(layout.cursor_column)))?;
    *cursor_row = layout.cursor_row;
    out.flush()
}

fn read_plain() -> io::Result<ReadOutcome> {
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(ReadOutcome::Eof);
    }
    Ok(ReadOutcome::Line(
        line.trim_end_matches(|c: char| c == '\n' || c == '\r')
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_buffer_editing() {
        let mut buffer = LineBuffer::with_text("ls -l");
        assert_eq!(buffer.cursor(), 5);

        buffer.insert('a');
        assert_eq!(buffer.text(), "ls -la");

        buffer.move_home();
        buffer.delete();
        buffer.insert('L');
        assert_eq!(buffer.text(), "Ls -la");

        buffer.move_end();
        buffer.backspace();
        buffer.backspace();
        assert_eq!(buffer.text(), "Ls -");

        buffer.move_left();
        buffer.kill_after();
        assert_eq!(buffer.text(), "Ls ");

        buffer.move_left();
        buffer.kill_before();
        assert_eq!(buffer.text(), " ");
        assert_eq!(buffer.cursor(), 0);

        buffer.backspace();
        buffer.move_left();
        assert_eq!(buffer.text(), " ");
        buffer.move_right();
        buffer.move_right();
        assert_eq!(buffer.cursor(), 1);
    }

    #[test]
    fn test_cursor_columns_count_wide_chars() {
        let mut buffer = LineBuffer::with_text("echo 🧠é");
        assert_eq!(buffer.cursor_columns(), 8);
        buffer.move_left();
        assert_eq!(buffer.cursor_columns(), 7);
    }

    #[test]
    fn test_keys_edit_and_submit() {
        let mut history = History::new(10);
        let mut stash = None;
        let mut buffer = LineBuffer::default();

        for c in "pwd".chars() {
            assert_eq!(
                apply_key(&mut buffer, key(KeyCode::Char(c)), &mut history, &mut stash),
                KeyAction::Edited
            );
        }
        apply_key(&mut buffer, ctrl('a'), &mut history, &mut stash);
        assert_eq!(buffer.cursor(), 0);
        apply_key(&mut buffer, ctrl('e'), &mut history, &mut stash);
        assert_eq!(buffer.cursor(), 3);

        assert_eq!(
            apply_key(&mut buffer, key(KeyCode::Enter), &mut history, &mut stash),
            KeyAction::Submit
        );
        assert_eq!(buffer.text(), "pwd");
    }

    #[test]
    fn test_ctrl_keys_cancel_and_eof() {
        let mut history = History::new(10);
        let mut stash = None;

        let mut buffer = LineBuffer::with_text("rm -rf build");
        assert_eq!(
            apply_key(&mut buffer, ctrl('c'), &mut history, &mut stash),
            KeyAction::Cancel
        );

        let mut empty = LineBuffer::default();
        assert_eq!(
            apply_key(&mut empty, ctrl('d'), &mut history, &mut stash),
            KeyAction::Eof
        );

        buffer.move_home();
        assert_eq!(
            apply_key(&mut buffer, ctrl('d'), &mut history, &mut stash),
            KeyAction::Edited
        );
        assert_eq!(buffer.text(), "m -rf build");
    }

    #[test]
    fn test_history_browsing_restores_typed_text() {
        let mut history = History::new(10);
        history.push("ls");
        history.push("df -h");
        let mut stash = None;
        let mut buffer = LineBuffer::with_text("git st");

        apply_key(&mut buffer, key(KeyCode::Up), &mut history, &mut stash);
        assert_eq!(buffer.text(), "df -h");
        apply_key(&mut buffer, key(KeyCode::Up), &mut history, &mut stash);
        assert_eq!(buffer.text(), "ls");
        apply_key(&mut buffer, key(KeyCode::Down), &mut history, &mut stash);
        assert_eq!(buffer.text(), "df -h");
        apply_key(&mut buffer, key(KeyCode::Down), &mut history, &mut stash);
        assert_eq!(buffer.text(), "git st");
        assert_eq!(
            apply_key(&mut buffer, key(KeyCode::Down), &mut history, &mut stash),
            KeyAction::Ignored
        );
    }

    #[test]
    fn test_alt_chords_are_ignored() {
        let mut history = History::new(10);
        let mut stash = None;
        let mut buffer = LineBuffer::default();
        let alt_b = KeyEvent::new(KeyCode::Char('b'), KeyModifiers::ALT);
        assert_eq!(
            apply_key(&mut buffer, alt_b, &mut history, &mut stash),
            KeyAction::Ignored
        );
        assert_eq!(
            apply_key(&mut buffer, key(KeyCode::Tab), &mut history, &mut stash),
            KeyAction::Ignored
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_layout_wraps_long_lines() {
        assert_eq!(
            Layout::new(10, 3, 80),
            Layout {
                end_row: 0,
                cursor_row: 0,
                cursor_column: 3,
            }
        );
        // A 60-column prompt with 30 columns typed on an 80-column terminal.
        assert_eq!(
            Layout::new(90, 90, 80),
            Layout {
                end_row: 1,
                cursor_row: 1,
                cursor_column: 10,
            }
        );
        assert_eq!(
            Layout::new(90, 65, 80),
            Layout {
                end_row: 1,
                cursor_row: 0,
                cursor_column: 65,
            }
        );
    }

    #[test]
    fn test_layout_at_exact_width_moves_to_next_row() {
        assert_eq!(
            Layout::new(80, 80, 80),
            Layout {
                end_row: 1,
                cursor_row: 1,
                cursor_column: 0,
            }
        );
        assert_eq!(Layout::new(0, 0, 0).cursor_column, 0);
    }
}
