//! Console renderer using crossterm
//!
//! Lays the buffer out into screen rows (wrapping at the terminal width, honoring wide
//! characters) and draws the bottom of it, with a one-line status bar underneath.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::config::ColorConfig;
use crate::console::buffer::{ColorTag, ConsoleBuffer, Span};

const TAB_WIDTH: u16 = 8;

/// One screen cell. Wide characters occupy two columns but one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub width: u16,
    pub tag: ColorTag,
    pub selected: bool,
}

/// The buffer broken into screen rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    pub rows: Vec<Vec<Cell>>,
    /// Row and column of the caret
    pub caret: (usize, u16),
}

impl Layout {
    /// Wrap `buffer` at `width` columns
    pub fn build(buffer: &ConsoleBuffer, width: u16) -> Self {
        let width = width.max(1);
        let spans = buffer.spans();
        let selection = buffer.selection();
        let caret = buffer.caret();

        let mut rows = vec![Vec::new()];
        let mut col: u16 = 0;
        let mut caret_at = None;
        let mut span_idx = 0;

        for (offset, ch) in buffer.text().char_indices() {
            if offset == caret {
                caret_at = Some(Self::wrap_point(rows.len() - 1, col, width));
            }

            if ch == '\n' {
                rows.push(Vec::new());
                col = 0;
                continue;
            }

            let tag = tag_at(&spans, &mut span_idx, offset);
            let selected = selection.as_ref().map_or(false, |r| r.contains(&offset));

            let (glyph, cell_width, count) = if ch == '\t' {
                (' ', 1, TAB_WIDTH - col % TAB_WIDTH)
            } else {
                match ch.width() {
                    Some(w) if w > 0 => (ch, w as u16, 1),
                    // Control and zero-width characters are not drawn
                    _ => continue,
                }
            };

            for _ in 0..count {
                if col + cell_width > width {
                    rows.push(Vec::new());
                    col = 0;
                }
                if let Some(row) = rows.last_mut() {
                    row.push(Cell {
                        ch: glyph,
                        width: cell_width,
                        tag,
                        selected,
                    });
                }
                col += cell_width;
            }
        }

        let caret = caret_at.unwrap_or_else(|| Self::wrap_point(rows.len() - 1, col, width));
        if caret.0 >= rows.len() {
            rows.push(Vec::new());
        }
        Self { rows, caret }
    }

    /// A caret sitting past the last column shows at the start of the next row
    fn wrap_point(row: usize, col: u16, width: u16) -> (usize, u16) {
        if col >= width {
            (row + 1, 0)
        } else {
            (row, col)
        }
    }
}

fn tag_at(spans: &[Span], idx: &mut usize, offset: usize) -> ColorTag {
    while *idx < spans.len() && spans[*idx].range.end <= offset {
        *idx += 1;
    }
    spans
        .get(*idx)
        .filter(|s| s.range.contains(&offset))
        .map_or(ColorTag::Output, |s| s.tag)
}

/// Console renderer
pub struct Renderer {
    colors: ColorConfig,
    /// Rows scrolled up from the bottom
    scroll: usize,
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Renderer {
    pub fn new(colors: ColorConfig) -> Self {
        Self {
            colors,
            scroll: 0,
            initialized: false,
        }
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show, EnableLineWrap, LeaveAlternateScreen);
        terminal::disable_raw_mode()
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll = self.scroll.saturating_add(rows);
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.scroll = self.scroll.saturating_sub(rows);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Draw the buffer and a status line
    pub fn render(&mut self, buffer: &ConsoleBuffer, status: &str) -> io::Result<()> {
        let (cols, rows) = Self::size()?;
        let body = rows.saturating_sub(1) as usize;
        let layout = Layout::build(buffer, cols);

        let max_scroll = layout.rows.len().saturating_sub(body);
        self.scroll = self.scroll.min(max_scroll);
        let top = max_scroll - self.scroll;

        let mut stdout = io::stdout().lock();
        queue!(stdout, BeginSynchronizedUpdate, Hide)?;

        for screen_row in 0..body {
            queue!(stdout, MoveTo(0, screen_row as u16))?;
            if let Some(row) = layout.rows.get(top + screen_row) {
                self.draw_row(&mut stdout, row)?;
            }
            queue!(stdout, ResetColor, SetAttribute(Attribute::Reset), Clear(ClearType::UntilNewLine))?;
        }

        self.draw_status(&mut stdout, status, cols, rows.saturating_sub(1))?;

        let (caret_row, caret_col) = layout.caret;
        if caret_row >= top && caret_row < top + body {
            queue!(stdout, MoveTo(caret_col, (caret_row - top) as u16), Show)?;
        }

        queue!(stdout, EndSynchronizedUpdate)?;
        stdout.flush()
    }

    fn draw_row<W: Write>(&self, out: &mut W, row: &[Cell]) -> io::Result<()> {
        let mut current: Option<(ColorTag, bool)> = None;
        for cell in row {
            if current != Some((cell.tag, cell.selected)) {
                let color = self.colors.for_tag(cell.tag).to_crossterm();
                queue!(out, SetAttribute(Attribute::Reset), SetForegroundColor(color))?;
                if cell.selected {
                    queue!(out, SetAttribute(Attribute::Reverse))?;
                }
                current = Some((cell.tag, cell.selected));
            }
            queue!(out, Print(cell.ch))?;
        }
        Ok(())
    }

    fn draw_status<W: Write>(&self, out: &mut W, status: &str, cols: u16, row: u16) -> io::Result<()> {
        let mut line = String::new();
        let mut used = 0usize;
        for ch in status.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > cols as usize {
                break;
            }
            line.push(ch);
            used += w;
        }
        line.extend(std::iter::repeat(' ').take((cols as usize).saturating_sub(used)));

        queue!(
            out,
            MoveTo(0, row),
            SetAttribute(Attribute::Reverse),
            Print(line),
            SetAttribute(Attribute::Reset)
        )
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
