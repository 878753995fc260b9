//! Console text buffer
//!
//! One growing string split by the input boundary: everything before it is history the
//! child produced (read-only), everything from it onwards is the line being typed.
//! Positions are byte offsets and always sit on `char` boundaries.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// What produced a piece of text; the renderer maps tags to colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTag {
    Output,
    Error,
    Diagnostic,
    Input,
}

/// A tagged byte range of the buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub range: Range<usize>,
    pub tag: ColorTag,
}

/// Line editing operations on the editable tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Insert(String),
    DeleteBackward,
    DeleteForward,
    MoveLeft,
    MoveRight,
    MoveHome,
    MoveEnd,
}

/// Text, spans, caret and the read-only boundary
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    text: String,
    /// Committed spans, covering exactly `0..boundary`
    spans: Vec<Span>,
    boundary: usize,
    caret: usize,
    /// Anchor of an active selection; the selection runs between it and the caret
    anchor: Option<usize>,
    /// Last line sent to the child, for echo suppression
    last_echoed: Option<String>,
    /// An echo was dropped before its line ending arrived; the `\n` that follows is part of it
    echo_open: bool,
}

impl Default for ConsoleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            spans: Vec::new(),
            boundary: 0,
            caret: 0,
            anchor: None,
            last_echoed: None,
            echo_open: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// First position the user may edit
    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn is_editable(&self, position: usize) -> bool {
        position >= self.boundary
    }

    /// Text typed since the boundary, up to the caret
    pub fn pending_input(&self) -> &str {
        let end = self.caret.max(self.boundary);
        &self.text[self.boundary..end]
    }

    pub fn last_echoed(&self) -> Option<&str> {
        self.last_echoed.as_deref()
    }

    pub fn set_last_echoed(&mut self, line: impl Into<String>) {
        self.last_echoed = Some(line.into());
    }

    /// Would appending `text` just repeat the line we sent?
    fn is_echo(&self, text: &str) -> bool {
        match self.last_echoed.as_deref() {
            Some(last) if !last.is_empty() => {
                text == last || text.strip_suffix('\n') == Some(last)
            }
            _ => false,
        }
    }

    /// Append child output at the end. The whole buffer becomes read-only.
    ///
    /// Returns false when the text was dropped as an echo of the last input line. An echo
    /// may arrive split from its line ending, so a `\n` directly after a dropped echo is
    /// dropped with it.
    pub fn append(&mut self, text: &str, tag: ColorTag) -> bool {
        let mut text = text;
        if std::mem::take(&mut self.echo_open) {
            if let Some(rest) = text.strip_prefix('\n') {
                if rest.is_empty() {
                    return false;
                }
                text = rest;
            }
        }
        if self.is_echo(text) {
            self.echo_open = !text.ends_with('\n');
            return false;
        }
        self.push(text, tag);
        true
    }

    /// Append without echo suppression
    pub fn push(&mut self, text: &str, tag: ColorTag) {
        self.echo_open = false;
        self.seal_pending();
        if !text.is_empty() {
            let start = self.text.len();
            self.text.push_str(text);
            self.push_span(start..self.text.len(), tag);
        }
        self.boundary = self.text.len();
        self.caret = self.boundary;
        self.anchor = None;
    }

    /// Make a submitted line read-only
    pub fn commit_input(&mut self) {
        self.seal_pending();
        self.boundary = self.text.len();
        self.caret = self.caret.max(self.boundary);
        self.anchor = None;
    }

    pub fn clear(&mut self) {
        self.echo_open = false;
        self.text.clear();
        self.spans.clear();
        self.boundary = 0;
        self.caret = 0;
        self.anchor = None;
    }

    /// Committed spans plus the editable tail as `Input`
    pub fn spans(&self) -> Vec<Span> {
        let mut spans = self.spans.clone();
        if self.boundary < self.text.len() {
            spans.push(Span {
                range: self.boundary..self.text.len(),
                tag: ColorTag::Input,
            });
        }
        spans
    }

    /// Text typed before a boundary move becomes an `Input` span
    fn seal_pending(&mut self) {
        if self.boundary < self.text.len() {
            self.push_span(self.boundary..self.text.len(), ColorTag::Input);
        }
    }

    fn push_span(&mut self, range: Range<usize>, tag: ColorTag) {
        if let Some(last) = self.spans.last_mut() {
            if last.tag == tag && last.range.end == range.start {
                last.range.end = range.end;
                return;
            }
        }
        self.spans.push(Span { range, tag });
    }

    /// Move the caret, snapping to a char boundary inside the text
    pub fn set_caret(&mut self, position: usize) {
        self.caret = self.snap(position);
        self.anchor = None;
    }

    /// Select `range`; the caret lands on its end
    pub fn select(&mut self, range: Range<usize>) {
        let start = self.snap(range.start);
        let end = self.snap(range.end);
        if start == end {
            self.set_caret(start);
            return;
        }
        self.anchor = Some(start);
        self.caret = end;
    }

    pub fn clear_selection(&mut self) {
        self.anchor = None;
    }

    pub fn selection(&self) -> Option<Range<usize>> {
        self.anchor.map(|anchor| {
            if anchor <= self.caret {
                anchor..self.caret
            } else {
                self.caret..anchor
            }
        })
    }

    pub fn selected_text(&self) -> Option<&str> {
        self.selection().map(|r| &self.text[r])
    }

    /// Start of the selection, or the caret when nothing is selected
    pub fn selection_start(&self) -> usize {
        self.selection().map_or(self.caret, |r| r.start)
    }

    fn snap(&self, position: usize) -> usize {
        let mut pos = position.min(self.text.len());
        while !self.text.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

    fn prev_char(&self, pos: usize) -> usize {
        self.text[..pos].char_indices().next_back().map_or(0, |(i, _)| i)
    }

    fn next_char(&self, pos: usize) -> usize {
        self.text[pos..]
            .chars()
            .next()
            .map_or(pos, |ch| pos + ch.len_utf8())
    }

    /// Apply a line editing operation. Nothing before the boundary is ever modified.
    ///
    /// Returns whether the buffer or caret changed.
    pub fn edit(&mut self, op: EditOp) -> bool {
        match op {
            EditOp::Insert(text) => {
                if text.is_empty() {
                    return false;
                }
                let at = match self.selection() {
                    Some(range) if range.start >= self.boundary => {
                        self.text.replace_range(range.clone(), "");
                        range.start
                    }
                    Some(_) => return false,
                    None => self.caret,
                };
                if at < self.boundary {
                    return false;
                }
                self.text.insert_str(at, &text);
                self.caret = at + text.len();
                self.anchor = None;
                true
            }
            EditOp::DeleteBackward => {
                if let Some(range) = self.selection() {
                    return self.delete_range(range);
                }
                if self.caret <= self.boundary {
                    return false;
                }
                let start = self.prev_char(self.caret);
                self.delete_range(start..self.caret)
            }
            EditOp::DeleteForward => {
                if let Some(range) = self.selection() {
                    return self.delete_range(range);
                }
                if self.caret < self.boundary || self.caret >= self.text.len() {
                    return false;
                }
                let end = self.next_char(self.caret);
                self.delete_range(self.caret..end)
            }
            EditOp::MoveLeft => {
                let target = match self.selection() {
                    Some(range) => range.start,
                    None => self.prev_char(self.caret),
                };
                self.move_caret(target)
            }
            EditOp::MoveRight => {
                let target = match self.selection() {
                    Some(range) => range.end,
                    None => self.next_char(self.caret),
                };
                self.move_caret(target)
            }
            EditOp::MoveHome => {
                let target = if self.caret >= self.boundary { self.boundary } else { 0 };
                self.move_caret(target)
            }
            EditOp::MoveEnd => {
                let target = self.text.len();
                self.move_caret(target)
            }
        }
    }

    fn delete_range(&mut self, range: Range<usize>) -> bool {
        if range.start < self.boundary || range.is_empty() {
            return false;
        }
        self.text.replace_range(range.clone(), "");
        self.caret = range.start;
        self.anchor = None;
        true
    }

    fn move_caret(&mut self, target: usize) -> bool {
        let changed = target != self.caret || self.anchor.is_some();
        self.caret = target;
        self.anchor = None;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(buffer: &mut ConsoleBuffer, text: &str) {
        for ch in text.chars() {
            buffer.edit(EditOp::Insert(ch.to_string()));
        }
    }

    #[test]
    fn test_append_moves_boundary_to_end() {
        let mut buffer = ConsoleBuffer::new();
        for chunk in ["hello", "\n", "wörld ", ""] {
            let before = buffer.boundary();
            buffer.append(chunk, ColorTag::Output);
            assert_eq!(buffer.boundary(), buffer.len());
            assert!(buffer.boundary() >= before);
        }
        assert_eq!(buffer.text(), "hello\nwörld ");
        assert!(!buffer.is_editable(0));
        assert!(buffer.is_editable(buffer.len()));
    }

    #[test]
    fn test_clear_resets_boundary() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("prompt> ", ColorTag::Output);
        typed(&mut buffer, "ls");
        buffer.clear();

        assert_eq!(buffer.boundary(), 0);
        assert_eq!(buffer.caret(), 0);
        assert!(buffer.is_empty());
        assert!(buffer.spans().is_empty());
        assert!(buffer.is_editable(0));
    }

    #[test]
    fn test_echo_is_dropped() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("> ", ColorTag::Output);
        buffer.set_last_echoed("hello");

        let len = buffer.len();
        assert!(!buffer.append("hello", ColorTag::Output));
        assert!(!buffer.append("hello\n", ColorTag::Output));
        assert_eq!(buffer.len(), len);

        // Anything else still goes through
        assert!(buffer.append("hello world\n", ColorTag::Output));
        assert!(buffer.append("hello\n\n", ColorTag::Output));
    }

    #[test]
    fn test_echo_split_from_line_ending() {
        let mut buffer = ConsoleBuffer::new();
        buffer.set_last_echoed("hello");

        assert!(!buffer.append("hello", ColorTag::Output));
        assert!(!buffer.append("\n", ColorTag::Output));
        assert!(buffer.is_empty());

        // Only the one newline belongs to the echo
        assert!(buffer.append("\n", ColorTag::Output));
        assert_eq!(buffer.text(), "\n");

        assert!(!buffer.append("hello", ColorTag::Output));
        assert!(buffer.append("\n$ ", ColorTag::Output));
        assert_eq!(buffer.text(), "\n$ ");
    }

    #[test]
    fn test_empty_last_line_never_suppresses() {
        let mut buffer = ConsoleBuffer::new();
        buffer.set_last_echoed("");
        assert!(buffer.append("\n", ColorTag::Output));
        assert!(buffer.append("", ColorTag::Output));
    }

    #[test]
    fn test_push_ignores_echo_rule() {
        let mut buffer = ConsoleBuffer::new();
        buffer.set_last_echoed("x");
        buffer.push("x", ColorTag::Input);
        assert_eq!(buffer.text(), "x");
        assert_eq!(buffer.boundary(), 1);
    }

    #[test]
    fn test_typing_and_pending_input() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("$ ", ColorTag::Output);
        typed(&mut buffer, "echo hi");

        assert_eq!(buffer.pending_input(), "echo hi");
        buffer.edit(EditOp::MoveLeft);
        buffer.edit(EditOp::MoveLeft);
        assert_eq!(buffer.pending_input(), "echo ");
    }

    #[test]
    fn test_backspace_stops_at_boundary() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("$ ", ColorTag::Output);
        typed(&mut buffer, "ab");

        assert!(buffer.edit(EditOp::DeleteBackward));
        assert!(buffer.edit(EditOp::DeleteBackward));
        for _ in 0..3 {
            assert!(!buffer.edit(EditOp::DeleteBackward));
            assert!(buffer.caret() >= buffer.boundary());
        }
        assert_eq!(buffer.text(), "$ ");
    }

    #[test]
    fn test_read_only_region_cannot_be_edited() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("history\n", ColorTag::Output);

        buffer.set_caret(2);
        assert!(!buffer.edit(EditOp::Insert("x".into())));
        assert!(!buffer.edit(EditOp::DeleteForward));
        assert!(!buffer.edit(EditOp::DeleteBackward));

        // A selection reaching into history is protected too
        buffer.select(3..buffer.len());
        assert!(!buffer.edit(EditOp::Insert("x".into())));
        assert!(!buffer.edit(EditOp::DeleteBackward));
        assert_eq!(buffer.text(), "history\n");
    }

    #[test]
    fn test_insert_replaces_editable_selection() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("> ", ColorTag::Output);
        typed(&mut buffer, "abcd");

        buffer.select(3..5);
        assert_eq!(buffer.selected_text(), Some("bc"));
        assert_eq!(buffer.selection_start(), 3);
        assert!(buffer.edit(EditOp::Insert("X".into())));
        assert_eq!(buffer.text(), "> aXd");
        assert_eq!(buffer.caret(), 4);
    }

    #[test]
    fn test_multibyte_caret_movement() {
        let mut buffer = ConsoleBuffer::new();
        typed(&mut buffer, "日本");
        assert_eq!(buffer.caret(), 6);

        buffer.edit(EditOp::MoveLeft);
        assert_eq!(buffer.caret(), 3);
        buffer.edit(EditOp::DeleteBackward);
        assert_eq!(buffer.text(), "本");

        buffer.set_caret(2);
        assert_eq!(buffer.caret(), 0);
    }

    #[test]
    fn test_home_end() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("$ ", ColorTag::Output);
        typed(&mut buffer, "abc");

        buffer.edit(EditOp::MoveHome);
        assert_eq!(buffer.caret(), buffer.boundary());
        buffer.edit(EditOp::MoveEnd);
        assert_eq!(buffer.caret(), buffer.len());
    }

    #[test]
    fn test_spans_cover_buffer() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("out", ColorTag::Output);
        buffer.append("more", ColorTag::Output);
        buffer.append("bad", ColorTag::Error);
        typed(&mut buffer, "typed");

        assert_eq!(
            buffer.spans(),
            vec![
                Span { range: 0..7, tag: ColorTag::Output },
                Span { range: 7..10, tag: ColorTag::Error },
                Span { range: 10..15, tag: ColorTag::Input },
            ]
        );

        // Output arriving mid-typing freezes what was typed
        buffer.append("!", ColorTag::Diagnostic);
        assert_eq!(buffer.text(), "outmorebadtyped!");
        assert_eq!(buffer.boundary(), buffer.len());
        let spans = buffer.spans();
        assert_eq!(spans[2], Span { range: 10..15, tag: ColorTag::Input });
        assert_eq!(spans[3], Span { range: 15..16, tag: ColorTag::Diagnostic });
    }

    #[test]
    fn test_commit_input() {
        let mut buffer = ConsoleBuffer::new();
        buffer.append("$ ", ColorTag::Output);
        typed(&mut buffer, "ls\n");
        buffer.commit_input();

        assert_eq!(buffer.boundary(), buffer.len());
        assert_eq!(buffer.pending_input(), "");
        assert!(!buffer.edit(EditOp::DeleteBackward));
    }
}
