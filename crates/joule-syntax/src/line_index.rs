//! Conversion between byte offsets and (line, UTF-16 column) positions.

use rowan::{TextRange, TextSize};

/// A zero-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineCol {
    /// Line number.
    pub line: u32,
    /// Column in UTF-16 code units.
    pub col: u32,
}

/// A multi-byte character inside a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WideChar {
    /// Byte offset from the start of the line.
    start: u32,
    len_utf8: u32,
    len_utf16: u32,
}

/// Line start table for one version of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<TextSize>,
    wide_chars: Vec<Vec<WideChar>>,
    len: TextSize,
}

impl LineIndex {
    /// Index `text`.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::from(0)];
        let mut wide_chars = vec![Vec::new()];
        let mut line_start = 0u32;

        for (offset, c) in text.char_indices() {
            let offset = offset as u32;
            if c == '\n' {
                line_start = offset + 1;
                line_starts.push(TextSize::from(line_start));
                wide_chars.push(Vec::new());
                continue;
            }
            if !c.is_ascii() {
                if let Some(line) = wide_chars.last_mut() {
                    line.push(WideChar {
                        start: offset - line_start,
                        len_utf8: c.len_utf8() as u32,
                        len_utf16: c.len_utf16() as u32,
                    });
                }
            }
        }

        Self {
            line_starts,
            wide_chars,
            len: TextSize::of(text),
        }
    }

    /// Number of lines (a trailing newline starts an empty last line).
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of a byte offset. Offsets past the end are clamped.
    #[must_use]
    pub fn line_col(&self, offset: TextSize) -> LineCol {
        let offset = offset.min(self.len);
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let byte_col = u32::from(offset - self.line_starts[line]);
        let col = self.wide_chars[line]
            .iter()
            .take_while(|w| w.start < byte_col)
            .fold(byte_col, |col, w| col - w.len_utf8 + w.len_utf16);
        LineCol {
            line: line as u32,
            col,
        }
    }

    /// Byte offset of a position. Columns past the end of the line clamp to
    /// the line end; lines past the end clamp to the end of the text.
    #[must_use]
    pub fn offset(&self, pos: LineCol) -> TextSize {
        let Some(&line_start) = self.line_starts.get(pos.line as usize) else {
            return self.len;
        };
        let line_end = self
            .line_starts
            .get(pos.line as usize + 1)
            .map_or(self.len, |next| *next - TextSize::from(1));
        let line_len = u32::from(line_end - line_start);

        let mut byte_col = 0u32;
        let mut utf16_col = 0u32;
        let mut wide = self.wide_chars[pos.line as usize].iter().peekable();
        while utf16_col < pos.col && byte_col < line_len {
            match wide.peek() {
                Some(w) if w.start == byte_col => {
                    byte_col += w.len_utf8;
                    utf16_col += w.len_utf16;
                    wide.next();
                }
                _ => {
                    byte_col += 1;
                    utf16_col += 1;
                }
            }
        }
        line_start + TextSize::from(byte_col.min(line_len))
    }

    /// Start and end positions of a range.
    #[must_use]
    pub fn range(&self, range: TextRange) -> (LineCol, LineCol) {
        (self.line_col(range.start()), self.line_col(range.end()))
    }
}
