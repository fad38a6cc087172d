/*!
# Source position types (Position, Span, TokenRange)

Location types shared by the lexer, the tree, the fingerprinter and the printer.
A span carries both byte coordinates and token coordinates: the printer splices
on token boundaries, diagnostics report lines and columns.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Position in source code (1-based line and column, 0-based byte offset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }

    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open range of token indices `[start, end)` into a unit's token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenRange {
    pub start: usize,
    pub end: usize,
}

impl TokenRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width range anchored before token `at`.
    pub fn empty_at(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Span in source code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    pub tokens: TokenRange,
}

impl Span {
    pub fn new(start: Position, end: Position, tokens: TokenRange) -> Self {
        Self { start, end, tokens }
    }

    /// Span of a node that was synthesised by a rewrite and has no source location.
    pub fn zero() -> Self {
        Self::new(Position::zero(), Position::zero(), TokenRange::default())
    }

    /// Zero-width span placed at `position`, before token `token`.
    pub fn empty_at(position: Position, token: usize) -> Self {
        Self::new(position, position, TokenRange::empty_at(token))
    }

    pub fn start_line(&self) -> usize {
        self.start.line
    }

    pub fn end_line(&self) -> usize {
        self.end.line
    }

    /// True for spans that never came from the parser.
    pub fn is_synthetic(&self) -> bool {
        self.start.line == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Line index for fast offset->(line,column) mapping.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts.
    line_starts: Arc<Vec<usize>>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = Vec::with_capacity(text.len() / 32 + 1);
        starts.push(0usize);
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { line_starts: Arc::new(starts) }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// 1-based position for a byte offset.
    pub fn to_position(&self, offset: usize) -> Position {
        let starts = &self.line_starts;
        let line = match starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        Position::new(line + 1, offset - starts[line] + 1, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_index_basic() {
        let text = "line1\nline2\nlast";
        let idx = LineIndex::new(text);
        assert_eq!(idx.line_count(), 3);
        let p = idx.to_position(7); // 'i' in line2
        assert_eq!(p.line, 2);
        assert_eq!(p.column, 2);
        let first = idx.to_position(0);
        assert_eq!((first.line, first.column), (1, 1));
        let line_start = idx.to_position(6);
        assert_eq!((line_start.line, line_start.column), (2, 1));
    }

    #[test]
    fn test_token_range() {
        assert!(TokenRange::empty_at(4).is_empty());
        assert_eq!(TokenRange::new(2, 5).len(), 3);
        assert!(Span::zero().is_synthetic());
    }
}
