//! Shared position conversion helpers.
//!
//! Tree-sitter positions are zero-based. For user-facing messages, we prefer
//! one-based line and column numbers.

/// Converts a Tree-sitter position (0-based) to one-based display coordinates.
#[must_use]
pub(crate) fn point_to_one_based(pos: tree_sitter::Point) -> (u32, u32) {
    // Line/column numbers will realistically never exceed u32::MAX.
    let line = u32::try_from(pos.row.saturating_add(1)).unwrap_or(u32::MAX);
    let column = u32::try_from(pos.column.saturating_add(1)).unwrap_or(u32::MAX);
    (line, column)
}

/// Tracks one-based line and column numbers while scanning text by character.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    line: u32,
    column: u32,
}

impl Cursor {
    pub(crate) const fn start() -> Self {
        Self { line: 1, column: 1 }
    }

    pub(crate) const fn advance(&mut self, ch: char) {
        if ch == '\n' {
            self.line = self.line.saturating_add(1);
            self.column = 1;
        } else {
            self.column = self.column.saturating_add(1);
        }
    }

    pub(crate) const fn line(self) -> u32 {
        self.line
    }

    pub(crate) const fn column(self) -> u32 {
        self.column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_zero_based_points() {
        let point = tree_sitter::Point { row: 0, column: 4 };
        assert_eq!(point_to_one_based(point), (1, 5));
    }

    #[test]
    fn cursor_tracks_newlines() {
        let mut cursor = Cursor::start();
        for ch in "ab\nc".chars() {
            cursor.advance(ch);
        }
        assert_eq!((cursor.line(), cursor.column()), (2, 2));
    }
}
