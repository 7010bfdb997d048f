//! Source positions shared by the parser, the compiler and the source maps.

use std::ops::Range;

/// Byte range in the assembly source.
pub type Span = Range<usize>;

/// One-based line and column numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineLocation {
    pub line: usize,
    pub column: usize,
}

pub type LineSpan = Range<LineLocation>;

/// Conversion from byte offsets into line and column numbers.
pub trait AsLineSpan {
    fn as_line_span(&self, source: &str) -> LineSpan;
}

pub(crate) fn line_location(source: &str, offset: usize) -> LineLocation {
    let offset = std::cmp::min(offset, source.len());

    let mut line = 1;
    let mut column = 1;

    for ch in source[..offset].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    LineLocation { line, column }
}

impl AsLineSpan for Span {
    fn as_line_span(&self, source: &str) -> LineSpan {
        line_location(source, self.start)..line_location(source, self.end)
    }
}

/// Byte offset of `rest` inside `input`, where `rest` is a suffix of `input`.
pub(crate) fn offset_of(input: &str, rest: &str) -> usize {
    input.len() - rest.len()
}

#[test]
fn test_line_span() {
    let source = "start:\n  mov $1, r1\n";
    let span: Span = 9..19;

    let lines = span.as_line_span(source);

    assert_eq!(lines.start, LineLocation { line: 2, column: 3 });
    assert_eq!(lines.end, LineLocation { line: 2, column: 13 });
}
