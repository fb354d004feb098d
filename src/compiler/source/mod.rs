//! This module abstracts the source code from which the compiler derives its
//! input data.  Every character of every input file is assigned a position in
//! a single global offset space; a [`Span`] is a half open interval in that
//! space and every AST node, symbol, and diagnostic carries one.  The
//! [`SourceMap`] converts a global offset back to the file and line it came
//! from when a diagnostic must be rendered.

use std::fmt::Display;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

/// A unique offset into the global space of all source code for this
/// compilation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(u32);

impl Offset {
    pub fn new(o: u32) -> Offset {
        Offset(o)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl AddAssign<u32> for Offset {
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

/// A contiguous region of source code: `[low, high)` in the global offset
/// space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    low: Offset,
    high: Offset,
}

impl Span {
    pub fn new(low: Offset, high: Offset) -> Span {
        debug_assert!(low <= high);
        Span { low, high }
    }

    pub fn zero() -> Span {
        Span::default()
    }

    pub fn low(&self) -> Offset {
        self.low
    }

    pub fn high(&self) -> Offset {
        self.high
    }

    /// The smallest span covering both `self` and `other`.
    pub fn extend_to(&self, other: Span) -> Span {
        Span {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

/// Records one unit of source code (a file or, in tests, a raw string) along
/// with the slice of the global offset space assigned to it.
#[derive(Debug)]
pub struct SourceMapEntry {
    path: PathBuf,
    text: String,
    span: Span,
    line_starts: Vec<u32>,
}

impl SourceMapEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

/// Maps the global offset space back to individual source units.  Entries are
/// appended as files are read and are never removed; the map lives for the
/// whole compilation run.
#[derive(Debug, Default)]
pub struct SourceMap {
    entries: Vec<SourceMapEntry>,
    next: u32,
}

impl SourceMap {
    pub fn new() -> SourceMap {
        SourceMap::default()
    }

    /// Adds the contents of one source unit to the map, assigning it the next
    /// free slice of the global offset space.  Returns the span that covers
    /// the added text.
    pub fn add(&mut self, path: PathBuf, text: String) -> Span {
        let low = Offset(self.next);
        let len = text.len() as u32;
        let high = Offset(self.next + len);
        self.next += len;

        let mut line_starts = vec![low.0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(low.0 + i as u32 + 1);
            }
        }

        let span = Span::new(low, high);
        self.entries.push(SourceMapEntry {
            path,
            text,
            span,
            line_starts,
        });
        span
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, idx: usize) -> Option<&SourceMapEntry> {
        self.entries.get(idx)
    }

    fn entry_of(&self, o: Offset) -> Option<&SourceMapEntry> {
        self.entries
            .iter()
            .find(|e| e.span.low() <= o && o < e.span.high() || e.span.low() == o)
    }

    /// Converts a global offset to `(file, line)` for diagnostics.  Lines are
    /// 1 based.  Offsets that fall outside every entry (e.g. synthesized
    /// nodes) render as an unknown location.
    pub fn address_of(&self, o: Offset) -> Option<(&Path, u32)> {
        let entry = self.entry_of(o)?;
        let line = match entry.line_starts.binary_search(&o.as_u32()) {
            Ok(n) => n + 1,
            Err(n) => n,
        };
        Some((entry.path.as_path(), line as u32))
    }

    /// The raw source text a span covers.  Used by diagnostics to quote the
    /// offending code back to the user.
    pub fn text_in_span(&self, span: Span) -> Option<&str> {
        let entry = self.entry_of(span.low())?;
        let lo = (span.low().as_u32() - entry.span.low().as_u32()) as usize;
        let hi = (span.high().as_u32() - entry.span.low().as_u32()) as usize;
        entry.text.get(lo..hi)
    }

    /// Renders a span as `file:line` for error message prefixes.
    pub fn format_span(&self, span: Span) -> String {
        match self.address_of(span.low()) {
            Some((path, line)) => format!("{}:{}", path.display(), line),
            None => "<unknown>".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_global_across_entries() {
        let mut sm = SourceMap::new();
        let a = sm.add(PathBuf::from("a.sbl"), "one\ntwo\n".into());
        let b = sm.add(PathBuf::from("b.sbl"), "three\n".into());

        assert_eq!(a.low(), Offset::new(0));
        assert_eq!(a.high(), Offset::new(8));
        assert_eq!(b.low(), Offset::new(8));

        let (path, line) = sm.address_of(Offset::new(5)).unwrap();
        assert_eq!(path, Path::new("a.sbl"));
        assert_eq!(line, 2);

        let (path, line) = sm.address_of(Offset::new(9)).unwrap();
        assert_eq!(path, Path::new("b.sbl"));
        assert_eq!(line, 1);
    }

    #[test]
    fn text_in_span_quotes_source() {
        let mut sm = SourceMap::new();
        sm.add(PathBuf::from("a.sbl"), "let x := 5;".into());
        let span = Span::new(Offset::new(4), Offset::new(5));
        assert_eq!(sm.text_in_span(span), Some("x"));
    }
}
