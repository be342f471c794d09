//! Source file spans and locations
//!
//! Every AST node and every diagnostic carries a [`FileSpan`]. The core never
//! reads source text itself, so spans are plain byte offsets that the driver
//! maps back onto the text when it renders a report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A unique identifier for a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    /// Creates a file id from its raw index
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

/// A byte offset span in a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Start offset (inclusive)
    pub start: u32,
    /// End offset (exclusive)
    pub end: u32,
}

impl Span {
    /// Creates a span from two offsets
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Byte range of this span
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Length in bytes
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Smallest span covering both `self` and `other`
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A span with associated file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileSpan {
    /// File the span points into
    pub file: FileId,
    /// Byte range inside the file
    pub span: Span,
}

impl FileSpan {
    /// Creates a file span
    #[must_use]
    pub const fn new(file: FileId, span: Span) -> Self {
        Self { file, span }
    }

    /// Byte range of the underlying span
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.span.range()
    }

    /// Smallest span covering both; keeps the file of `self`
    #[must_use]
    pub fn to(self, other: Self) -> Self {
        Self {
            file: self.file,
            span: self.span.to(other.span),
        }
    }
}

impl fmt::Display for FileSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}..{}", self.file.0, self.span.start, self.span.end)
    }
}
