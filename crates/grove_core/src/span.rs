//! Byte ranges into a query document.

use crate::location::{LineIndex, Location};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A half-open byte range `start..end` of the source a node was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A zero-width span, used for synthesized and missing nodes.
    #[must_use]
    pub const fn empty(at: u32) -> Self {
        Self::new(at, at)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// The covered text, or `""` when the span lies outside `source`.
    #[must_use]
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or_default()
    }

    /// Where the span begins, as reported in error `locations`.
    #[must_use]
    pub fn location(&self, index: &LineIndex) -> Location {
        index.location(self.start)
    }
}

impl From<Span> for miette::SourceSpan {
    fn from(span: Span) -> Self {
        let len = span.end.saturating_sub(span.start);
        (span.start as usize, len as usize).into()
    }
}
