//! Mapping between memory locations and source code spans.

use std::collections::HashMap;
use std::iter::FromIterator;

use crate::parsing::{Span, LineSpan, AsLineSpan};

/// Mapping from memory addresses into source code spans. This type is generic
/// over the span type. Most common types for the generic `V` are [Span] and [LineSpan].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap<V> {
    inner: HashMap<u16, V>,
}

impl<V> FromIterator<(u16, V)> for SourceMap<V> {
    fn from_iter<I>(iter: I) -> Self
        where I: IntoIterator<Item = (u16, V)>
    {
        SourceMap {
            inner: HashMap::from_iter(iter),
        }
    }
}

impl<V> SourceMap<V> {
    /// Returns the span in the original source code which
    /// produced the byte at the given address.
    pub fn get_source_span(&self, addr: u16) -> Option<&V> {
        self.inner.get(&addr)
    }

    pub(crate) fn insert(&mut self, addr: u16, span: V) {
        self.inner.insert(addr, span);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl SourceMap<Span> {
    /// Converts a [SourceMap] containing character offset based spans ([Span])
    /// into one containing line and column number based spans ([LineSpan]).
    pub fn into_line_based(self, source: &str) -> SourceMap<LineSpan> {
        SourceMap {
            inner: self.inner.into_iter()
                .map(|(addr, span)| (addr, span.as_line_span(source)))
                .collect(),
        }
    }
}
