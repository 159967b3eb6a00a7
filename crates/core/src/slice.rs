//! Zero-copy views into the original source string.
//!
//! Every token and error position refers back to the input through a
//! [`Slice`]: a byte range over a shared `Arc<str>`. Cloning a slice never
//! copies text, so tokens stay cheap to move between the lexer and builder.

use std::fmt;
use std::sync::Arc;

/// A byte range over a shared source string.
///
/// `start`/`end` are byte offsets into the source and always lie on
/// character boundaries (the lexer only cuts between characters).
#[derive(Clone, PartialEq, Eq)]
pub struct Slice {
    source: Arc<str>,
    start: usize,
    end: usize,
}

impl Slice {
    pub fn new(source: Arc<str>, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= source.len());
        Slice { source, start, end }
    }

    /// The text this slice covers, borrowed from the shared source.
    pub fn text(&self) -> &str {
        &self.source[self.start..self.end]
    }

    /// Byte offset of the first covered character.
    pub fn position(&self) -> usize {
        self.start
    }

    /// Covered length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The full source this slice points into.
    pub fn source(&self) -> &Arc<str> {
        &self.source
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice({:?} @ {}..{})", self.text(), self.start, self.end)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_borrows_from_shared_source() {
        let src: Arc<str> = Arc::from("2 + 3");
        let s = Slice::new(Arc::clone(&src), 4, 5);
        assert_eq!(s.text(), "3");
        assert_eq!(s.position(), 4);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn clones_share_the_source_allocation() {
        let src: Arc<str> = Arc::from("abc");
        let a = Slice::new(Arc::clone(&src), 0, 3);
        let b = a.clone();
        assert!(Arc::ptr_eq(a.source(), b.source()));
        assert_eq!(a, b);
    }

    #[test]
    fn empty_slice() {
        let src: Arc<str> = Arc::from("abc");
        let s = Slice::new(src, 1, 1);
        assert!(s.is_empty());
        assert_eq!(s.text(), "");
    }
}
