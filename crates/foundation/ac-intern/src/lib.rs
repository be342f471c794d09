//! String interning for symbols
//!
//! The interner is shared by every compilation unit of a module, including
//! units resolved on worker threads, so it is backed by lasso's lock-free
//! `ThreadedRodeo` and cloned by reference count.

pub use lasso::Spur as Symbol;
use lasso::ThreadedRodeo;
use std::fmt;
use std::sync::Arc;

/// Thread-safe string interner
#[derive(Clone)]
pub struct Interner {
    inner: Arc<ThreadedRodeo>,
}

impl Interner {
    /// Creates an empty interner
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ThreadedRodeo::new()),
        }
    }

    /// Interns `text`, returning the existing symbol if it was seen before
    pub fn intern(&self, text: &str) -> Symbol {
        self.inner.get_or_intern(text)
    }

    /// Looks up a symbol without interning
    pub fn get(&self, text: &str) -> Option<Symbol> {
        self.inner.get(text)
    }

    /// Returns the text of a symbol
    pub fn resolve(&self, sym: &Symbol) -> &str {
        self.inner.resolve(sym)
    }

    /// Interns the `::`-joined path of `segments`
    pub fn qualify(&self, segments: &[&str]) -> Symbol {
        self.intern(&segments.join("::"))
    }

    /// Number of distinct strings interned so far
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing has been interned yet
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let interner = Interner::new();
        let first = interner.intern("main");
        let second = interner.intern("main");
        assert_eq!(first, second);
        assert_eq!(interner.resolve(&first), "main");
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_qualify_joins_segments() {
        let interner = Interner::new();
        let sym = interner.qualify(&["math", "add"]);
        assert_eq!(interner.resolve(&sym), "math::add");
        assert_eq!(interner.get("math::add"), Some(sym));
    }

    #[test]
    fn test_clones_share_storage() {
        let interner = Interner::new();
        let clone = interner.clone();
        let sym = clone.intern("shared");
        assert_eq!(interner.resolve(&sym), "shared");
    }
}
