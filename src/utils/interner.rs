//! Global String Interner
//!
//! Pass names, element names and lookup aliases are compared and hashed on
//! every pass of every frame, so they are interned once and carried around
//! as compact [`Name`] symbols.

use std::fmt;

use lasso::{Spur, ThreadedRodeo};
use once_cell::sync::Lazy;

/// Global interner instance
static INTERNER: Lazy<ThreadedRodeo> = Lazy::new(ThreadedRodeo::new);

/// Symbol type alias
pub type Symbol = Spur;

/// Interns a string, returning its symbol.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

/// An interned identifier for passes, elements and lookup-table entries.
///
/// Equality and hashing are O(1). An "unnamed" pass is represented by
/// `Option<Name>::None` rather than a sentinel value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Symbol);

impl Name {
    #[inline]
    #[must_use]
    pub fn new(s: &str) -> Self {
        Self(intern(s))
    }

    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        resolve(self.0)
    }

    /// Splits a dotted path `"Child.Rest"` into `("Child", "Rest")`.
    #[must_use]
    pub fn split_path(self) -> Option<(&'static str, &'static str)> {
        self.as_str().split_once('.')
    }
}

impl From<&str> for Name {
    #[inline]
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&String> for Name {
    #[inline]
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", self.as_str())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
