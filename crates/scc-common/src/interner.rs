//! String interning for identifier deduplication.
//!
//! Identifiers, domain names and similar short strings are interned into
//! an `Interner`, which hands out small copyable `Atom` handles. Two atoms
//! are equal iff the underlying strings are equal, so atoms can be used as
//! cheap map keys during name resolution and unification.

use rustc_hash::FxHashMap;

/// A handle to an interned string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    pub const DUMMY: Atom = Atom(u32::MAX);
}

/// Interner mapping strings to stable `Atom` handles.
#[derive(Debug, Default)]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: FxHashMap<Box<str>, Atom>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    /// Intern a string, returning its atom. Repeated calls with the same
    /// string return the same atom.
    pub fn intern(&mut self, s: &str) -> Atom {
        if let Some(&atom) = self.lookup.get(s) {
            return atom;
        }

        let atom = Atom(self.strings.len() as u32);
        let boxed: Box<str> = s.into();
        self.strings.push(boxed.clone());
        self.lookup.insert(boxed, atom);
        atom
    }

    /// Resolve an atom back to its string.
    pub fn resolve(&self, atom: Atom) -> &str {
        &self.strings[atom.0 as usize]
    }

    /// Look up an already interned string without inserting.
    pub fn get(&self, s: &str) -> Option<Atom> {
        self.lookup.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut interner = Interner::new();
        let a = interner.intern("main");
        let b = interner.intern("main");
        let c = interner.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(a), "main");
        assert_eq!(interner.resolve(c), "other");
    }

    #[test]
    fn get_does_not_insert() {
        let mut interner = Interner::new();
        assert_eq!(interner.get("x"), None);
        let a = interner.intern("x");
        assert_eq!(interner.get("x"), Some(a));
    }
}
