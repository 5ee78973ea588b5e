//! Interned symbol crate. Creating a symbol either inserts a new string into
//! the process-wide table, or returns a handle to the existing one. Names
//! repeat constantly in a program (every use of a binding, every call to the
//! same function), so sharing one allocation per distinct name keeps clones
//! free and comparisons cheap.
//!
//! The table only ever grows: interned strings are leaked to get the
//! `'static` borrow. A compilation run interning enough distinct names for
//! this to matter has bigger problems.

use std::collections::HashSet;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Mutex;

use lazy_static::lazy_static;

lazy_static! {
    static ref SYMBOLS: Mutex<HashSet<&'static str>> = {
        macro_rules! builtin {
            ($set:expr, $builtin:literal) => {
                $set.insert($builtin)
            };
        }

        let mut set = HashSet::new();

        // All primitive types
        builtin!(set, "int");
        builtin!(set, "float");
        builtin!(set, "bool");
        builtin!(set, "char");
        builtin!(set, "string");
        // Not the `func` keyword, but the builtin function type
        builtin!(set, "func");

        Mutex::new(set)
    };
}

/// A handle to an interned string. Copying, comparing and hashing a
/// [`Symbol`] all operate on the shared slice, so two symbols created from
/// equal strings are indistinguishable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(&'static str);

impl Symbol {
    /// Borrow the interned string
    pub fn access(&self) -> &'static str {
        self.0
    }

    fn intern(inner: &str) -> Symbol {
        // A poisoned table means another checking thread already panicked,
        // at which point there is nothing left to salvage
        let mut set = SYMBOLS.lock().unwrap();

        match set.get(inner) {
            Some(interned) => Symbol(interned),
            None => {
                let leaked: &'static str = Box::leak(String::from(inner).into_boxed_str());
                set.insert(leaked);

                Symbol(leaked)
            }
        }
    }
}

impl From<&str> for Symbol {
    fn from(inner: &str) -> Symbol {
        Symbol::intern(inner)
    }
}

impl From<String> for Symbol {
    fn from(inner: String) -> Symbol {
        Symbol::intern(&inner)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Symbol({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_symbol() {
        let s1 = Symbol::from("map");
        let s2 = Symbol::from(String::from("map"));

        assert_eq!(s1, s2);
        assert_eq!(s1.access(), "map");
    }

    #[test]
    fn builtins_are_preseeded() {
        let int = Symbol::from("int");

        assert_eq!(int.access(), "int");
    }

    #[test]
    fn distinct_strings_differ() {
        assert_ne!(Symbol::from("a"), Symbol::from("b"));
    }
}
