//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers: interned strings, cheap to copy and compare.
pub type Id = internment::Intern<String>;

/// Intern a string as an [`Id`].
pub fn intern(s: impl Into<String>) -> Id {
    internment::Intern::new(s.into())
}

/// A 1-based line number in the original source, used for diagnostics.
pub type Line = u32;
