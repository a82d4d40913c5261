//! String interning for literals and property names.
//!
//! The interner is populated during compilation and then owned read-only by
//! the [`Program`](crate::Program). Interning deduplicates on insertion, so
//! two equal string constants share a `StringId` and the constant-pool
//! dedup can compare ids instead of contents.

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// `u32` keeps `Value` small; four billion unique strings is plenty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Write side of the interner, used while compiling.
#[derive(Debug, Default)]
pub struct InternerBuilder {
    map: AHashMap<String, StringId>,
    strings: Vec<String>,
}

impl InternerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning the existing id when already present.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(id) = self.map.get(s) {
            return *id;
        }
        let id = StringId(self.strings.len().try_into().expect("StringId overflow"));
        self.map.insert(s.to_owned(), id);
        self.strings.push(s.to_owned());
        id
    }

    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Freezes the builder into read-only storage.
    pub fn build(self) -> Interns {
        Interns { strings: self.strings }
    }
}

/// Read-only interned string storage, owned by the compiled program.
#[derive(Debug, Clone, Default)]
pub struct Interns {
    strings: Vec<String>,
}

impl Interns {
    #[inline]
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut builder = InternerBuilder::new();
        let a = builder.intern("size");
        let b = builder.intern("size");
        let c = builder.intern("add");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let interns = builder.build();
        assert_eq!(interns.get(a), "size");
        assert_eq!(interns.get(c), "add");
    }
}
