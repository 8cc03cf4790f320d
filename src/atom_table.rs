use indexmap::IndexSet;

use std::rc::Rc;

/// An interned name. Two atoms made by the same table compare equal
/// exactly when their spellings do, so functor identity checks reduce
/// to index comparisons.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct AtomTable {
    table: IndexSet<Rc<str>>,
}

impl AtomTable {
    pub fn new() -> Self {
        AtomTable {
            table: IndexSet::new(),
        }
    }

    pub fn build_with(&mut self, string: &str) -> Atom {
        if let Some(index) = self.table.get_index_of(string) {
            return Atom { index };
        }

        let (index, _) = self.table.insert_full(Rc::from(string));
        Atom { index }
    }

    pub fn as_str(&self, atom: Atom) -> &str {
        &self.table[atom.index]
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut table = AtomTable::new();

        let a1 = table.build_with("succ");
        let a2 = table.build_with("zero");
        let a3 = table.build_with("succ");

        assert_eq!(a1, a3);
        assert_ne!(a1, a2);
        assert_eq!(table.as_str(a1), "succ");
        assert_eq!(table.len(), 2);
    }
}
