use crate::atom_table::*;
use crate::machine::instructions::CodeWord;
use crate::machine::machine_errors::MachineError;

use fxhash::FxHashMap;

/// A functor: an interned name paired with an arity. Atoms are 0-ary
/// functors. Interning makes index equality coincide with name/arity
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctorSymbol {
    pub name: Atom,
    pub arity: usize,
}

/// A predicate heads a chain of clause alternatives in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredicateSymbol {
    pub name: Atom,
    pub arity: usize,
    pub first: Option<usize>,
}

/// One clause alternative: its entry point, frame shape, and the next
/// alternative of the same predicate, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClauseSymbol {
    pub code_addr: usize,
    pub params: usize,
    pub locals: usize,
    pub next: Option<usize>,
}

impl ClauseSymbol {
    pub fn frame_size(&self) -> usize {
        self.params + self.locals
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Functor(FunctorSymbol),
    Predicate(PredicateSymbol),
    Clause(ClauseSymbol),
}

/// An opaque snapshot of the bytecode store, taken after the program is
/// compiled and restored after each query so query-time additions to
/// code memory and the constant pool are discarded.
#[derive(Debug, Clone, Copy)]
pub struct Memento {
    code_len: usize,
    pool_len: usize,
}

/// Code memory plus the constant pool, together with the interning
/// directories that resolve source names to pool indices.
#[derive(Debug, Default)]
pub struct PrologBytecode {
    code: Vec<CodeWord>,
    pool: Vec<Symbol>,
    atom_tbl: AtomTable,
    functor_dir: FxHashMap<(Atom, usize), usize>,
    predicate_dir: FxHashMap<(Atom, usize), usize>,
    last_clause: FxHashMap<(Atom, usize), usize>,
}

impl PrologBytecode {
    pub fn new() -> Self {
        PrologBytecode::default()
    }

    // === Code memory ===

    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    pub fn read_code(&self, addr: usize) -> Result<CodeWord, MachineError> {
        self.code
            .get(addr)
            .copied()
            .ok_or(MachineError::CodeIndexOutOfRange(addr))
    }

    pub fn append_code(&mut self, word: CodeWord) {
        self.code.push(word);
    }

    // === Constant pool ===

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn intern_atom(&mut self, name: &str) -> Atom {
        self.atom_tbl.build_with(name)
    }

    pub fn atom_str(&self, atom: Atom) -> &str {
        self.atom_tbl.as_str(atom)
    }

    /// Returns the pool index of the functor `name/arity`, interning it
    /// on first sight.
    pub fn intern_functor(&mut self, name: &str, arity: usize) -> usize {
        let name = self.atom_tbl.build_with(name);

        if let Some(&index) = self.functor_dir.get(&(name, arity)) {
            return index;
        }

        let index = self.pool.len();
        self.pool.push(Symbol::Functor(FunctorSymbol { name, arity }));
        self.functor_dir.insert((name, arity), index);
        index
    }

    /// Returns the pool index of the predicate `name/arity`, interning
    /// it (with an empty clause chain) on first sight.
    pub fn intern_predicate(&mut self, name: &str, arity: usize) -> usize {
        let name = self.atom_tbl.build_with(name);

        if let Some(&index) = self.predicate_dir.get(&(name, arity)) {
            return index;
        }

        let index = self.pool.len();
        self.pool.push(Symbol::Predicate(PredicateSymbol {
            name,
            arity,
            first: None,
        }));
        self.predicate_dir.insert((name, arity), index);
        index
    }

    /// Registers a new clause alternative for `name/arity` and links it
    /// at the end of the predicate's chain, preserving source order.
    pub fn define_clause(
        &mut self,
        name: &str,
        params: usize,
        locals: usize,
        code_addr: usize,
    ) -> Result<usize, MachineError> {
        let pred_index = self.intern_predicate(name, params);
        let key = (self.atom_tbl.build_with(name), params);

        let index = self.pool.len();
        self.pool.push(Symbol::Clause(ClauseSymbol {
            code_addr,
            params,
            locals,
            next: None,
        }));

        match self.last_clause.get(&key) {
            Some(&prev) => match &mut self.pool[prev] {
                Symbol::Clause(clause) => clause.next = Some(index),
                _ => {
                    return Err(MachineError::ConstantMiscast {
                        index: prev,
                        expected: "clause",
                    })
                }
            },
            None => match &mut self.pool[pred_index] {
                Symbol::Predicate(pred) => pred.first = Some(index),
                _ => {
                    return Err(MachineError::ConstantMiscast {
                        index: pred_index,
                        expected: "predicate",
                    })
                }
            },
        }

        self.last_clause.insert(key, index);
        Ok(index)
    }

    pub fn functor_at(&self, index: usize) -> Result<FunctorSymbol, MachineError> {
        match self.pool.get(index) {
            Some(Symbol::Functor(functor)) => Ok(*functor),
            _ => Err(MachineError::ConstantMiscast {
                index,
                expected: "functor",
            }),
        }
    }

    pub fn predicate_at(&self, index: usize) -> Result<PredicateSymbol, MachineError> {
        match self.pool.get(index) {
            Some(Symbol::Predicate(pred)) => Ok(*pred),
            _ => Err(MachineError::ConstantMiscast {
                index,
                expected: "predicate",
            }),
        }
    }

    pub fn clause_at(&self, index: usize) -> Result<ClauseSymbol, MachineError> {
        match self.pool.get(index) {
            Some(Symbol::Clause(clause)) => Ok(*clause),
            _ => Err(MachineError::ConstantMiscast {
                index,
                expected: "clause",
            }),
        }
    }

    // === Memento ===

    pub fn create_memento(&self) -> Memento {
        Memento {
            code_len: self.code.len(),
            pool_len: self.pool.len(),
        }
    }

    /// Rolls code memory and the constant pool back to the recorded
    /// snapshot. Interned atoms are kept: they are content-addressed
    /// and orphaned entries are harmless.
    pub fn restore_memento(&mut self, memento: Memento) {
        let Memento { code_len, pool_len } = memento;

        self.code.truncate(code_len);
        self.pool.truncate(pool_len);

        self.functor_dir.retain(|_, &mut index| index < pool_len);
        self.predicate_dir.retain(|_, &mut index| index < pool_len);
        self.last_clause.retain(|_, &mut index| index < pool_len);
    }
}
