use crate::machine::bytecode::PrologBytecode;
use crate::machine::config::MachineConfig;
use crate::machine::instructions::{Mode, ScratchWord};
use crate::machine::machine_errors::{MachineError, Region};
use crate::machine::stack::{LocalStack, FRAME_HEADER};
use crate::types::*;

use tracing::trace;

/// The ZIP machine's registers and memory regions. Code memory and the
/// constant pool live in [`PrologBytecode`]; everything else a
/// derivation touches is here, owned by one machine instance.
#[derive(Debug)]
pub struct MachineState {
    /// Program counter.
    pub(crate) pc: usize,
    /// Processor mode, OR'd onto fetched operator words.
    pub(crate) mode: Mode,
    /// Target frame under construction, or `NONE`.
    pub(crate) tf: usize,
    /// Source frame: the executing activation, or `NONE`.
    pub(crate) sf: usize,
    /// Latest choice point, or `NONE`.
    pub(crate) cp: usize,
    /// Operand base: the frame owning the executing literal's
    /// variables. Equals the callee's frame between `call` and
    /// `enter`, the source frame otherwise.
    pub(crate) fb: usize,
    /// Argument cursor: the next parameter slot (`Arg`) or structure
    /// argument cell (`Copy`/`Match`).
    pub(crate) s: usize,
    /// The query's own frame, for reading bindings back out.
    pub(crate) query_frame: usize,
    pub(crate) halt: bool,
    pub(crate) fail: bool,

    heap: Box<[MachineWord]>,
    gt: usize,
    pub(crate) local: LocalStack,
    trail: Vec<usize>,
    trail_capacity: usize,
    scratchpad: Vec<ScratchWord>,
}

impl MachineState {
    pub fn new(config: &MachineConfig) -> Self {
        MachineState {
            pc: 0,
            mode: Mode::Arg,
            tf: NONE,
            sf: NONE,
            cp: NONE,
            fb: NONE,
            s: 0,
            query_frame: NONE,
            halt: false,
            fail: false,
            heap: vec![MachineWord::default(); config.global_capacity].into_boxed_slice(),
            gt: 0,
            local: LocalStack::with_capacity(config.local_capacity),
            trail: Vec::new(),
            trail_capacity: config.trail_capacity,
            scratchpad: Vec::new(),
        }
    }

    /// Prepares a fresh run of the query stored at `query_addr`.
    pub fn reset(&mut self, query_addr: usize) {
        self.pc = query_addr;
        self.mode = Mode::Arg;
        self.tf = NONE;
        self.sf = NONE;
        self.cp = NONE;
        self.fb = NONE;
        self.s = 0;
        self.query_frame = NONE;
        self.halt = false;
        self.fail = false;
        self.gt = 0;
        self.local.set_top(LOCAL_BASE);
        self.trail.clear();
        self.scratchpad.clear();
    }

    // === Word access and dereferencing ===

    #[inline]
    fn global_slot(&self, addr: usize) -> Result<usize, MachineError> {
        if addr < self.heap.len() {
            Ok(addr)
        } else {
            Err(MachineError::ResourceExhausted(Region::GlobalStack))
        }
    }

    pub fn read_word(&self, addr: usize) -> Result<MachineWord, MachineError> {
        if is_local(addr) {
            self.local.read(addr)
        } else {
            Ok(self.heap[self.global_slot(addr)?])
        }
    }

    pub fn write_word(&mut self, addr: usize, word: MachineWord) -> Result<(), MachineError> {
        if is_local(addr) {
            self.local.write(addr, word)
        } else {
            let slot = self.global_slot(addr)?;
            self.heap[slot] = word;
            Ok(())
        }
    }

    /// Follows `Ref` links until a non-`Ref` word or an unbound cell.
    /// Terminates because binding only ever makes references point at
    /// strictly older cells.
    pub fn deref(&self, mut addr: usize) -> Result<(usize, MachineWord), MachineError> {
        loop {
            let word = self.read_word(addr)?;

            if word.get_tag() == WordTag::Ref && word.get_value() != addr {
                addr = word.get_value();
                continue;
            }

            return Ok((addr, word));
        }
    }

    pub fn global_top(&self) -> usize {
        self.gt
    }

    pub fn trail_top(&self) -> usize {
        self.trail.len()
    }

    // === Global stack ===

    /// Pushes a structure block: the functor word followed by `arity`
    /// argument cells, each born unbound. Returns the block address,
    /// i.e. the payload for an `Str` word.
    pub fn push_functor(&mut self, index: usize, arity: usize) -> Result<usize, MachineError> {
        let block = self.gt;

        self.global_slot(block + arity)?;
        self.heap[block] = MachineWord::functor(index);

        for cell in block + 1..block + 1 + arity {
            self.heap[cell] = MachineWord::reference(cell);
        }

        self.gt += arity + 1;
        Ok(block)
    }

    /// Pushes a fresh unbound cell, for globalizing a local variable
    /// that is about to flow into a structure.
    pub fn push_global_variable(&mut self) -> Result<usize, MachineError> {
        let addr = self.gt;

        self.global_slot(addr)?;
        self.heap[addr] = MachineWord::reference(addr);
        self.gt += 1;
        Ok(addr)
    }

    // === Binding and trailing ===

    /// Records `addr` for undoing, provided a choice point exists and
    /// the cell will survive the corresponding backtrack: every local
    /// cell qualifies, a global cell only if it predates the choice
    /// point's saved global top. Anything younger vanishes with the
    /// truncation anyway.
    pub fn trail(&mut self, addr: usize) -> Result<(), MachineError> {
        if self.cp == NONE {
            return Ok(());
        }

        if is_local(addr) || addr < self.local.saved_global_top(self.cp)? {
            if self.trail.len() == self.trail_capacity {
                return Err(MachineError::ResourceExhausted(Region::Trail));
            }

            self.trail.push(addr);
        }

        Ok(())
    }

    /// Binds one of two dereferenced cells, at least one of which is
    /// unbound, and trails the overwritten cell. An unbound cell takes
    /// the other side's value word; two unbound cells leave the
    /// younger one referencing the older, so truncating a stack never
    /// strands a live reference.
    pub fn bind(&mut self, a1: usize, a2: usize) -> Result<usize, MachineError> {
        let w1 = self.read_word(a1)?;
        let w2 = self.read_word(a2)?;

        let (addr, word) = match (w1.is_unbound_at(a1), w2.is_unbound_at(a2)) {
            (true, true) => {
                if a1 == a2 {
                    return Ok(a1);
                }

                // global cells are older than local cells and the
                // regions are ordered by address, so "younger" is a
                // plain comparison.
                let (younger, older) = if a1 > a2 { (a1, a2) } else { (a2, a1) };
                (younger, MachineWord::reference(older))
            }
            (true, false) => (a1, w2),
            (false, true) => (a2, w1),
            (false, false) => {
                debug_assert!(false, "bind requires an unbound cell");
                return Ok(a1);
            }
        };

        self.write_word(addr, word)?;
        self.trail(addr)?;
        Ok(addr)
    }

    /// Binds the unbound cell at `addr` directly to a value word, the
    /// constant and fresh-structure cases of head matching.
    pub fn bind_word(&mut self, addr: usize, word: MachineWord) -> Result<(), MachineError> {
        self.write_word(addr, word)?;
        self.trail(addr)
    }

    // === Structural unification ===

    /// Attempts full unification of the terms at two addresses, using
    /// the scratchpad as an explicit work list. Returns the addresses
    /// bound along the way, or `None` on mismatch. No occurs check:
    /// binding a variable into a term containing it builds a cyclic
    /// term rather than diverging.
    pub fn unifiable(
        &mut self,
        bytecode: &PrologBytecode,
        a1: usize,
        a2: usize,
    ) -> Result<Option<Vec<usize>>, MachineError> {
        let mark = self.scratchpad.len();
        let mut bound = Vec::new();

        self.push_on_scratchpad(a1);
        self.push_on_scratchpad(a2);

        while self.scratchpad.len() > mark {
            let a2 = self.scratchpad.pop().unwrap().get_addr();
            let a1 = self.scratchpad.pop().unwrap().get_addr();

            let (d1, w1) = self.deref(a1)?;
            let (d2, w2) = self.deref(a2)?;

            if d1 == d2 {
                continue;
            }

            match (w1.get_tag(), w2.get_tag()) {
                (WordTag::Ref, _) | (_, WordTag::Ref) => {
                    bound.push(self.bind(d1, d2)?);
                }
                (WordTag::Con, WordTag::Con) => {
                    if w1.get_value() != w2.get_value() {
                        self.scratchpad.truncate(mark);
                        return Ok(None);
                    }
                }
                (WordTag::Str, WordTag::Str) => {
                    let p1 = w1.get_value();
                    let p2 = w2.get_value();

                    let f1 = self.read_word(p1)?;
                    let f2 = self.read_word(p2)?;

                    if f1.get_value() != f2.get_value() {
                        self.scratchpad.truncate(mark);
                        return Ok(None);
                    }

                    let arity = bytecode.functor_at(f1.get_value())?.arity;

                    // left-to-right processing order: the work list is
                    // popped from the back.
                    for i in (1..arity + 1).rev() {
                        self.push_on_scratchpad(p1 + i);
                        self.push_on_scratchpad(p2 + i);
                    }
                }
                _ => {
                    self.scratchpad.truncate(mark);
                    return Ok(None);
                }
            }
        }

        Ok(Some(bound))
    }

    // === Scratchpad ===

    /// Pushes an address tagged with the current mode.
    pub fn push_on_scratchpad(&mut self, addr: usize) {
        self.scratchpad.push(ScratchWord::build_with(self.mode, addr));
    }

    /// Pops an entry, restoring its mode and returning its address.
    pub fn pop_from_scratchpad(&mut self) -> usize {
        let entry = self.scratchpad.pop().expect("scratchpad underflow");
        self.mode = entry.get_mode();
        entry.get_addr()
    }

    // === Frames and choice points ===

    /// Allocates a target frame: header only, variable cells are
    /// claimed by the instructions that first address them.
    pub fn push_target_frame(&mut self) -> Result<usize, MachineError> {
        let frame = self.local.push_frame(self.sf)?;
        self.tf = frame;
        Ok(frame)
    }

    /// Discards the target frame of a fact that never became an
    /// activation. A frame doubling as a live choice point keeps its
    /// storage for retries.
    pub fn pop_target_frame(&mut self, size: usize) {
        if self.tf == self.cp {
            self.local.set_top(self.tf + size);
        } else {
            self.local.set_top(self.tf - FRAME_HEADER);
        }

        self.tf = NONE;
    }

    /// Promotes the target frame to a choice point by populating its
    /// suffix with the machine state to restore on backtracking.
    pub fn push_choice_point(&mut self, backtrack_clause: usize) -> Result<(), MachineError> {
        self.local.promote(
            self.tf,
            backtrack_clause,
            self.gt,
            self.trail.len(),
            self.cp,
        )?;
        self.cp = self.tf;
        Ok(())
    }

    /// Finalizes the target frame as the activation of the called
    /// clause.
    pub fn push_source_frame(&mut self, size: usize) -> Result<(), MachineError> {
        // the frame's cells must fit the arena once it owns them.
        if size > 0 {
            self.local.read(self.tf + size - 1)?;
        }

        self.local.set_top(self.tf + size);
        self.sf = self.tf;
        self.tf = NONE;

        if self.local.parent_source(self.sf)? == NONE {
            self.query_frame = self.sf;
        }

        Ok(())
    }

    /// Returns control to the caller. Yields `true` when the returning
    /// frame is the query's own, i.e. the derivation is complete.
    pub fn pop_source_frame(&mut self) -> Result<bool, MachineError> {
        let parent = self.local.parent_source(self.sf)?;

        if parent == NONE {
            self.halt = true;
            return Ok(true);
        }

        self.pc = self.local.continuation(self.sf)?;

        // a live choice point at or above the frame pins its storage.
        if self.cp < self.sf {
            self.local.set_top(self.sf - FRAME_HEADER);
        }

        self.sf = parent;
        self.fb = parent;
        Ok(false)
    }

    // === Backtracking ===

    /// Restores the machine to the latest choice point and selects its
    /// backtrack clause, rewriting the suffix to the following
    /// alternative (or popping the choice point at the last one).
    /// Returns the clause's code address, or `None` when no choice
    /// point is left. Cells unbound by the trail walk are appended to
    /// `vars`, which must come in empty.
    pub fn backtrack(
        &mut self,
        bytecode: &PrologBytecode,
        vars: &mut Vec<usize>,
    ) -> Result<Option<usize>, MachineError> {
        if !vars.is_empty() {
            return Err(MachineError::BindingBufferNotEmpty);
        }

        if self.cp == NONE {
            return Ok(None);
        }

        let frame = self.cp;

        self.gt = self.local.saved_global_top(frame)?;
        self.local.set_top(self.local.saved_local_top(frame)?);
        self.sf = self.local.parent_source(frame)?;

        let trail_top = self.local.saved_trail_top(frame)?;

        for addr in self.trail.drain(trail_top..) {
            if is_local(addr) {
                self.local.write(addr, MachineWord::reference(addr))?;
            } else {
                self.heap[addr] = MachineWord::reference(addr);
            }

            vars.push(addr);
        }

        let clause_index = self.local.backtrack_clause(frame)?;
        let clause = bytecode.clause_at(clause_index)?;

        match clause.next {
            Some(next) => {
                self.local.set_backtrack_clause(frame, next)?;
            }
            None => {
                self.cp = self.local.previous_choice_point(frame)?;
            }
        }

        trace!(
            target: "zip::machine",
            frame,
            retry = clause.code_addr,
            "backtrack"
        );

        // the frame, dangling above the restored top, is retried as
        // the target frame: its parameter slots still hold the
        // caller's arguments.
        self.tf = frame;
        self.s = frame;
        self.fb = frame;
        self.mode = Mode::Match;
        self.halt = false;
        self.fail = false;
        self.scratchpad.clear();

        Ok(Some(clause.code_addr))
    }
}
