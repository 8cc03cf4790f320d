pub mod bytecode;
pub mod config;
pub mod instructions;
pub mod machine_errors;
pub mod machine_state;
pub mod stack;

use crate::compiler::{self, CompiledQuery};
use crate::machine::bytecode::{Memento, PrologBytecode};
use crate::machine::config::MachineConfig;
use crate::machine::instructions::*;
use crate::machine::machine_errors::MachineError;
use crate::machine::machine_state::MachineState;
use crate::parser::ast::Term;
use crate::parser::parser::{parse_program, parse_query};
use crate::parser::ParserError;
use crate::types::*;

use std::convert::TryFrom;
use std::fmt;

use tracing::trace;

/// Nesting depth at which [`Machine::read_binding`] stops
/// reconstructing a term. Unification is occurs-check-free, so query
/// answers can be cyclic; the cutoff keeps them printable.
const MAX_BINDING_DEPTH: usize = 64;

/// What a finished derivation step reports: a solution whose bindings
/// can now be read out of the query frame, or the exhaustion of every
/// clause alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Solution,
    NoMoreSolutions,
}

/// Compile-or-run failures surfaced to the toplevel.
#[derive(Debug)]
pub enum SessionError {
    Parse(ParserError),
    Machine(MachineError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::Parse(err) => write!(f, "{}", err),
            SessionError::Machine(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ParserError> for SessionError {
    fn from(err: ParserError) -> Self {
        SessionError::Parse(err)
    }
}

impl From<MachineError> for SessionError {
    fn from(err: MachineError) -> Self {
        SessionError::Machine(err)
    }
}

/// One ZIP machine instance: the bytecode store plus the register and
/// region state of the abstract machine proper.
#[derive(Debug)]
pub struct Machine {
    bytecode: PrologBytecode,
    st: MachineState,
}

impl Default for Machine {
    fn default() -> Self {
        Machine::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Machine::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Machine {
            bytecode: PrologBytecode::new(),
            st: MachineState::new(&config),
        }
    }

    // === Program and query compilation ===

    /// Parses and compiles program text, appending its clauses to code
    /// memory.
    pub fn consult(&mut self, src: &str) -> Result<(), SessionError> {
        let clauses = parse_program(src)?;

        for clause in &clauses {
            compiler::compile_clause(&mut self.bytecode, clause)?;
        }

        Ok(())
    }

    /// Parses and compiles a query, appending its code after the
    /// program. The returned handle names the query's variables and
    /// its entry address.
    pub fn compile_query(&mut self, src: &str) -> Result<CompiledQuery, SessionError> {
        let goals = parse_query(src)?;
        let query = compiler::compile_query(&mut self.bytecode, &goals)?;
        Ok(query)
    }

    pub fn code_size(&self) -> usize {
        self.bytecode.code_size()
    }

    pub fn create_memento(&self) -> Memento {
        self.bytecode.create_memento()
    }

    pub fn restore_memento(&mut self, memento: Memento) {
        self.bytecode.restore_memento(memento);
    }

    // === Execution ===

    /// (Re)sets the machine for executing the query at `query_addr`.
    pub fn reset(&mut self, query_addr: usize) {
        self.st.reset(query_addr);
    }

    /// Runs to the first solution, or to exhaustion.
    pub fn run(&mut self) -> Result<Answer, MachineError> {
        self.resume()
    }

    /// Abandons the current solution and backtracks for the next one.
    pub fn next_solution(&mut self) -> Result<Answer, MachineError> {
        self.st.halt = false;
        self.st.fail = true;
        self.resume()
    }

    /// Compiles and runs a query to its first solution, leaving the
    /// machine positioned for [`Machine::next_solution`].
    pub fn solve(&mut self, src: &str) -> Result<(CompiledQuery, Answer), SessionError> {
        let query = self.compile_query(src)?;
        self.reset(query.code_addr);
        let answer = self.run()?;
        Ok((query, answer))
    }

    fn resume(&mut self) -> Result<Answer, MachineError> {
        let mut unbound = Vec::new();

        loop {
            if self.st.fail {
                unbound.clear();

                match self.st.backtrack(&self.bytecode, &mut unbound)? {
                    Some(retry_addr) => self.st.pc = retry_addr,
                    None => return Ok(Answer::NoMoreSolutions),
                }
            } else {
                self.step()?;
            }

            if self.st.halt {
                return Ok(Answer::Solution);
            }
        }
    }

    // === Code fetch ===

    /// Reads the operator at `PC` and returns it OR'd with the machine
    /// mode, advancing `PC`.
    fn fetch_operator(&mut self) -> Result<u64, MachineError> {
        let word = self.bytecode.read_code(self.st.pc)?;
        self.st.pc += 1;
        Ok(word | mode_bits(self.st.mode))
    }

    /// Reads the operand following the operator. Variable operands are
    /// zero-based cell indices, translated against the frame of the
    /// executing literal's clause.
    fn fetch_operand(&mut self, is_variable: bool) -> Result<usize, MachineError> {
        let word = self.bytecode.read_code(self.st.pc)? as usize;
        self.st.pc += 1;

        if is_variable {
            Ok(self.st.fb + word)
        } else {
            Ok(word)
        }
    }

    /// Transfers control to `addr`, saving the return address in the
    /// target frame if one exists.
    fn jump(&mut self, addr: usize) -> Result<(), MachineError> {
        if self.st.tf != NONE {
            self.st.local.set_continuation(self.st.tf, self.st.pc)?;
        }

        self.st.pc = addr;
        Ok(())
    }

    // === Dispatch ===

    fn step(&mut self) -> Result<(), MachineError> {
        let operator = self.fetch_operator()?;
        let opcode = Opcode::try_from(operator)?;
        let mode = self.st.mode;

        trace!(
            target: "zip::machine",
            pc = self.st.pc - 1,
            op = %opcode,
            mode = ?mode,
            "dispatch"
        );

        match (opcode, mode) {
            (Opcode::Frame, _) => {
                let frame = self.st.push_target_frame()?;
                self.st.s = frame;
                self.st.mode = Mode::Arg;
            }

            (Opcode::Enter, _) => {
                let size = self.fetch_operand(false)?;
                self.st.push_source_frame(size)?;
                self.st.fb = self.st.sf;
                self.st.mode = Mode::Arg;
            }

            (Opcode::Call, _) => {
                let index = self.fetch_operand(false)?;
                let predicate = self.bytecode.predicate_at(index)?;

                trace!(
                    target: "zip::machine",
                    predicate = self.bytecode.atom_str(predicate.name),
                    arity = predicate.arity,
                    "call"
                );

                match predicate.first {
                    Some(clause_index) => {
                        let clause = self.bytecode.clause_at(clause_index)?;

                        if let Some(next) = clause.next {
                            self.st.push_choice_point(next)?;
                        }

                        self.jump(clause.code_addr)?;
                        self.st.s = self.st.tf;
                        self.st.fb = self.st.tf;
                        self.st.mode = Mode::Match;
                    }
                    None => self.st.fail = true,
                }
            }

            (Opcode::Exit, _) => {
                let size = self.fetch_operand(false)?;
                self.st.pc = self.st.local.continuation(self.st.tf)?;
                self.st.pop_target_frame(size);
                self.st.fb = self.st.sf;
            }

            (Opcode::Return, _) => {
                self.st.pop_source_frame()?;
            }

            (Opcode::Functor, Mode::Arg | Mode::Copy) => {
                let index = self.fetch_operand(false)?;
                let functor = self.bytecode.functor_at(index)?;

                let block = self.st.push_functor(index, functor.arity)?;
                self.st.write_word(self.st.s, MachineWord::structure(block))?;
                self.st.push_on_scratchpad(self.st.s + 1);
                self.st.mode = Mode::Copy;
                self.st.s = block + 1;
            }

            (Opcode::Functor, Mode::Match) => {
                let index = self.fetch_operand(false)?;
                let functor = self.bytecode.functor_at(index)?;

                let (addr, word) = self.st.deref(self.st.s)?;

                match word.get_tag() {
                    WordTag::Ref => {
                        let block = self.st.push_functor(index, functor.arity)?;
                        self.st.push_on_scratchpad(self.st.s + 1);
                        self.st.bind_word(addr, MachineWord::structure(block))?;
                        self.st.mode = Mode::Copy;
                        self.st.s = block + 1;
                    }
                    WordTag::Str => {
                        let found = self.st.read_word(word.get_value())?;

                        if found.get_value() == index {
                            self.st.push_on_scratchpad(self.st.s + 1);
                            self.st.s = word.get_value() + 1;
                        } else {
                            self.st.fail = true;
                        }
                    }
                    _ => self.st.fail = true,
                }
            }

            (Opcode::Constant, Mode::Arg | Mode::Copy) => {
                let index = self.fetch_operand(false)?;
                self.st.write_word(self.st.s, MachineWord::constant(index))?;
                self.st.s += 1;
            }

            (Opcode::Constant, Mode::Match) => {
                let index = self.fetch_operand(false)?;
                let (addr, word) = self.st.deref(self.st.s)?;

                match word.get_tag() {
                    WordTag::Ref => {
                        self.st.bind_word(addr, MachineWord::constant(index))?;
                        self.st.s += 1;
                    }
                    WordTag::Con if word.get_value() == index => {
                        self.st.s += 1;
                    }
                    _ => self.st.fail = true,
                }
            }

            (Opcode::FirstVar, Mode::Arg) => {
                let cell = self.fetch_operand(true)?;
                self.st.write_word(cell, MachineWord::reference(cell))?;
                self.st
                    .write_word(self.st.s, MachineWord::reference(cell))?;
                self.st.s += 1;
            }

            (Opcode::FirstVar, Mode::Copy) => {
                // the reserved cell is already unbound; alias the
                // clause variable to it.
                let cell = self.fetch_operand(true)?;
                self.st
                    .write_word(cell, MachineWord::reference(self.st.s))?;
                self.st.s += 1;
            }

            (Opcode::FirstVar, Mode::Match) => {
                let cell = self.fetch_operand(true)?;
                self.st.write_word(cell, MachineWord::reference(cell))?;

                let (addr, _) = self.st.deref(self.st.s)?;
                self.st.bind(cell, addr)?;
                self.st.s += 1;
            }

            (Opcode::Var, Mode::Arg) => {
                let cell = self.fetch_operand(true)?;
                self.st
                    .write_word(self.st.s, MachineWord::reference(cell))?;
                self.st.s += 1;
            }

            (Opcode::Var, Mode::Copy) => {
                let cell = self.fetch_operand(true)?;
                let (addr, word) = self.st.deref(cell)?;

                if word.is_unbound_at(addr) {
                    // an unbound local must be globalized before it
                    // flows into a structure, or truncating the local
                    // stack could strand the structure's reference.
                    self.st.bind(addr, self.st.s)?;
                } else {
                    self.st.write_word(self.st.s, word)?;
                }

                self.st.s += 1;
            }

            (Opcode::Var, Mode::Match) => {
                let cell = self.fetch_operand(true)?;

                match self.st.unifiable(&self.bytecode, cell, self.st.s)? {
                    Some(_) => self.st.s += 1,
                    None => self.st.fail = true,
                }
            }

            (Opcode::Pop, _) => {
                self.st.s = self.st.pop_from_scratchpad();
            }
        }

        Ok(())
    }

    // === Answer readback ===

    /// Reconstructs the term bound to the given query-frame cell.
    /// Unbound cells come back as fresh variable names derived from
    /// their addresses.
    pub fn read_binding(&self, cell_index: usize) -> Result<Term, MachineError> {
        self.term_at(self.st.query_frame + cell_index, MAX_BINDING_DEPTH)
    }

    fn term_at(&self, addr: usize, depth: usize) -> Result<Term, MachineError> {
        if depth == 0 {
            return Ok(Term::Atom("...".to_string()));
        }

        let (addr, word) = self.st.deref(addr)?;

        match word.get_tag() {
            WordTag::Ref => {
                let name = if is_local(addr) {
                    format!("_L{}", addr - LOCAL_BASE)
                } else {
                    format!("_G{}", addr)
                };

                Ok(Term::Var(name))
            }
            WordTag::Con => {
                let functor = self.bytecode.functor_at(word.get_value())?;
                Ok(Term::Atom(self.bytecode.atom_str(functor.name).to_string()))
            }
            WordTag::Str => {
                let block = word.get_value();
                let functor_word = self.st.read_word(block)?;
                let functor = self.bytecode.functor_at(functor_word.get_value())?;
                let name = self.bytecode.atom_str(functor.name).to_string();

                let mut args = Vec::with_capacity(functor.arity);

                for i in 1..functor.arity + 1 {
                    args.push(self.term_at(block + i, depth - 1)?);
                }

                Ok(Term::Compound(name, args))
            }
            WordTag::Fun => Err(MachineError::ConstantMiscast {
                index: word.get_value(),
                expected: "dereferenceable word",
            }),
        }
    }
}
