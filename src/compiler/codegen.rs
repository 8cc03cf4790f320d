use crate::machine::bytecode::PrologBytecode;
use crate::machine::instructions::Opcode;
use crate::machine::machine_errors::MachineError;
use crate::parser::ast::*;

use fxhash::FxHashSet;
use indexmap::IndexMap;

use tracing::debug;

/// A compiled query: its entry address in code memory and the named
/// variables of the query mapped to their frame cell indices, in
/// first-occurrence order. Anonymous variables get cells but are not
/// reported.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub code_addr: usize,
    pub vars: Vec<(Var, usize)>,
}

/// Assigns frame cells to a clause's variables: parameters occupy
/// cells `0..params`, each distinct variable the next free cell in
/// order of first occurrence. Every `_` is a distinct variable.
#[derive(Debug)]
struct VarAlloc {
    params: usize,
    named: IndexMap<String, usize>,
    anon: Vec<usize>,
    next_cell: usize,
}

impl VarAlloc {
    fn new(params: usize) -> Self {
        VarAlloc {
            params,
            named: IndexMap::new(),
            anon: Vec::new(),
            next_cell: params,
        }
    }

    fn visit_term(&mut self, term: &Term) {
        match term {
            Term::Atom(_) => {}
            Term::Var(name) if name == "_" => {
                self.anon.push(self.next_cell);
                self.next_cell += 1;
            }
            Term::Var(name) => {
                if !self.named.contains_key(name) {
                    self.named.insert(name.clone(), self.next_cell);
                    self.next_cell += 1;
                }
            }
            Term::Compound(_, args) => {
                for arg in args {
                    self.visit_term(arg);
                }
            }
        }
    }

    fn visit_literal(&mut self, literal: &Term) {
        if let Term::Compound(_, args) = literal {
            for arg in args {
                self.visit_term(arg);
            }
        }
    }

    fn locals(&self) -> usize {
        self.next_cell - self.params
    }

    fn frame_size(&self) -> usize {
        self.next_cell
    }
}

/// Emits argument instructions, tracking which variables have already
/// been given their initializing `firstvar`.
struct Emitter<'a> {
    alloc: &'a VarAlloc,
    seen: FxHashSet<String>,
    anon_index: usize,
}

impl<'a> Emitter<'a> {
    fn new(alloc: &'a VarAlloc) -> Self {
        Emitter {
            alloc,
            seen: FxHashSet::default(),
            anon_index: 0,
        }
    }

    fn emit_term(&mut self, bc: &mut PrologBytecode, term: &Term) {
        match term {
            Term::Atom(name) => {
                let index = bc.intern_functor(name, 0);
                emit_with(bc, Opcode::Constant, index);
            }
            Term::Var(name) if name == "_" => {
                let cell = self.alloc.anon[self.anon_index];
                self.anon_index += 1;
                emit_with(bc, Opcode::FirstVar, cell);
            }
            Term::Var(name) => {
                let cell = self.alloc.named[name];

                if self.seen.insert(name.clone()) {
                    emit_with(bc, Opcode::FirstVar, cell);
                } else {
                    emit_with(bc, Opcode::Var, cell);
                }
            }
            Term::Compound(name, args) => {
                let index = bc.intern_functor(name, args.len());
                emit_with(bc, Opcode::Functor, index);

                for arg in args {
                    self.emit_term(bc, arg);
                }

                emit(bc, Opcode::Pop);
            }
        }
    }

    fn emit_literal_args(&mut self, bc: &mut PrologBytecode, literal: &Term) {
        if let Term::Compound(_, args) = literal {
            for arg in args {
                self.emit_term(bc, arg);
            }
        }
    }
}

fn emit(bc: &mut PrologBytecode, opcode: Opcode) {
    bc.append_code(opcode as u64);
}

fn emit_with(bc: &mut PrologBytecode, opcode: Opcode, operand: usize) {
    bc.append_code(opcode as u64);
    bc.append_code(operand as u64);
}

fn literal_name(literal: &Term) -> &str {
    match literal.name() {
        Some(name) => name,
        None => unreachable!("the parser admits only callable literals"),
    }
}

fn emit_goal_call(bc: &mut PrologBytecode, emitter: &mut Emitter, goal: &Term) {
    emit(bc, Opcode::Frame);
    emitter.emit_literal_args(bc, goal);

    let index = bc.intern_predicate(literal_name(goal), goal.arity());
    emit_with(bc, Opcode::Call, index);
}

/// Compiles one clause and registers it as the next alternative of its
/// predicate. Head arguments unify against the parameter slots the
/// caller filled; facts return through `exit`, rules through
/// `enter` / goal calls / `return`.
pub fn compile_clause(bc: &mut PrologBytecode, clause: &Clause) -> Result<(), MachineError> {
    let params = clause.head.arity();

    let mut alloc = VarAlloc::new(params);
    alloc.visit_literal(&clause.head);

    for goal in &clause.body {
        alloc.visit_literal(goal);
    }

    let code_addr = bc.code_size();
    bc.define_clause(literal_name(&clause.head), params, alloc.locals(), code_addr)?;

    let mut emitter = Emitter::new(&alloc);
    emitter.emit_literal_args(bc, &clause.head);

    if clause.is_fact() {
        emit_with(bc, Opcode::Exit, alloc.frame_size());
    } else {
        emit_with(bc, Opcode::Enter, alloc.frame_size());

        for goal in &clause.body {
            emit_goal_call(bc, &mut emitter, goal);
        }

        emit(bc, Opcode::Return);
    }

    debug!(
        target: "zip::compile",
        head = %clause.head,
        addr = code_addr,
        params,
        locals = alloc.locals(),
        "clause compiled"
    );

    Ok(())
}

/// Compiles a query as the body of a parameterless clause whose frame
/// holds the query variables; `return`ing from that frame is what ends
/// a derivation.
pub fn compile_query(
    bc: &mut PrologBytecode,
    goals: &[Term],
) -> Result<CompiledQuery, MachineError> {
    let mut alloc = VarAlloc::new(0);

    for goal in goals {
        alloc.visit_literal(goal);
    }

    let code_addr = bc.code_size();

    emit(bc, Opcode::Frame);
    emit_with(bc, Opcode::Enter, alloc.frame_size());

    let mut emitter = Emitter::new(&alloc);

    for goal in goals {
        emit_goal_call(bc, &mut emitter, goal);
    }

    emit(bc, Opcode::Return);

    let vars = alloc
        .named
        .iter()
        .map(|(name, &cell)| (name.clone(), cell))
        .collect();

    debug!(target: "zip::compile", addr = code_addr, "query compiled");

    Ok(CompiledQuery { code_addr, vars })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parser::{parse_program, parse_query};

    fn clause(src: &str) -> Clause {
        parse_program(src).unwrap().remove(0)
    }

    #[test]
    fn variables_number_from_the_parameter_count() {
        let clause = clause("append(cons(H, T), L, cons(H, R)) :- append(T, L, R).");

        let mut alloc = VarAlloc::new(clause.head.arity());
        alloc.visit_literal(&clause.head);

        for goal in &clause.body {
            alloc.visit_literal(goal);
        }

        assert_eq!(alloc.params, 3);
        assert_eq!(alloc.named["H"], 3);
        assert_eq!(alloc.named["T"], 4);
        assert_eq!(alloc.named["L"], 5);
        assert_eq!(alloc.named["R"], 6);
        assert_eq!(alloc.locals(), 4);
    }

    #[test]
    fn anonymous_variables_are_distinct() {
        let clause = clause("ignore(_, _).");

        let mut alloc = VarAlloc::new(clause.head.arity());
        alloc.visit_literal(&clause.head);

        assert_eq!(alloc.anon, vec![2, 3]);
        assert_eq!(alloc.locals(), 2);
    }

    #[test]
    fn fact_compiles_to_head_plus_exit() {
        let mut bc = PrologBytecode::new();

        compile_clause(&mut bc, &clause("p(a).")).unwrap();

        assert_eq!(bc.read_code(0).unwrap(), Opcode::Constant as u64);
        assert_eq!(bc.read_code(2).unwrap(), Opcode::Exit as u64);
        assert_eq!(bc.read_code(3).unwrap(), 1); // frame size
    }

    #[test]
    fn first_and_later_occurrences_differ() {
        let mut bc = PrologBytecode::new();

        compile_clause(&mut bc, &clause("eq(X, X).")).unwrap();

        assert_eq!(bc.read_code(0).unwrap(), Opcode::FirstVar as u64);
        assert_eq!(bc.read_code(1).unwrap(), 2);
        assert_eq!(bc.read_code(2).unwrap(), Opcode::Var as u64);
        assert_eq!(bc.read_code(3).unwrap(), 2);
    }

    #[test]
    fn query_reports_named_variables_only() {
        let mut bc = PrologBytecode::new();
        let goals = parse_query("p(X, _, Y).").unwrap();

        let query = compile_query(&mut bc, &goals).unwrap();

        assert_eq!(
            query.vars,
            vec![("X".to_string(), 0), ("Y".to_string(), 2)]
        );
    }
}
