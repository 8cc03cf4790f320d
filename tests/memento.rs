use zip_prolog::machine::Answer;
use zip_prolog::parser::ast::Term;
use zip_prolog::Machine;

#[test]
fn memento_roundtrip_restores_the_program_state() {
    let mut machine = Machine::new();

    machine
        .consult("parent(tom, bob). parent(tom, liz).")
        .unwrap();

    let memento = machine.create_memento();
    let program_code_size = machine.code_size();

    // Q1.
    let (q1, answer) = machine.solve("parent(tom, X).").unwrap();

    assert_eq!(answer, Answer::Solution);

    let first = machine.read_binding(q1.vars[0].1).unwrap();

    machine.restore_memento(memento);
    assert_eq!(machine.code_size(), program_code_size);

    // Q2 compiles at the same address and introduces fresh symbols
    // that the next restoration discards again.
    let (_, answer) = machine.solve("parent(unknown_person, Y).").unwrap();

    assert_eq!(answer, Answer::NoMoreSolutions);

    machine.restore_memento(memento);
    assert_eq!(machine.code_size(), program_code_size);

    // re-running Q1 reproduces the original result exactly.
    let (q1_again, answer) = machine.solve("parent(tom, X).").unwrap();

    assert_eq!(answer, Answer::Solution);
    assert_eq!(q1_again.code_addr, q1.code_addr);
    assert_eq!(machine.read_binding(q1_again.vars[0].1).unwrap(), first);
    assert_eq!(first, Term::Atom("bob".to_string()));
}

#[test]
fn queries_compile_at_the_code_tail() {
    let mut machine = Machine::new();

    machine.consult("p(a).").unwrap();

    let tail = machine.code_size();
    let query = machine.compile_query("p(a).").unwrap();

    assert_eq!(query.code_addr, tail);
}
