use zip_prolog::machine::Answer;
use zip_prolog::parser::ast::Term;
use zip_prolog::Machine;

fn atom(name: &str) -> Term {
    Term::Atom(name.to_string())
}

fn compound(name: &str, args: Vec<Term>) -> Term {
    Term::Compound(name.to_string(), args)
}

fn binding(machine: &Machine, vars: &[(String, usize)], name: &str) -> Term {
    let cell = vars
        .iter()
        .find(|(var, _)| var == name)
        .map(|(_, cell)| *cell)
        .unwrap();

    machine.read_binding(cell).unwrap()
}

#[test]
fn peano_addition_first_solution() {
    let mut machine = Machine::new();

    machine
        .consult("+(zero, N, N). +(succ(N), M, succ(K)) :- +(N, M, K).")
        .unwrap();

    let (query, answer) = machine.solve("+(succ(zero), succ(zero), N).").unwrap();

    assert_eq!(answer, Answer::Solution);
    assert_eq!(
        binding(&machine, &query.vars, "N"),
        compound("succ", vec![compound("succ", vec![atom("zero")])])
    );

    assert_eq!(machine.next_solution().unwrap(), Answer::NoMoreSolutions);
}

#[test]
fn multi_solution_family() {
    let mut machine = Machine::new();

    machine
        .consult("parent(tom, bob). parent(tom, liz). parent(bob, ann).")
        .unwrap();

    let (query, answer) = machine.solve("parent(tom, X).").unwrap();

    assert_eq!(answer, Answer::Solution);
    assert_eq!(binding(&machine, &query.vars, "X"), atom("bob"));

    assert_eq!(machine.next_solution().unwrap(), Answer::Solution);
    assert_eq!(binding(&machine, &query.vars, "X"), atom("liz"));

    assert_eq!(machine.next_solution().unwrap(), Answer::NoMoreSolutions);
}

#[test]
fn unification_failure_triggers_backtracking() {
    let mut machine = Machine::new();

    machine.consult("p(a). p(b).").unwrap();

    // the first clause fails on unifying a with b; the second matches
    // without binding anything.
    let (query, answer) = machine.solve("p(b).").unwrap();

    assert_eq!(answer, Answer::Solution);
    assert!(query.vars.is_empty());

    assert_eq!(machine.next_solution().unwrap(), Answer::NoMoreSolutions);
}

#[test]
fn occurs_check_free_self_binding() {
    let mut machine = Machine::new();

    machine.consult("=(X, X).").unwrap();

    let (query, answer) = machine.solve("=(X, f(X)).").unwrap();

    assert_eq!(answer, Answer::Solution);

    // the answer is a cyclic term; reconstruction cuts it off rather
    // than diverging.
    let term = binding(&machine, &query.vars, "X");
    let printed = term.to_string();

    assert!(printed.starts_with("f(f("));
}

#[test]
fn bindings_undone_across_nested_choice_points() {
    let mut machine = Machine::new();

    machine
        .consult("q(a). q(b). r(b). goal(X) :- q(X), r(X).")
        .unwrap();

    // q/1 first binds X to a; r(a) fails; backtracking into q/1 must
    // undo the binding before trying b.
    let (query, answer) = machine.solve("goal(X).").unwrap();

    assert_eq!(answer, Answer::Solution);
    assert_eq!(binding(&machine, &query.vars, "X"), atom("b"));

    assert_eq!(machine.next_solution().unwrap(), Answer::NoMoreSolutions);

    // exhaustion unwinds every choice point, so the query variable is
    // unbound again.
    assert!(matches!(
        binding(&machine, &query.vars, "X"),
        Term::Var(_)
    ));
}

#[test]
fn deep_recursion_stays_within_regions() {
    let mut machine = Machine::new();

    machine
        .consult("+(zero, N, N). +(succ(N), M, succ(K)) :- +(N, M, K).")
        .unwrap();

    // 8 + 8 in Peano notation.
    let mut eight = "zero".to_string();

    for _ in 0..8 {
        eight = format!("succ({})", eight);
    }

    let src = format!("+({}, {}, N).", eight, eight);
    let (query, answer) = machine.solve(&src).unwrap();

    assert_eq!(answer, Answer::Solution);

    let mut expected = atom("zero");

    for _ in 0..16 {
        expected = compound("succ", vec![expected]);
    }

    assert_eq!(binding(&machine, &query.vars, "N"), expected);
}

#[test]
fn undefined_predicate_answers_no() {
    let mut machine = Machine::new();

    machine.consult("p(a).").unwrap();

    let (_, answer) = machine.solve("q(a).").unwrap();

    assert_eq!(answer, Answer::NoMoreSolutions);
}

#[test]
fn conjunction_joins_shared_variables() {
    let mut machine = Machine::new();

    machine
        .consult("parent(tom, bob). parent(bob, ann). grand(X, Z) :- parent(X, Y), parent(Y, Z).")
        .unwrap();

    let (query, answer) = machine.solve("grand(tom, Z).").unwrap();

    assert_eq!(answer, Answer::Solution);
    assert_eq!(binding(&machine, &query.vars, "Z"), atom("ann"));
}

#[test]
fn first_solution_is_deterministic() {
    let src = "parent(tom, bob). parent(tom, liz).";

    let mut results = Vec::new();

    for _ in 0..3 {
        let mut machine = Machine::new();
        machine.consult(src).unwrap();

        let (query, answer) = machine.solve("parent(tom, X).").unwrap();

        assert_eq!(answer, Answer::Solution);
        results.push(binding(&machine, &query.vars, "X"));
    }

    assert!(results.windows(2).all(|w| w[0] == w[1]));
}
