use proptest::prelude::*;

use zip_prolog::machine::Answer;
use zip_prolog::parser::ast::Term;
use zip_prolog::{Machine, MachineConfig};

fn small_machine() -> Machine {
    Machine::with_config(
        MachineConfig::new()
            .with_global_capacity(1 << 14)
            .with_local_capacity(1 << 14)
            .with_trail_capacity(1 << 12),
    )
}

fn generate_ground_term() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        Just(Term::Atom("a".to_string())),
        Just(Term::Atom("b".to_string())),
        Just(Term::Atom("c".to_string())),
    ];

    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            inner
                .clone()
                .prop_map(|arg| Term::Compound("f".to_string(), vec![arg])),
            (inner.clone(), inner)
                .prop_map(|(a1, a2)| Term::Compound("g".to_string(), vec![a1, a2])),
        ]
    })
}

fn unify_outcome(t1: &Term, t2: &Term) -> bool {
    let mut machine = small_machine();

    machine.consult("=(X, X).").unwrap();

    let (_, answer) = machine.solve(&format!("=({}, {}).", t1, t2)).unwrap();

    answer == Answer::Solution
}

proptest! {
    // ground terms unify exactly when they are equal, and unification
    // does not depend on argument order.
    #[test]
    fn ground_unification_is_equality(t1 in generate_ground_term(), t2 in generate_ground_term()) {
        let forward = unify_outcome(&t1, &t2);

        prop_assert_eq!(forward, t1 == t2);
        prop_assert_eq!(forward, unify_outcome(&t2, &t1));
    }

    // a successful unification is idempotent: re-running the same
    // query against the same program reproduces it.
    #[test]
    fn unification_is_repeatable(t in generate_ground_term()) {
        let mut machine = small_machine();

        machine.consult("=(X, X).").unwrap();

        let memento = machine.create_memento();
        let src = format!("=({}, {}).", t, t);

        let (_, first) = machine.solve(&src).unwrap();
        machine.restore_memento(memento);
        let (_, second) = machine.solve(&src).unwrap();

        prop_assert_eq!(first, Answer::Solution);
        prop_assert_eq!(second, Answer::Solution);
    }
}
