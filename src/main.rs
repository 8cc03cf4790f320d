use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use tracing_subscriber::EnvFilter;

use zip_prolog::compiler::CompiledQuery;
use zip_prolog::machine::Answer;
use zip_prolog::repl_helper::Helper;
use zip_prolog::Machine;

use std::env;
use std::fs;
use std::process;

const PROMPT: &str = "?- ";
const HALT: &str = "halt";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut machine = Machine::new();

    if let Some(path) = env::args().nth(1) {
        let src = match fs::read_to_string(&path) {
            Ok(src) => src,
            Err(err) => {
                eprintln!("cannot read {}: {}", path, err);
                process::exit(1);
            }
        };

        if let Err(err) = machine.consult(&src) {
            eprintln!("{}: {}", path, err);
            process::exit(1);
        }
    }

    if let Err(err) = repl(&mut machine) {
        eprintln!("{}", err);
        process::exit(1);
    }
}

fn repl(machine: &mut Machine) -> rustyline::Result<()> {
    let mut editor: Editor<Helper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(Helper::new()));

    // bytecode state prior to the compilation of any query; restored
    // after each one so queries always compile to the same address.
    let memento = machine.create_memento();

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err),
        };

        let input = line.trim();

        if input.is_empty() {
            continue;
        }

        if input == HALT || input == "halt." {
            break;
        }

        let _ = editor.add_history_entry(input);

        let query = match machine.compile_query(input) {
            Ok(query) => query,
            Err(err) => {
                println!("{}", err);
                machine.restore_memento(memento);
                continue;
            }
        };

        machine.reset(query.code_addr);
        let mut answer = machine.run();

        loop {
            match answer {
                Ok(Answer::Solution) => {
                    print_solution(machine, &query);

                    // ';' asks for another solution; anything else
                    // commits to this one.
                    match editor.readline("") {
                        Ok(more) if more.trim() == ";" => answer = machine.next_solution(),
                        Ok(_) | Err(_) => break,
                    }
                }
                Ok(Answer::NoMoreSolutions) => {
                    println!("no");
                    break;
                }
                Err(err) => {
                    println!("error: {}", err);
                    break;
                }
            }
        }

        machine.restore_memento(memento);
    }

    Ok(())
}

fn print_solution(machine: &Machine, query: &CompiledQuery) {
    if query.vars.is_empty() {
        println!("yes");
        return;
    }

    for (name, cell) in &query.vars {
        match machine.read_binding(*cell) {
            Ok(term) => println!("{} = {}", name, term),
            Err(err) => println!("error: {}", err),
        }
    }
}
