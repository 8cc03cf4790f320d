pub mod atom_table;
pub mod compiler;
pub mod machine;
pub mod parser;
pub mod repl_helper;
pub mod types;

pub use machine::config::MachineConfig;
pub use machine::{Answer, Machine};
