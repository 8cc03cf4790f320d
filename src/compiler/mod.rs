pub mod codegen;

pub use codegen::*;
